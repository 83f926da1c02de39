//! Protocol variants and per-party configuration.
use std::{fmt, sync::Arc};

use rayon::ThreadPool;

use crate::{
    error::ConfigError,
    ggm::{Expand, GgmExpander, HalfTreeExpander, tree_height},
};

/// Maximal supported tree height, bounds are at most `2^MAX_TREE_HEIGHT`.
pub const MAX_TREE_HEIGHT: u32 = 32;

/// Protocol id used in the headers of base COT messages.
pub const BASE_COT_PROTOCOL: u16 = 0;

/// The tree construction used by both parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Variant {
    /// Two-key GGM tree with masked OT messages for both level sums.
    Ggm,
    /// Half-tree with one correlated OT value per level.
    #[default]
    HalfTree,
}

/// Whether the receiver checks a consistency tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Security {
    /// Parties follow the protocol.
    #[default]
    SemiHonest,
    /// The sender proves consistency of its leaves.
    Malicious,
}

/// Static description of a [`Variant`].
pub struct Descriptor {
    /// Human readable name.
    pub name: &'static str,
    /// Id carried in message headers.
    pub protocol_id: u16,
    /// Node expansion of the variant.
    pub expander: &'static dyn Expand,
    /// Number of base COTs one instance of the given bound consumes.
    pub precompute: fn(usize) -> usize,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("protocol_id", &self.protocol_id)
            .finish_non_exhaustive()
    }
}

fn one_cot_per_level(bound: usize) -> usize {
    tree_height(bound).max(1) as usize
}

/// Descriptors of all variants, indexed by [`Variant`].
pub static REGISTRY: [Descriptor; 2] = [
    Descriptor {
        name: "ggm",
        protocol_id: 1,
        expander: &GgmExpander,
        precompute: one_cot_per_level,
    },
    Descriptor {
        name: "half-tree",
        protocol_id: 2,
        expander: &HalfTreeExpander,
        precompute: one_cot_per_level,
    },
];

impl Variant {
    /// The static descriptor of this variant.
    pub fn descriptor(self) -> &'static Descriptor {
        match self {
            Variant::Ggm => &REGISTRY[0],
            Variant::HalfTree => &REGISTRY[1],
        }
    }
}

/// Number of base COTs a single instance with `bound` leaves consumes.
pub fn precompute_num(variant: Variant, bound: usize) -> usize {
    (variant.descriptor().precompute)(bound)
}

/// Checks `bound` and returns the height of its tree.
pub fn validate_bound(bound: usize) -> Result<u32, ConfigError> {
    if bound == 0 {
        return Err(ConfigError::InvalidBound);
    }
    match bound.checked_next_power_of_two() {
        Some(_) if tree_height(bound) <= MAX_TREE_HEIGHT => Ok(tree_height(bound)),
        _ => Err(ConfigError::BoundTooLarge {
            bound,
            max_height: MAX_TREE_HEIGHT,
        }),
    }
}

/// Configuration of one party.
///
/// Both parties must agree on `variant`, `security` and `session`.
#[derive(Debug, Clone)]
pub struct PprfConfig {
    pub(crate) own: usize,
    pub(crate) peer: usize,
    pub(crate) variant: Variant,
    pub(crate) security: Security,
    pub(crate) session: u64,
    pub(crate) pool: Arc<ThreadPool>,
}

impl PprfConfig {
    /// Configuration for party `own` talking to `peer`, computing on `pool`.
    pub fn new(own: usize, peer: usize, pool: Arc<ThreadPool>) -> Self {
        Self {
            own,
            peer,
            variant: Variant::default(),
            security: Security::default(),
            session: 0,
            pool,
        }
    }

    /// Sets the tree variant.
    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    /// Sets the security setting.
    pub fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the session id, which is bound into headers, tweaks and tags.
    pub fn session(mut self, session: u64) -> Self {
        self.session = session;
        self
    }

    /// The configured tree variant.
    pub fn get_variant(&self) -> Variant {
        self.variant
    }

    /// The configured security setting.
    pub fn get_security(&self) -> Security {
        self.security
    }
}
