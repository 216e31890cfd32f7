use serde::{Deserialize, Serialize};

const KIND_SHIFT: u32 = 56;
const EPOCH_SHIFT: u32 = 48;

/// Number of bits available for the per-kind index.
pub const INDEX_BITS: u32 = 48;
/// Largest index a handle can carry.
pub const MAX_INDEX: u64 = (1 << INDEX_BITS) - 1;

/// Entity category carried in the top byte of every handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Role,
    Monster,
    Npc,
    Drop,
    /// Tag not known to this build. Kept so handles survive a round trip.
    Other(u8),
}

impl EntityKind {
    pub fn tag(self) -> u8 {
        match self {
            Self::Role => 1,
            Self::Monster => 2,
            Self::Npc => 3,
            Self::Drop => 4,
            Self::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Role,
            2 => Self::Monster,
            3 => Self::Npc,
            4 => Self::Drop,
            other => Self::Other(other),
        }
    }

    /// Player-controlled entities. Only these receive appear/disappear traffic.
    pub fn is_role(self) -> bool {
        self == Self::Role
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Role => write!(f, "role"),
            Self::Monster => write!(f, "monster"),
            Self::Npc => write!(f, "npc"),
            Self::Drop => write!(f, "drop"),
            Self::Other(tag) => write!(f, "kind{}", tag),
        }
    }
}

/// Process-unique 64-bit entity handle.
///
/// Layout: `[kind:8][epoch:8][index:48]`. The epoch byte is bumped each time a
/// kind's index space wraps, so a recycled index never reproduces an older handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(u64);

impl EntityHandle {
    pub fn new(kind: EntityKind, epoch: u8, index: u64) -> Self {
        Self(
            ((kind.tag() as u64) << KIND_SHIFT)
                | ((epoch as u64) << EPOCH_SHIFT)
                | (index & MAX_INDEX),
        )
    }

    pub fn to_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(val: u64) -> Self {
        Self(val)
    }

    pub fn kind_tag(self) -> u8 {
        (self.0 >> KIND_SHIFT) as u8
    }

    pub fn kind(self) -> EntityKind {
        EntityKind::from_tag(self.kind_tag())
    }

    pub fn epoch(self) -> u8 {
        (self.0 >> EPOCH_SHIFT) as u8
    }

    pub fn index(self) -> u64 {
        self.0 & MAX_INDEX
    }

    pub fn is_role(self) -> bool {
        self.kind().is_role()
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "H({}:{}:{})", self.kind(), self.epoch(), self.index())
    }
}
