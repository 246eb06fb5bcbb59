use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, EntityRef, Position};

/// Name of a host world (dimension).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(pub String);

impl WorldId {
    /// Create a world id from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The world's name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Position of one connected client at the moment it was read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSnapshot {
    /// The client's avatar entity.
    pub id: EntityId,
    /// Where the avatar stood.
    pub position: Position,
}

/// Read access to the host's worlds, entities and clients.
///
/// Every method returns owned snapshots; nothing here mutates the host.
pub trait WorldQuery: Send + Sync {
    /// Worlds currently loaded by the host.
    fn worlds(&self) -> Vec<WorldId>;

    /// Living entities in `world`, clients' avatars included.
    fn entities(&self, world: &WorldId) -> Vec<EntityRef>;

    /// Connected clients in `world`.
    fn clients(&self, world: &WorldId) -> Vec<ClientSnapshot>;

    /// Look up a single entity.
    fn entity(&self, world: &WorldId, id: EntityId) -> Option<EntityRef> {
        self.entities(world).into_iter().find(|e| e.id() == id)
    }

    /// Whether `world` is currently loaded.
    fn is_loaded(&self, world: &WorldId) -> bool {
        self.worlds().contains(world)
    }
}
