use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HostResult;
use crate::world::WorldId;

/// Unique identifier for every entity the host simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generate a new random entity ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// The category of an entity, as far as suspension decisions care.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A connected client's avatar.
    Player,
    /// A hostile mob.
    Monster,
    /// A passive land animal.
    Animal,
    /// A passive water creature.
    WaterAnimal,
    /// Bats and other ambient creatures.
    Ambient,
    /// A trading villager.
    Villager,
    /// A raid participant.
    Raider,
    /// A world boss.
    Boss,
    /// A dropped item stack.
    Item,
    /// A wall-mounted item frame.
    ItemFrame,
    /// A decorative armour stand.
    ArmorStand,
    /// Arrows and other projectiles.
    Projectile,
    /// A host-specific kind not covered above.
    Custom(String),
}

impl EntityKind {
    /// Whether this kind carries behaviour AI that can be toggled.
    pub fn is_living(&self) -> bool {
        matches!(
            self,
            Self::Player
                | Self::Monster
                | Self::Animal
                | Self::WaterAnimal
                | Self::Ambient
                | Self::Villager
                | Self::Raider
                | Self::Boss
                | Self::ArmorStand
        )
    }

    /// Parse a kind from its snake_case name; unknown names become `Custom`.
    pub fn parse(s: &str) -> Self {
        match s {
            "player" => Self::Player,
            "monster" => Self::Monster,
            "animal" => Self::Animal,
            "water_animal" => Self::WaterAnimal,
            "ambient" => Self::Ambient,
            "villager" => Self::Villager,
            "raider" => Self::Raider,
            "boss" => Self::Boss,
            "item" => Self::Item,
            "item_frame" => Self::ItemFrame,
            "armor_stand" => Self::ArmorStand,
            "projectile" => Self::Projectile,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => write!(f, "player"),
            Self::Monster => write!(f, "monster"),
            Self::Animal => write!(f, "animal"),
            Self::WaterAnimal => write!(f, "water_animal"),
            Self::Ambient => write!(f, "ambient"),
            Self::Villager => write!(f, "villager"),
            Self::Raider => write!(f, "raider"),
            Self::Boss => write!(f, "boss"),
            Self::Item => write!(f, "item"),
            Self::ItemFrame => write!(f, "item_frame"),
            Self::ArmorStand => write!(f, "armor_stand"),
            Self::Projectile => write!(f, "projectile"),
            Self::Custom(s) => write!(f, "{s}"),
        }
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// East-west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North-south axis.
    pub z: f64,
}

impl Position {
    /// Create a position from its three coordinates.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance. Avoids the square root in hot loops.
    #[inline]
    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Entity state that suspension exclusion rules look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTraits {
    /// Player-assigned display name, if any.
    pub custom_name: Option<String>,
    /// Immune to damage.
    pub invulnerable: bool,
    /// Owned by a player.
    pub tamed: bool,
    /// Attached to a lead.
    pub leashed: bool,
    /// Ordered to sit.
    pub sitting: bool,
}

impl EntityTraits {
    /// Whether a player has a stake in this entity (tamed, leashed or sitting).
    pub fn is_companion(&self) -> bool {
        self.tamed || self.leashed || self.sitting
    }
}

/// Opaque reference to a live simulated object.
///
/// A handle may turn stale at any moment: the host can despawn the entity
/// between any two calls. Check [`is_alive`](Self::is_alive) immediately
/// before every mutation and never carry a handle across a yield without
/// checking again.
pub trait EntityHandle: Send + Sync {
    /// Stable identifier of the entity.
    fn id(&self) -> EntityId;

    /// The world the entity currently lives in.
    fn world(&self) -> WorldId;

    /// Liveness oracle.
    fn is_alive(&self) -> bool;

    /// Current position.
    fn position(&self) -> Position;

    /// Entity category.
    fn kind(&self) -> EntityKind;

    /// Exclusion-relevant state.
    fn traits(&self) -> EntityTraits;

    /// Whether the entity's durable storage carries `key`.
    fn has_tag(&self, key: &str) -> bool;

    /// Write `key` to the entity's durable storage.
    fn set_tag(&self, key: &str) -> HostResult<()>;

    /// Remove `key` from the entity's durable storage.
    fn remove_tag(&self, key: &str) -> HostResult<()>;

    /// Downcasting hook for host bindings that need their concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Shared entity handle.
pub type EntityRef = Arc<dyn EntityHandle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_squared_is_symmetric() {
        let a = Position::new(1.0, 2.0, 3.0);
        let b = Position::new(4.0, 6.0, 3.0);
        assert_eq!(a.distance_squared(&b), 25.0);
        assert_eq!(b.distance_squared(&a), 25.0);
    }

    #[test]
    fn living_kinds() {
        assert!(EntityKind::Monster.is_living());
        assert!(EntityKind::ArmorStand.is_living());
        assert!(!EntityKind::Item.is_living());
        assert!(!EntityKind::Projectile.is_living());
        assert!(!EntityKind::Custom("minecart".into()).is_living());
    }

    #[test]
    fn kind_parse_roundtrips_display() {
        for kind in [
            EntityKind::Villager,
            EntityKind::WaterAnimal,
            EntityKind::ItemFrame,
            EntityKind::Custom("minecart".into()),
        ] {
            assert_eq!(EntityKind::parse(&kind.to_string()), kind);
        }
    }

    #[test]
    fn companion_traits() {
        let mut traits = EntityTraits::default();
        assert!(!traits.is_companion());
        traits.leashed = true;
        assert!(traits.is_companion());
    }

    #[test]
    fn entity_id_display_is_short() {
        let id = EntityId::new();
        assert_eq!(id.to_string().len(), 8);
    }
}
