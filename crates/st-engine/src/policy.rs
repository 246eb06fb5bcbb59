use std::fmt;

use serde::{Deserialize, Serialize};
use st_core::{EntityKind, EntityTraits};

/// Why an entity is never suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// A connected client's avatar.
    Client,
    /// Boss fights must keep running.
    Boss,
    /// Projectiles in flight.
    Projectile,
    /// Named by a player.
    CustomNamed,
    /// Flagged invulnerable by the host.
    Invulnerable,
    /// Tamed, leashed or sitting.
    Companion,
    /// A dropped item or experience orb.
    Drop,
    /// A hanging item frame.
    ItemFrame,
    /// An armor stand.
    ArmorStand,
    /// A villager.
    Villager,
    /// Listed in [`IgnoreRules::kinds`].
    Kind,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Client => "client",
            Self::Boss => "boss",
            Self::Projectile => "projectile",
            Self::CustomNamed => "custom named",
            Self::Invulnerable => "invulnerable",
            Self::Companion => "companion",
            Self::Drop => "item drop",
            Self::ItemFrame => "item frame",
            Self::ArmorStand => "armor stand",
            Self::Villager => "villager",
            Self::Kind => "ignored kind",
        };
        f.write_str(s)
    }
}

/// Which entities suspension passes leave alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreRules {
    /// Leave custom-named entities active.
    pub custom_named: bool,
    /// Leave invulnerable entities active.
    pub invulnerable: bool,
    /// Tamed, leashed or sitting entities.
    pub companions: bool,
    /// Leave item drops active.
    pub drops: bool,
    /// Leave item frames active.
    pub item_frames: bool,
    /// Leave armor stands active.
    pub armor_stands: bool,
    /// Leave villagers active.
    pub villagers: bool,
    /// Additional kinds never suspended.
    pub kinds: Vec<EntityKind>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            custom_named: false,
            invulnerable: false,
            companions: false,
            drops: true,
            item_frames: true,
            armor_stands: true,
            villagers: false,
            kinds: Vec::new(),
        }
    }
}

/// Where suspension applies and how much work a pass commits per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionPolicy {
    /// Entities within this distance of any client stay active.
    pub tracking_radius: f64,
    /// Exclusions applied before any transition.
    pub ignore: IgnoreRules,
    /// Transitions committed per tick before yielding.
    pub batch_size: usize,
}

impl Default for SuspensionPolicy {
    fn default() -> Self {
        Self {
            tracking_radius: 35.0,
            ignore: IgnoreRules::default(),
            batch_size: 100,
        }
    }
}

impl SuspensionPolicy {
    /// Squared tracking radius, compared against squared distances.
    pub fn radius_squared(&self) -> f64 {
        self.tracking_radius * self.tracking_radius
    }

    /// The first rule that keeps this entity active, if any.
    pub fn exclusion(&self, kind: &EntityKind, traits: &EntityTraits) -> Option<Exclusion> {
        let ignore = &self.ignore;
        match kind {
            EntityKind::Player => return Some(Exclusion::Client),
            EntityKind::Boss => return Some(Exclusion::Boss),
            EntityKind::Projectile => return Some(Exclusion::Projectile),
            EntityKind::Item if ignore.drops => return Some(Exclusion::Drop),
            EntityKind::ItemFrame if ignore.item_frames => return Some(Exclusion::ItemFrame),
            EntityKind::ArmorStand if ignore.armor_stands => return Some(Exclusion::ArmorStand),
            EntityKind::Villager if ignore.villagers => return Some(Exclusion::Villager),
            _ => {}
        }
        if ignore.kinds.contains(kind) {
            return Some(Exclusion::Kind);
        }
        if ignore.custom_named && traits.custom_name.is_some() {
            return Some(Exclusion::CustomNamed);
        }
        if ignore.invulnerable && traits.invulnerable {
            return Some(Exclusion::Invulnerable);
        }
        if ignore.companions && traits.is_companion() {
            return Some(Exclusion::Companion);
        }
        None
    }

    /// Shorthand for `exclusion(..).is_some()`.
    pub fn is_excluded(&self, kind: &EntityKind, traits: &EntityTraits) -> bool {
        self.exclusion(kind, traits).is_some()
    }
}
