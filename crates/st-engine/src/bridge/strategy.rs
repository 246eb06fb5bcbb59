use std::fmt;

use st_core::HostResult;
use tracing::debug;

/// The host capabilities the engine adapts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Toggle an entity's per-step update.
    Ticking,
    /// Toggle and read behaviour AI.
    Ai,
    /// Read the aggregate tick rate.
    TickRate,
}

impl Capability {
    /// Every capability, in resolution order.
    pub const ALL: [Capability; 3] = [Self::Ticking, Self::Ai, Self::TickRate];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Ticking => 0,
            Self::Ai => 1,
            Self::TickRate => 2,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticking => write!(f, "ticking"),
            Self::Ai => write!(f, "ai"),
            Self::TickRate => write!(f, "tick rate"),
        }
    }
}

/// Which layer a strategy reaches the host through. Earlier tiers are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Stable public API.
    Public,
    /// Version-fragile extension API.
    Extended,
    /// Internal slot looked up by name.
    Internal,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Extended => write!(f, "extended"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Outcome of resolving one capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    /// A strategy succeeded.
    Resolved {
        /// Layer of the winning strategy.
        tier: Tier,
        /// Name of the winning strategy.
        via: String,
    },
    /// Every strategy failed.
    Unavailable {
        /// Strategies tried, in order.
        tried: Vec<String>,
    },
}

impl CapabilityStatus {
    /// Whether a strategy succeeded.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved { tier, via } => write!(f, "{tier}: {via}"),
            Self::Unavailable { tried } => write!(f, "unavailable (tried {})", tried.join(", ")),
        }
    }
}

/// A capability and how it resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The capability probed.
    pub capability: Capability,
    /// Which tier serves it, if any.
    pub status: CapabilityStatus,
}

type Probe<'a, B> = Box<dyn FnOnce() -> HostResult<B> + 'a>;

/// One way of obtaining a capability binding.
pub(crate) struct Strategy<'a, B> {
    tier: Tier,
    name: String,
    probe: Probe<'a, B>,
}

impl<'a, B> Strategy<'a, B> {
    pub(crate) fn new(
        tier: Tier,
        name: impl Into<String>,
        probe: impl FnOnce() -> HostResult<B> + 'a,
    ) -> Self {
        Self {
            tier,
            name: name.into(),
            probe: Box::new(probe),
        }
    }
}

/// Try `strategies` in order; the first that probes successfully wins.
pub(crate) fn resolve_first<B>(
    capability: Capability,
    strategies: Vec<Strategy<'_, B>>,
) -> (Option<B>, Resolution) {
    let mut tried = Vec::with_capacity(strategies.len());
    for Strategy { tier, name, probe } in strategies {
        match probe() {
            Ok(binding) => {
                debug!(capability = %capability, tier = %tier, via = %name, "capability resolved");
                let status = CapabilityStatus::Resolved { tier, via: name };
                return (Some(binding), Resolution { capability, status });
            }
            Err(e) => {
                debug!(capability = %capability, tier = %tier, via = %name, error = %e, "strategy failed");
                tried.push(name);
            }
        }
    }
    let status = CapabilityStatus::Unavailable { tried };
    (None, Resolution { capability, status })
}
