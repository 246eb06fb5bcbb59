use std::sync::Arc;

use st_core::{
    AccessTarget, Accessor, AiApi, EntityHandle, FieldValue, HostError, HostResult, TickRateApi,
    TickingApi,
};

/// Activation value the host treats as "never activated".
pub(crate) const INACTIVE_TICK: i64 = i32::MIN as i64;

fn mismatch(accessor: &dyn Accessor, expected: &'static str) -> HostError {
    HostError::TypeMismatch {
        name: accessor.name().to_string(),
        expected,
    }
}

pub(crate) enum TickingBinding {
    Api(Arc<dyn TickingApi>),
    /// Activation slot; written with the server tick to enable, `INACTIVE_TICK` to disable.
    Slot {
        slot: Arc<dyn Accessor>,
        clock: Arc<dyn Accessor>,
    },
}

impl TickingBinding {
    pub(crate) fn set(&self, entity: &dyn EntityHandle, enabled: bool) -> HostResult<()> {
        match self {
            Self::Api(api) => api.set_ticking(entity, enabled),
            Self::Slot { slot, clock } => {
                let value = if enabled {
                    match clock.get(AccessTarget::Server)? {
                        FieldValue::Int(tick) => tick,
                        _ => return Err(mismatch(clock.as_ref(), "int")),
                    }
                } else {
                    INACTIVE_TICK
                };
                slot.set(AccessTarget::Entity(entity), FieldValue::Int(value))
            }
        }
    }
}

pub(crate) enum AiBinding {
    Api(Arc<dyn AiApi>),
    /// Boolean awareness slot on mobs.
    Slot(Arc<dyn Accessor>),
}

impl AiBinding {
    pub(crate) fn set(&self, entity: &dyn EntityHandle, enabled: bool) -> HostResult<()> {
        match self {
            Self::Api(api) => api.set_ai(entity, enabled),
            Self::Slot(slot) => slot.set(AccessTarget::Entity(entity), FieldValue::Bool(enabled)),
        }
    }

    pub(crate) fn is_aware(&self, entity: &dyn EntityHandle) -> HostResult<bool> {
        match self {
            Self::Api(api) => api.is_aware(entity),
            Self::Slot(slot) => match slot.get(AccessTarget::Entity(entity))? {
                FieldValue::Bool(aware) => Ok(aware),
                _ => Err(mismatch(slot.as_ref(), "bool")),
            },
        }
    }
}

pub(crate) enum RateBinding {
    Api(Arc<dyn TickRateApi>),
    /// Server array of recent samples, most recent first.
    Samples(Arc<dyn Accessor>),
}

impl RateBinding {
    pub(crate) fn read(&self) -> HostResult<f64> {
        match self {
            Self::Api(api) => api.recent_rate(),
            Self::Samples(slot) => match slot.get(AccessTarget::Server)? {
                FieldValue::Samples(samples) => samples
                    .first()
                    .copied()
                    .ok_or_else(|| mismatch(slot.as_ref(), "non-empty samples")),
                FieldValue::Float(rate) => Ok(rate),
                _ => Err(mismatch(slot.as_ref(), "samples")),
            },
        }
    }
}
