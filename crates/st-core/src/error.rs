use crate::entity::EntityId;
use crate::surface::InternalType;

/// Alias for `Result<T, HostError>`.
pub type HostResult<T> = Result<T, HostError>;

/// Errors reported by a host collaborator.
///
/// None of these are fatal to the engine. Callers log and skip.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The entity was removed from the simulation.
    #[error("entity is no longer alive: {0}")]
    EntityGone(EntityId),

    /// The named internal accessor does not exist on this host version.
    #[error("no accessor `{name}` on {owner}")]
    UnknownAccessor {
        /// Internal type that was searched.
        owner: InternalType,
        /// Candidate name that failed to resolve.
        name: String,
    },

    /// The accessor exists but holds a different value type.
    #[error("accessor `{name}` rejected value: expected {expected}")]
    TypeMismatch {
        /// Accessor name.
        name: String,
        /// The value type the accessor holds.
        expected: &'static str,
    },

    /// The handle was produced by a different host implementation.
    #[error("foreign entity handle")]
    ForeignHandle,

    /// The operation does not apply to this target (e.g. AI on a non-mob).
    #[error("unsupported: {0}")]
    Unsupported(String),
}
