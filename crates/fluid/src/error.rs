//! Error type for configuration failures and particle lookups.
//!
//! Only construction-time problems and explicit lookups surface as errors.
//! Transient physical conditions (cell overflow, stray particles, neighbor
//! truncation) are counted in [`crate::StepDiagnostics`] instead.

use thiserror::Error;

use crate::particle::ParticleId;
use crate::substance::SubstanceId;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A `SimulationSettings` field is out of its documented range.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A substance parameter set violates its invariants.
    #[error("invalid substance {id}: {reason}")]
    InvalidSubstance { id: usize, reason: String },

    /// The solver needs at least one substance.
    #[error("substance table is empty")]
    EmptySubstanceTable,

    /// A substance id does not index into the table.
    #[error("unknown substance id {0:?}")]
    UnknownSubstance(SubstanceId),

    /// A proximity request has a bad range or refers to a missing substance.
    #[error("invalid proximity request #{index}: {reason}")]
    InvalidProximityRequest { index: usize, reason: String },

    /// Two requests watch the same unordered substance pair.
    #[error("duplicate proximity request for substances {a:?} and {b:?}")]
    DuplicateProximityRequest { a: SubstanceId, b: SubstanceId },

    /// The id was never issued or its particle has been removed.
    #[error("particle {0} not found")]
    ParticleNotFound(ParticleId),

    /// The particle store already holds `max` particles.
    #[error("particle capacity exhausted (max {max})")]
    CapacityExhausted { max: usize },

    /// Initial particle state was rejected (e.g. non-finite position).
    #[error("invalid particle: {0}")]
    InvalidParticle(String),

    /// Scenario file could not be parsed.
    #[error("scenario: {0}")]
    Scenario(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_the_problem() {
        let e = Error::InvalidSubstance {
            id: 2,
            reason: "density 12 outside [0, 10]".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("substance 2"), "got {msg}");
        assert!(msg.contains("density"), "got {msg}");
    }

    #[test]
    fn test_duplicate_request_message() {
        let e = Error::DuplicateProximityRequest {
            a: SubstanceId(0),
            b: SubstanceId(1),
        };
        assert!(e.to_string().contains("duplicate"));
    }
}
