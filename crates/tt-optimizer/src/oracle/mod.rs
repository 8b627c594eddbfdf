//! Simulation oracle interface.
//!
//! The electromagnetic solver is an external, stateful resource: loading a
//! model is expensive and only one evaluation may run at a time. A
//! [`OracleBackend`] hands out an exclusively owned session for the lifetime
//! of one optimization run; the driver holds it by `&mut` and releases it when
//! the run ends.

mod process;
mod stub;

pub use process::{ProcessBackend, ProcessOracle};
pub use stub::{StubBackend, StubOracle};

use tt_types::{OracleError, PhysicalParameters, TrapMetrics};

/// An open, loaded simulation model.
pub trait Oracle {
    /// Evaluate one parameter set. Failures are not retried by the caller.
    fn evaluate(&mut self, params: &PhysicalParameters) -> Result<TrapMetrics, OracleError>;

    /// Release the underlying model. Called once at the end of a run.
    fn release(&mut self) -> Result<(), OracleError> {
        Ok(())
    }

    /// Short human-readable name for logs.
    fn name(&self) -> &str;
}

/// Acquires oracle sessions.
pub trait OracleBackend {
    type Session: Oracle;

    /// Start the solver and load the model. An error here is a setup failure
    /// and aborts the run before any trial.
    fn open(&mut self) -> Result<Self::Session, OracleError>;
}
