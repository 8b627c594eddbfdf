//! # tt-optimizer
//!
//! Parameter search for RF ion-trap designs.
//!
//! Provides the normalized search space, the trap objective, a Nelder-Mead
//! simplex driven one oracle evaluation at a time, run and trial tracking,
//! a durable CSV trial log, and readers for trial logs and solver sweep
//! exports.

mod config;
mod constraint;
mod driver;
mod log;
mod objective;
pub mod oracle;
mod simplex;
mod space;
mod sweep;
mod trial;

pub use config::OptimizationConfig;
pub use constraint::{EndcapThickness, InscribedCylinder};
pub use driver::Optimizer;
pub use log::{
    log_header, read_trial_log, ColumnStats, TrialLogTable, TrialLogger, OUTCOME_COLUMN,
    SCORE_COLUMN,
};
pub use objective::{assess, score, Assessment, ScoreBreakdown};
pub use oracle::{Oracle, OracleBackend, ProcessBackend, StubBackend, StubOracle};
pub use simplex::{Coefficients, NelderMead, Tolerance};
pub use space::{denormalize, ParameterSpace};
pub use sweep::{load_sweep_dir, load_sweep_file, parse_sweep_file_name, SweepFile};
pub use trial::{OptimizationRun, RunId, RunState, Trial, TrialOutcome};
