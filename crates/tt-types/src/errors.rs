use thiserror::Error;

/// Main error type for the TrapTune system
#[derive(Error, Debug)]
pub enum TtError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Trial log error: {0}")]
    Log(#[from] LogError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Run-configuration errors. All of these are fatal before the first trial.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("No parameters specified")]
    NoParameters,

    #[error("Parameter name must not be empty")]
    EmptyName,

    #[error("Duplicate parameter: {name}")]
    DuplicateParameter { name: String },

    #[error("Invalid bounds for {name}: lower {lower} must be below upper {upper}")]
    InvalidBounds { name: String, lower: f64, upper: f64 },

    #[error("Non-finite value for {field}: {value}")]
    NonFinite { field: String, value: f64 },

    #[error("Dimension mismatch: expected {expected} coordinates, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unknown parameter {name} referenced by {context}")]
    UnknownParameter { name: String, context: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{message}")]
    Invalid { message: String },
}

/// Outcomes the simulation oracle can report instead of metrics.
///
/// The optimizer treats every variant the same way during a run (penalty
/// score, trial marked failed). The distinction only matters for operator
/// diagnostics and for session setup, where any error aborts the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle unavailable: {message}")]
    Unavailable { message: String },

    #[error("Model load failed: {message}")]
    ModelLoad { message: String },

    #[error("Solver did not converge: {message}")]
    SolverFailed { message: String },

    #[error("Oracle timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Metric {metric} is not finite: {value}")]
    NonFiniteMetric { metric: String, value: f64 },

    #[error("Oracle protocol error: {message}")]
    Protocol { message: String },
}

/// Trial log errors
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Log IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write trial row: {message}")]
    Write { message: String },

    #[error("Failed to read trial log {path}: {message}")]
    Read { path: String, message: String },

    #[error("Trial parameters {actual:?} do not match log header {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Column not found in log: {name}")]
    MissingColumn { name: String },
}

/// Run lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for TrapTune operations
pub type TtResult<T> = Result<T, TtError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TtError::Config($crate::ConfigError::Invalid {
            message: format!($($arg)*),
        })
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::TtError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::InvalidBounds {
            name: "V_rf".to_string(),
            lower: 1000.0,
            upper: 0.0,
        };

        assert!(error.to_string().contains("V_rf"));
        assert!(error.to_string().contains("1000"));
        assert!(error.to_string().contains("lower"));
    }

    #[test]
    fn test_error_conversion() {
        let oracle_error = OracleError::SolverFailed {
            message: "stationary solver diverged".to_string(),
        };
        let tt_error: TtError = oracle_error.into();

        match tt_error {
            TtError::Oracle(OracleError::SolverFailed { .. }) => (),
            _ => panic!("Expected Oracle error"),
        }
    }

    #[test]
    fn test_macros() {
        let config_err = config_error!("Missing required field: {}", "parameters");
        assert!(config_err.to_string().contains("parameters"));

        let internal_err = internal_error!("Something went wrong");
        assert!(matches!(internal_err, TtError::Internal(_)));
    }
}
