pub mod errors;
pub mod metrics;
pub mod objective;
pub mod parameters;

pub use errors::*;
pub use metrics::*;
pub use objective::*;
pub use parameters::*;
