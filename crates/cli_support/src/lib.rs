pub mod common;
pub mod logging;

pub use common::{BackendArg, LogArgs};
pub use logging::{init_tracing, LoggingError};
