//! Progress reporting for audits
//!
//! An explicit handler instance is threaded through constructors; there is no
//! process-wide progress singleton.

pub mod handler;
pub mod logging;

pub use handler::{NoOpHandler, ProgressEvent, ProgressHandler};
pub use logging::LoggingHandler;
