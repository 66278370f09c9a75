//! # Event consumers shipped with the crate.
//!
//! - [`LogWriter`] renders loader lifecycle events through `tracing`.

mod log;

pub use log::LogWriter;
