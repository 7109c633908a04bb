//! Call session state and the process-wide session registry.

pub mod session;

pub use session::{CallRegistry, CallSession};
