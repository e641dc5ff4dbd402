//! Event primitives shared by the per-peer timer engine
//!
//! - `Signal`: coalescing enable/disable/send flag
//! - `Timer`: resettable deadline

pub mod signal;
pub mod timer;

pub use signal::Signal;
pub use timer::Timer;
