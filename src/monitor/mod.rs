//! Background monitor that tails simulation output into a metrics sink.
//!
//! A monitor owns a single poll loop. Each cycle checks the energy file,
//! the COLVAR time series, the HILLS deposition log and the engine log,
//! emitting only what has appeared since the previous cycle.

mod bookmark;
mod error;
pub mod poll;
mod registry;
mod runner;
mod state;

pub use bookmark::Bookmarks;
pub use error::{MonitorError, StreamError};
pub use poll::{keys, PollReport, Poller, StreamFailure, StreamKind};
pub use registry::MonitorRegistry;
pub use runner::{MdMonitor, MonitorSnapshot, StartReport, StopOutcome};
pub use state::MonitorState;
