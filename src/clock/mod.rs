//! Time sources for the swarm
//!
//! - **Wall clock**: injectable `Clock` used for timeouts, decay and validity windows
//! - **Vector clock**: causal ordering for replicated memory operations

mod vector;
mod wall;

pub use vector::{ClockOrdering, VectorClock};
pub use wall::{Clock, ManualClock, SharedClock, SystemClock};
