//! Serial "mailbox" executors layered on a shared worker pool.
//!
//! Split into focused submodules:
//! - `core`: the drain-until-empty loop shared by both executors
//! - `consecutive`: FIFO mailbox
//! - `priority`: mailbox with fixed priority lanes

mod consecutive;
mod core;
mod priority;

pub use self::consecutive::ConsecutiveExecutor;
pub use self::priority::PriorityConsecutiveExecutor;
