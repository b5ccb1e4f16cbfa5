//! `rdk-operation` – single-flight arbitration of long-running actions.
//!
//! A resource that performs long-running work (a timed move, a scan, a homing
//! sequence) owns one [`OperationManager`].  Every time a new action starts,
//! the manager cancels the token of whatever action was in flight, so the
//! newest command always wins and nothing queues behind a stale one.
//!
//! Cancellation is cooperative: the manager only signals.  Code inside an
//! action must select on [`Operation::token`] (or use the helpers
//! [`OperationManager::new_timed_wait_op`] and
//! [`OperationManager::wait_for_success`]) to notice it has been superseded.

pub mod manager;

pub use manager::{Operation, OperationManager};
pub use tokio_util::sync::CancellationToken;
