//! The executor tree: study executor → task executors → probes.
//!
//! Every node is an [`Executor`]: a lifecycle state machine with a broadcast
//! stream of produced data points. Parents fan control commands out to their
//! children and fan the children's streams in through a [`StreamGroup`].
//!
//! Ordering rules:
//! - `start` and `stop` walk the children sequentially, in declaration order.
//! - `pause` and `resume` issue the command to every child in list order but
//!   drive them concurrently, so a slow child does not stall its siblings. A
//!   failing child is logged and does not fail the parent's transition.

mod node;
pub mod group;
pub mod state;
pub mod study;
pub mod task;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::DataPoint;
use crate::error::Result;

pub use group::StreamGroup;
pub use state::ExecutorState;
pub use study::StudyExecutor;
pub use task::TaskExecutor;

pub(crate) use node::{ExecutorCore, FanOut};

/// A controllable node of the executor tree.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Identifying name.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ExecutorState;

    /// Subscribe to the data points produced by this node (and its children).
    ///
    /// Late subscribers only miss items emitted before they subscribed.
    fn events(&self) -> broadcast::Receiver<DataPoint>;

    /// Start the executor. Requires `Initialized`.
    async fn start(&self) -> Result<()>;

    /// Pause a running executor.
    async fn pause(&self) -> Result<()>;

    /// Resume a paused executor.
    async fn resume(&self) -> Result<()>;

    /// Stop the executor. Stopping an already stopped executor is a no-op.
    async fn stop(&self) -> Result<()>;
}
