//! Shared bookkeeping for composite executors.

use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{Executor, ExecutorState, StreamGroup};
use crate::domain::DataPoint;
use crate::error::{Error, Result};

/// Command fanned out to every child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FanOut {
    Pause,
    Resume,
}

impl FanOut {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
        }
    }
}

/// State, children and merged stream of a composite executor.
pub(crate) struct ExecutorCore<C: ?Sized> {
    name: String,
    state: Mutex<ExecutorState>,
    group: StreamGroup<DataPoint>,
    children: Mutex<Vec<Arc<C>>>,
}

impl<C> ExecutorCore<C>
where
    C: Executor + ?Sized,
{
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        Self {
            group: StreamGroup::with_capacity(name.clone(), capacity),
            name,
            state: Mutex::new(ExecutorState::Created),
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ExecutorState {
        *self.state.lock()
    }

    pub fn events(&self) -> broadcast::Receiver<DataPoint> {
        self.group.subscribe()
    }

    /// Check that `target` is reachable without changing state.
    pub fn ensure(&self, target: ExecutorState) -> Result<()> {
        self.state().transition_to(target).map(|_| ())
    }

    /// Validate and apply a transition atomically.
    pub fn transition(&self, target: ExecutorState) -> Result<()> {
        let mut state = self.state.lock();
        *state = state.transition_to(target)?;
        debug!(executor = %self.name, state = %target, "Executor state changed");
        Ok(())
    }

    /// Register a child: its stream joins the merged stream before it is
    /// appended to the child list.
    pub fn attach(&self, child: Arc<C>) {
        self.group.add(child.events());
        self.children.lock().push(child);
    }

    pub fn children(&self) -> Vec<Arc<C>> {
        self.children.lock().clone()
    }

    /// Issue `command` to `targets` in list order and drive them
    /// concurrently. Failures are aggregated into one warning.
    ///
    /// Returns the number of children that failed.
    pub async fn propagate(&self, command: FanOut, targets: Vec<Arc<C>>) -> usize {
        let results = join_all(targets.iter().map(|child| async move {
            let result = match command {
                FanOut::Pause => child.pause().await,
                FanOut::Resume => child.resume().await,
            };
            (child.name().to_string(), result)
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| format!("{}: {}", name, e)))
            .collect();

        if !failures.is_empty() {
            warn!(
                executor = %self.name,
                command = command.as_str(),
                failed = failures.len(),
                errors = ?failures,
                "Some children failed to {}",
                command.as_str()
            );
        }
        failures.len()
    }

    /// Stop every child sequentially, in list order.
    pub async fn stop_children(&self) {
        for child in self.children() {
            if let Err(e) = child.stop().await {
                warn!(executor = %self.name, child = %child.name(), error = %e, "Failed to stop child");
            }
        }
    }

    /// Release the merged stream. No further items are forwarded.
    pub fn close_stream(&self) {
        self.group.close();
    }

    /// Shared stop sequence. Returns `false` when already stopped.
    ///
    /// A composite executor must have been started to be stopped.
    pub async fn stop(&self) -> Result<bool> {
        let state = self.state();
        if state == ExecutorState::Stopped {
            debug!(executor = %self.name, "Executor already stopped");
            return Ok(false);
        }
        if !state.is_live() {
            return Err(Error::invalid_transition(state, ExecutorState::Stopped));
        }

        self.stop_children().await;
        self.close_stream();
        self.transition(ExecutorState::Stopped)?;
        Ok(true)
    }
}
