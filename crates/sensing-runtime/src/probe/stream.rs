//! Generic probe driven by a stream factory.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Probe;
use crate::domain::{DataPoint, Datum, Measure};
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorState};

/// Measure configuration key holding the sampling interval in milliseconds.
pub const INTERVAL_KEY: &str = "interval_ms";

const PROBE_CHANNEL_CAPACITY: usize = 256;

/// Builds a fresh datum stream for a measure. Called on every (re)start.
pub type DatumStreamFactory = Arc<dyn Fn(&Measure) -> BoxStream<'static, Datum> + Send + Sync>;

struct Running {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

/// A probe whose data comes from a stream created per resume.
///
/// Pausing drops the current stream; resuming asks the factory for a new
/// one, so the factory sees the latest measure configuration.
pub struct StreamProbe {
    name: String,
    factory: DatumStreamFactory,
    state: Mutex<ExecutorState>,
    measure: Mutex<Option<Measure>>,
    sender: broadcast::Sender<DataPoint>,
    running: Mutex<Option<Running>>,
}

impl StreamProbe {
    pub fn new(name: impl Into<String>, factory: DatumStreamFactory) -> Self {
        let (sender, _) = broadcast::channel(PROBE_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            factory,
            state: Mutex::new(ExecutorState::Created),
            measure: Mutex::new(None),
            sender,
            running: Mutex::new(None),
        }
    }

    /// Probe forwarding datums pushed into a broadcast channel.
    ///
    /// Each resume subscribes anew; datums sent while paused are not seen.
    pub fn from_broadcast(name: impl Into<String>, source: broadcast::Sender<Datum>) -> Self {
        let factory: DatumStreamFactory = Arc::new(move |_measure: &Measure| {
            let rx = source.subscribe();
            futures::stream::unfold(rx, |mut rx| async move {
                loop {
                    match rx.recv().await {
                        Ok(datum) => return Some((datum, rx)),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            })
            .boxed()
        });
        Self::new(name, factory)
    }

    /// Probe sampling `sample` on a fixed interval.
    ///
    /// The interval comes from the measure's `interval_ms` configuration,
    /// falling back to `default_interval`. Samples returning `None` are
    /// skipped.
    pub fn periodic<F>(name: impl Into<String>, default_interval: Duration, sample: F) -> Self
    where
        F: Fn(&Measure) -> Option<Datum> + Send + Sync + 'static,
    {
        let sample = Arc::new(sample);
        let factory: DatumStreamFactory = Arc::new(move |measure: &Measure| {
            let period = measure
                .config_u64(INTERVAL_KEY)
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default_interval);
            let state = (None::<tokio::time::Interval>, measure.clone(), Arc::clone(&sample));

            futures::stream::unfold(state, move |(ticker, measure, sample)| async move {
                let mut ticker = ticker.unwrap_or_else(|| {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    ticker
                });
                loop {
                    ticker.tick().await;
                    if let Some(datum) = sample(&measure) {
                        return Some((datum, (Some(ticker), measure, sample)));
                    }
                }
            })
            .boxed()
        });
        Self::new(name, factory)
    }

    fn set_state(&self, target: ExecutorState) -> Result<()> {
        let mut state = self.state.lock();
        *state = state.transition_to(target)?;
        debug!(probe = %self.name, state = %target, "Probe state changed");
        Ok(())
    }

    fn spawn_stream(&self) -> Result<()> {
        let measure = self
            .measure
            .lock()
            .clone()
            .ok_or_else(|| Error::probe(&self.name, "probe has no measure"))?;

        // Build the stream here so its subscriptions exist once start returns.
        let mut stream = (self.factory)(&measure);
        let sender = self.sender.clone();
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => break,

                    next = stream.next() => match next {
                        Some(datum) => {
                            let _ = sender.send(DataPoint::from_datum(datum));
                        }
                        None => break,
                    }
                }
            }
        });

        if let Some(previous) = self.running.lock().replace(Running {
            cancel_token,
            handle,
        }) {
            previous.cancel_token.cancel();
        }
        Ok(())
    }

    fn cancel_stream(&self) {
        if let Some(running) = self.running.lock().take() {
            running.cancel_token.cancel();
            drop(running.handle);
        }
    }
}

#[async_trait]
impl Executor for StreamProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ExecutorState {
        *self.state.lock()
    }

    fn events(&self) -> broadcast::Receiver<DataPoint> {
        self.sender.subscribe()
    }

    async fn start(&self) -> Result<()> {
        let state = self.state();
        if state != ExecutorState::Initialized {
            return Err(Error::invalid_transition(state, ExecutorState::Resumed));
        }
        self.spawn_stream()?;
        self.set_state(ExecutorState::Resumed)
    }

    async fn pause(&self) -> Result<()> {
        let state = self.state();
        if state == ExecutorState::Paused {
            return Ok(());
        }
        state.transition_to(ExecutorState::Paused)?;
        self.cancel_stream();
        self.set_state(ExecutorState::Paused)
    }

    async fn resume(&self) -> Result<()> {
        let state = self.state();
        if state == ExecutorState::Resumed {
            return Ok(());
        }
        if state != ExecutorState::Paused {
            return Err(Error::invalid_transition(state, ExecutorState::Resumed));
        }
        self.spawn_stream()?;
        self.set_state(ExecutorState::Resumed)
    }

    async fn stop(&self) -> Result<()> {
        let state = self.state();
        if state == ExecutorState::Stopped {
            return Ok(());
        }
        state.transition_to(ExecutorState::Stopped)?;
        self.cancel_stream();
        self.set_state(ExecutorState::Stopped)
    }
}

#[async_trait]
impl Probe for StreamProbe {
    fn measure(&self) -> Option<Measure> {
        self.measure.lock().clone()
    }

    async fn initialize(&self, measure: Measure) -> Result<()> {
        self.state().transition_to(ExecutorState::Initialized)?;
        *self.measure.lock() = Some(measure);
        self.set_state(ExecutorState::Initialized)
    }

    async fn update(&self, measure: Measure) -> Result<()> {
        if self.state() == ExecutorState::Stopped {
            return Err(Error::probe(&self.name, "cannot update a stopped probe"));
        }
        let changed = self.measure.lock().replace(measure.clone()) != Some(measure);
        if changed && self.state() == ExecutorState::Resumed {
            debug!(probe = %self.name, "Restarting probe with updated measure");
            self.cancel_stream();
            self.spawn_stream()?;
        }
        Ok(())
    }
}

impl Drop for StreamProbe {
    fn drop(&mut self) {
        self.cancel_stream();
    }
}
