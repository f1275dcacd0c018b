//! Probes: the leaves of the executor tree.
//!
//! A probe produces a lazy, unbounded sequence of data points. The sequence
//! is restartable per lifecycle: every resume starts a fresh one.

mod stream;

use async_trait::async_trait;

use crate::domain::Measure;
use crate::error::Result;
use crate::executor::Executor;

pub use stream::{DatumStreamFactory, INTERVAL_KEY, StreamProbe};

/// A data-collecting leaf executor configured by one measure.
#[async_trait]
pub trait Probe: Executor {
    /// The measure currently configuring this probe.
    fn measure(&self) -> Option<Measure>;

    /// Bind the probe to its measure. Requires `Created`.
    async fn initialize(&self, measure: Measure) -> Result<()>;

    /// Replace the measure of a live probe (e.g. after a sampling schema
    /// adaptation). A running probe picks up the new configuration.
    async fn update(&self, measure: Measure) -> Result<()>;
}
