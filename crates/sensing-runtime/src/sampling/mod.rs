//! Sampling schemas, sampling packages and power-awareness.

pub mod package;
pub mod power;
pub mod schema;

pub use package::{SamplingPackage, SamplingPackageRegistry};
pub use power::PowerAwarenessState;
pub use schema::{SamplingSchema, SamplingSchemaType};
