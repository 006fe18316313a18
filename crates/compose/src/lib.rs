//! SideBySide Compose
//!
//! Turns two clips into one labelled before/after artifact:
//! - **Plan:** compile offsets and output kind into a typed filter graph
//! - **Execute:** stage inputs, run the plan on the shared engine, publish state
//! - **Materialize:** validate the engine's output and hand it to the caller
//!
//! Failures are classified into a small set of user-facing kinds.

pub mod artifact;
pub mod classify;
pub mod clip;
pub mod executor;
pub mod graph;
pub mod plan;

pub use artifact::{ArtifactSummary, ComposedArtifact};
pub use classify::{classify, FailureKind, JobFailure};
pub use clip::{ClipDuration, ClipOffset, OutputKind, Pair, SourceClip};
pub use executor::{ComposeRequest, FontAsset, GenerateError, JobState, Pipeline};
pub use plan::TranscodePlan;
