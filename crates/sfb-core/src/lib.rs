//! ---
//! sfb_section: "01-core-functionality"
//! sfb_subsection: "module"
//! sfb_type: "source"
//! sfb_scope: "code"
//! sfb_description: "Ingest pipeline and runtime wiring."
//! sfb_version: "v0.0.0-prealpha"
//! sfb_owner: "tbd"
//! ---
//! Ingest pipeline for the Smart Factory bridge: normalize, persist the
//! telemetry row, record the factory heartbeat, then drive alert state.

pub mod bootstrap;
pub mod pipeline;

pub use bootstrap::{build_pipeline, build_store};
pub use pipeline::{IngestOutcome, IngestPipeline, PipelineError};
