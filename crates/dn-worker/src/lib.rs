//! Channel-agnostic worker: the `WorkerPipeline` state machine, its
//! `ChannelAdapter` implementations, and the StatusAPI/health/metrics HTTP
//! surface mounted into each worker binary.

pub mod adapter;
pub mod adapters;
pub mod api;
pub mod pipeline;

pub use adapter::{ChannelAdapter, RenderedBody, ValidationError};
pub use adapters::{EmailAdapter, PushAdapter};
pub use api::{create_router, AppState};
pub use pipeline::{WorkerMetrics, WorkerPipeline, WorkerPipelineConfig};
