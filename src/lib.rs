//! Cartridge Engine — domain-scoped event processing pipelines.
//!
//! The upstream system pipeline classifies an event and hands the envelope
//! to [`pipeline::PipelineRunner::run`]. The runner fans out to every
//! enabled domain's cartridge pipeline concurrently, then to every member's
//! personal pipeline. Cartridge content is managed at runtime through
//! [`lifecycle::LifecycleManager`].

pub mod autonomy;
pub mod config;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod resolver;
