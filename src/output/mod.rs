//! Action output boundary
//!
//! The system-level input service (key injection, mouse control) lives
//! outside this crate. Sinks receive every [`ActionRequest`] the pipeline
//! produces.

pub mod console;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::modes::ActionRequest;

pub use console::ConsoleSink;

/// Consumer of action requests
///
/// Methods take `&self`; sinks use interior mutability for counters or
/// connections.
#[async_trait]
pub trait InputSink: Send + Sync {
    /// Sink name for logs
    fn name(&self) -> &str;

    /// Perform one action
    async fn perform(&self, request: &ActionRequest) -> Result<()>;

    /// Called once when the action stream ends
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Drain an action channel into a sink until the pipeline closes it
///
/// Failures of single actions are logged and do not stop the stream.
pub async fn run_sink<S: InputSink + ?Sized>(sink: &S, mut actions: mpsc::Receiver<ActionRequest>) -> Result<()> {
    debug!("Input sink '{}' started", sink.name());
    while let Some(request) = actions.recv().await {
        if let Err(e) = sink.perform(&request).await {
            warn!("Input sink '{}' failed on {}: {:#}", sink.name(), request.action, e);
        }
    }
    sink.shutdown().await
}
