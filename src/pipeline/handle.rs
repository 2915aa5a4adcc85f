//! PipelineHandle - public API of the pipeline worker
//!
//! Frames are submitted fire-and-forget; mode switches and config reloads
//! wait for the worker's answer on a oneshot channel.

use tokio::sync::{broadcast, mpsc, oneshot};

use super::{PipelineCommand, PipelineError, PipelineSnapshot};
use crate::config::AppConfig;
use crate::gateway::Frame;

/// Cloneable handle to a running pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    cmd_tx: mpsc::Sender<PipelineCommand>,
    snapshots: broadcast::Sender<PipelineSnapshot>,
}

impl PipelineHandle {
    pub(super) fn new(
        cmd_tx: mpsc::Sender<PipelineCommand>,
        snapshots: broadcast::Sender<PipelineSnapshot>,
    ) -> Self {
        Self { cmd_tx, snapshots }
    }

    /// Receive snapshots; a lagging receiver loses the oldest ones
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineSnapshot> {
        self.snapshots.subscribe()
    }

    /// Queue a frame, waiting while the worker is busy
    pub async fn submit_frame(&self, frame: Frame) -> Result<(), PipelineError> {
        self.cmd_tx
            .send(PipelineCommand::Frame(frame))
            .await
            .map_err(|_| PipelineError::Stopped)
    }

    /// Queue a frame unless the input queue is full
    ///
    /// Returns false when the frame was dropped.
    pub fn try_submit_frame(&self, frame: Frame) -> bool {
        self.cmd_tx.try_send(PipelineCommand::Frame(frame)).is_ok()
    }

    /// Switch the active mode
    pub async fn switch_mode(&self, mode: impl Into<String>) -> Result<(), PipelineError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = PipelineCommand::SwitchMode {
            mode: mode.into(),
            response: Some(response_tx),
        };
        self.cmd_tx.send(cmd).await.map_err(|_| PipelineError::Stopped)?;

        response_rx.await.map_err(|_| PipelineError::Stopped)??;
        Ok(())
    }

    /// Replace the configuration; an invalid config leaves the old one active
    pub async fn reload_config(&self, config: AppConfig) -> Result<(), PipelineError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = PipelineCommand::ReloadConfig {
            config: Box::new(config),
            response: Some(response_tx),
        };
        self.cmd_tx.send(cmd).await.map_err(|_| PipelineError::Stopped)?;

        response_rx
            .await
            .map_err(|_| PipelineError::Stopped)?
            .map_err(PipelineError::Config)
    }

    /// Ask the worker to stop after the frame in progress
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(PipelineCommand::Stop).await;
    }
}
