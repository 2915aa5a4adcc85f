//! Per-frame gesture pipeline
//!
//! A single worker task owns every stage (trackers, smoothing, classifier,
//! debounce, dispatcher) and processes commands strictly in order:
//!
//! ```text
//! PipelineHandle ──commands──▶ PipelineWorker ──snapshots──▶ broadcast (drop-oldest)
//!                               │   ▲                    └──actions────▶ mpsc
//!                               ▼   │
//!                         InferenceGateway
//! ```
//!
//! The gateway calls are the only awaits inside a frame.

mod handle;
mod worker;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::{AppConfig, RightHandMode};
use crate::gateway::{Frame, InferenceGateway};
use crate::gesture::{GestureEvent, GestureObservation};
use crate::geometry::LandmarkSet;
use crate::modes::{ActionRequest, ModeError};
use crate::tracking::TrackSnapshot;

pub use handle::PipelineHandle;
pub use worker::{FrameReport, PipelineWorker};

/// Gesture events kept in each snapshot
pub const RECENT_EVENTS: usize = 8;

/// Commands accepted by the worker
#[derive(Debug)]
pub enum PipelineCommand {
    Frame(Frame),
    SwitchMode {
        mode: String,
        response: Option<oneshot::Sender<Result<(), ModeError>>>,
    },
    ReloadConfig {
        config: Box<AppConfig>,
        response: Option<oneshot::Sender<anyhow::Result<()>>>,
    },
    Stop,
}

/// Errors returned through [`PipelineHandle`]
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline has stopped")]
    Stopped,

    #[error(transparent)]
    Mode(#[from] ModeError),

    #[error("config rejected: {0:#}")]
    Config(anyhow::Error),
}

/// One hand as seen by the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandView {
    #[serde(flatten)]
    pub track: TrackSnapshot,
    /// Smoothed landmarks of this frame
    pub landmarks: Option<LandmarkSet>,
    pub landmark_confidence: Option<f32>,
}

/// State published after every processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSnapshot {
    pub frame_index: u64,
    pub ts: Duration,
    pub tracks: Vec<HandView>,
    pub gestures: Vec<GestureObservation>,
    pub active_mode: String,
    pub right_hand_mode: RightHandMode,
    /// Most recent gesture events, oldest first
    pub last_events: Vec<GestureEvent>,
}

/// Channel sizes
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub command_capacity: usize,
    pub snapshot_capacity: usize,
    pub action_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            command_capacity: 4,
            snapshot_capacity: 16,
            action_capacity: 256,
        }
    }
}

/// Running pipeline: control handle, action stream and worker task
pub struct Pipeline {
    pub handle: PipelineHandle,
    pub actions: mpsc::Receiver<ActionRequest>,
    pub task: JoinHandle<()>,
}

/// Validate the config and start the worker task
pub fn spawn(
    config: AppConfig,
    gateway: Arc<dyn InferenceGateway>,
    clock: Arc<dyn Clock>,
    options: PipelineOptions,
) -> anyhow::Result<Pipeline> {
    config.validate()?;

    let (cmd_tx, cmd_rx) = mpsc::channel(options.command_capacity.max(1));
    let (snapshot_tx, _) = broadcast::channel(options.snapshot_capacity.max(1));
    let (action_tx, action_rx) = mpsc::channel(options.action_capacity.max(1));

    let worker = PipelineWorker::new(config, gateway, clock, snapshot_tx.clone(), action_tx);
    let task = tokio::spawn(worker.run(cmd_rx));

    Ok(Pipeline {
        handle: PipelineHandle::new(cmd_tx, snapshot_tx),
        actions: action_rx,
        task,
    })
}
