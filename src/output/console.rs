//! Console sink - logs every action request instead of injecting input

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace};

use super::InputSink;
use crate::modes::{ActionRequest, InputAction};

/// Logs actions to the console, useful for replays and dry runs
pub struct ConsoleSink {
    name: String,
    performed: AtomicU64,
    /// Pointer moves are frequent; they are only logged at trace level
    quiet_moves: bool,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            performed: AtomicU64::new(0),
            quiet_moves: true,
        }
    }

    pub fn with_verbose_moves(mut self) -> Self {
        self.quiet_moves = false;
        self
    }

    pub fn performed(&self) -> u64 {
        self.performed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl InputSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform(&self, request: &ActionRequest) -> Result<()> {
        let n = self.performed.fetch_add(1, Ordering::Relaxed) + 1;

        if self.quiet_moves && matches!(request.action, InputAction::MouseMove { .. }) {
            trace!(hand = %request.hand, action = %request.action, "Pointer move");
            return Ok(());
        }

        let gesture = request
            .gesture_id
            .as_deref()
            .map(|g| format!(" [{}]", g))
            .unwrap_or_default();

        info!(
            "🎮 [{}] {} hand → {}{} {} [#{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            request.hand,
            request.action,
            gesture,
            request.description,
            n
        );
        debug!(
            sink = %self.name,
            request = ?request,
            "ConsoleSink action"
        );

        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            "🛑 ConsoleSink '{}' shutting down ({} actions)",
            self.name,
            self.performed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Hand;
    use crate::output::run_sink;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn request(action: InputAction) -> ActionRequest {
        ActionRequest {
            gesture_id: Some("fist_gesture".to_string()),
            hand: Hand::Left,
            action,
            description: "Fullscreen".to_string(),
            ts: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_console_sink_counts_actions() {
        let sink = ConsoleSink::new("test");
        sink.perform(&request(InputAction::KeyPress {
            keys: vec!["f".to_string()],
        }))
        .await
        .unwrap();
        sink.perform(&request(InputAction::MouseMove { x: 10.0, y: 20.0 }))
            .await
            .unwrap();
        assert_eq!(sink.performed(), 2);
    }

    #[tokio::test]
    async fn test_run_sink_drains_channel() {
        let sink = ConsoleSink::new("drain").with_verbose_moves();
        let (tx, rx) = mpsc::channel(4);
        tx.send(request(InputAction::MouseScroll { amount: -12 })).await.unwrap();
        tx.send(request(InputAction::MouseScroll { amount: 7 })).await.unwrap();
        drop(tx);

        run_sink(&sink, rx).await.unwrap();
        assert_eq!(sink.performed(), 2);
    }
}
