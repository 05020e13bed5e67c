use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::backend::rest::HistoryClient;
use crate::backend::ws::StreamClient;
use crate::config::Config;
use crate::event::AppEvent;

const APP_EVENT_CAPACITY: usize = 256;

/// One subscription: history preload followed by the live stream.
pub struct StreamSession {
    app_rx: mpsc::Receiver<AppEvent>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamSession {
    pub fn spawn(config: &Config, history: Arc<HistoryClient>, stream: Arc<StreamClient>) -> Self {
        let (app_tx, app_rx) = mpsc::channel::<AppEvent>(APP_EVENT_CAPACITY);
        let (stop_tx, stop_rx) = watch::channel(false);
        let symbol = config.chart.normalized_symbol();
        let interval = config.chart.interval.clone();
        let limit = config.chart.max_candles;

        let task = tokio::spawn(async move {
            // Fetch historical candles to pre-fill chart
            let result = history.fetch_series(&symbol, &interval, limit).await;
            match &result {
                Ok(candles) => tracing::info!(count = candles.len(), "Fetched candle history"),
                Err(e) => tracing::warn!(
                    error = %e,
                    "Failed to fetch candle history, starting with empty chart"
                ),
            }
            let _ = app_tx.send(AppEvent::from_history_fetch(result)).await;

            if let Err(e) = stream.connect_and_run(app_tx, stop_rx).await {
                tracing::error!(error = %e, "Stream task failed");
            }
        });

        Self {
            app_rx,
            stop_tx,
            task,
        }
    }

    /// Next pending event, if any. Never blocks.
    pub fn try_recv(&mut self) -> Option<AppEvent> {
        self.app_rx.try_recv().ok()
    }

    /// Signal shutdown and cancel whatever the task is waiting on (history
    /// request, connect attempt, backoff). Events not yet drained are lost.
    /// The returned handle resolves once the cancellation has landed.
    pub fn stop(self) -> JoinHandle<()> {
        let _ = self.stop_tx.send(true);
        drop(self.app_rx);
        self.task.abort();
        self.task
    }
}
