use crate::commands::aggregator::run_cycle;
use crate::commands::display::{build_frame, DashboardSink};
use crate::commands::history::HistoryStore;
use crate::error::Result;
use crate::models::config::MonitorConfig;
use crate::models::history::HistorySeries;
use crate::models::snapshot::MetricsSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running { cycle: u64 },
    Stopped,
}

/// Requests a stop. The loop finishes any in-flight cycle first.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Owns the interval, the state and the shutdown receiver. Cycles never
/// overlap: cycle N+1 starts only after cycle N has been persisted and
/// published.
pub struct ScanController {
    config: Arc<MonitorConfig>,
    history: std::result::Result<HistoryStore, String>,
    state: ScanState,
    cycles_completed: u64,
    shutdown: watch::Receiver<bool>,
}

impl ScanController {
    /// `history` is the store to persist into, or the reason it could not be
    /// opened; without a store every cycle is still published.
    pub fn new(
        config: MonitorConfig,
        history: std::result::Result<HistoryStore, String>,
    ) -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        let controller = Self {
            config: Arc::new(config),
            history,
            state: ScanState::Idle,
            cycles_completed: 0,
            shutdown: rx,
        };
        (controller, ShutdownHandle { tx: Arc::new(tx) })
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Runs until stopped. The first cycle starts immediately.
    pub async fn run(&mut self, sink: &mut dyn DashboardSink) {
        log::info!(
            "monitoring {} every {}s",
            self.config.source_dir.display(),
            self.config.interval.as_secs()
        );

        while !self.stop_requested() {
            self.run_one_cycle(sink).await;
            if self.stop_requested() {
                break;
            }

            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = wait_for_stop(&mut shutdown) => {}
            }
        }

        self.state = ScanState::Stopped;
        log::info!("scan loop stopped after {} cycles", self.cycles_completed);
    }

    /// A single cycle, then stop.
    pub async fn run_once(&mut self, sink: &mut dyn DashboardSink) {
        self.run_one_cycle(sink).await;
        self.state = ScanState::Stopped;
    }

    fn stop_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run_one_cycle(&mut self, sink: &mut dyn DashboardSink) {
        let cycle = self.cycles_completed + 1;
        self.state = ScanState::Running { cycle };
        sink.scanning(cycle);

        // A panic inside aggregation surfaces here as a JoinError instead of
        // taking the loop down.
        match tokio::spawn(run_cycle(Arc::clone(&self.config))).await {
            Ok(Ok(report)) => self.publish(cycle, report.snapshot, sink),
            Ok(Err(e)) => log::error!("cycle {cycle} failed: {e}"),
            Err(e) => log::error!("cycle {cycle} aborted by an internal error: {e}"),
        }

        self.cycles_completed = cycle;
        self.state = ScanState::Idle;
    }

    fn publish(&self, cycle: u64, snapshot: MetricsSnapshot, sink: &mut dyn DashboardSink) {
        let history = match &self.history {
            Ok(store) => self.record(store, &snapshot, sink),
            Err(reason) => {
                sink.history_unavailable(reason);
                HistorySeries::new(vec![snapshot.clone()])
            }
        };

        let frame = build_frame(cycle, &snapshot, &history, &self.config);
        sink.publish(&frame);
    }

    /// Persists, prunes and reads back the series ending with `snapshot`. A
    /// failed write is reported but the current snapshot is still shown.
    fn record(
        &self,
        store: &HistoryStore,
        snapshot: &MetricsSnapshot,
        sink: &mut dyn DashboardSink,
    ) -> HistorySeries {
        let persisted = match persist_and_prune(store, snapshot, &self.config) {
            Ok(()) => true,
            Err(e) => {
                log::error!("failed to persist snapshot: {e}");
                sink.history_unavailable(&e.to_string());
                false
            }
        };

        match store.series(self.config.trend_window) {
            Ok(series) if persisted => series,
            Ok(mut series) => {
                series.push_latest(snapshot.clone());
                series
            }
            Err(e) => {
                log::error!("failed to read history: {e}");
                HistorySeries::new(vec![snapshot.clone()])
            }
        }
    }
}

fn persist_and_prune(store: &HistoryStore, snapshot: &MetricsSnapshot, config: &MonitorConfig) -> Result<()> {
    store.persist(snapshot)?;
    if let Err(e) = store.prune(config.retention) {
        log::warn!("history pruning failed: {e}");
    }
    Ok(())
}

async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    let stopped = shutdown.wait_for(|stopped| *stopped).await.is_ok();
    if !stopped {
        // Every handle is gone; nothing can request a stop any more.
        std::future::pending::<()>().await;
    }
}
