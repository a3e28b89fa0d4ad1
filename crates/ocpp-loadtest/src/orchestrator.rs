//! # Load Orchestrator
//!
//! Launches one [`Session`] per roster entry with bounded concurrency.
//!
//! Admission goes through a semaphore of `max_concurrent` permits; a session
//! keeps its permit until it reaches a terminal state. After every launch the
//! launcher sleeps for the ramp delay. Sessions report through one event
//! channel drained by a single aggregator task, which publishes
//! [`StatsSnapshot`]s on a `watch` channel.

use crate::error::LoadTestResult;
use crate::roster::RosterEntry;
use crate::stats::{LoadStats, StatsSnapshot};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ocpp_cp::{Session, SessionConfig, SessionEvent, SessionReport};
use ocpp_transport::Dialer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What to run
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub total_sessions: usize,
    pub max_concurrent: usize,
    pub ramp_delay: Duration,
    pub session: SessionConfig,
}

/// A session that has been launched and not finished yet
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSession {
    pub cp_id: String,
    pub index: usize,
    pub launched_at: DateTime<Utc>,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub stats: StatsSnapshot,
    /// Reports in launch order
    pub reports: Vec<SessionReport>,
}

/// Handle on a running load test
pub struct LoadOrchestrator {
    snapshot: watch::Receiver<StatsSnapshot>,
    shutdown: watch::Sender<bool>,
    live: Arc<DashMap<usize, LiveSession>>,
    launcher: JoinHandle<Vec<SessionReport>>,
    aggregator: JoinHandle<StatsSnapshot>,
}

impl LoadOrchestrator {
    /// Start launching sessions for the first `plan.total_sessions` roster
    /// entries. Must be called from within a Tokio runtime.
    pub fn start(plan: LoadPlan, roster: Vec<RosterEntry>, dialer: Arc<dyn Dialer>) -> Self {
        let total = plan.total_sessions.min(roster.len());
        let queue: Vec<RosterEntry> = roster.into_iter().take(total).collect();
        info!(
            "Starting load: {} sessions, {} concurrent, ramp {}ms",
            total,
            plan.max_concurrent,
            plan.ramp_delay.as_millis()
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(LoadStats::new(total).snapshot());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let live = Arc::new(DashMap::new());

        let aggregator = tokio::spawn(aggregate(total, events_rx, snapshot_tx));
        let launcher = tokio::spawn(launch(
            plan,
            queue,
            dialer,
            events_tx,
            shutdown_rx,
            live.clone(),
        ));

        Self {
            snapshot,
            shutdown,
            live,
            launcher,
            aggregator,
        }
    }

    /// Current counters
    pub fn status(&self) -> StatsSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Follow the counters as they change
    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.snapshot.clone()
    }

    /// Ask every live session to stop its transaction and close, and launch
    /// nothing further. Returns immediately.
    pub fn stop(&self) {
        if !*self.shutdown.borrow() {
            info!("Stopping load: {} live sessions", self.live.len());
        }
        self.shutdown.send_replace(true);
    }

    pub fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Charge point ids of the sessions currently running
    pub fn live_sessions(&self) -> Vec<String> {
        let mut live: Vec<LiveSession> = self.live.iter().map(|entry| entry.value().clone()).collect();
        live.sort_by_key(|session| session.index);
        live.into_iter().map(|session| session.cp_id).collect()
    }

    pub fn is_finished(&self) -> bool {
        self.launcher.is_finished() && self.aggregator.is_finished()
    }

    /// Wait until every launched session has finished
    pub async fn wait(self) -> LoadTestResult<LoadOutcome> {
        let reports = self.launcher.await?;
        let stats = self.aggregator.await?;
        info!("Load finished: {}", stats);
        Ok(LoadOutcome { stats, reports })
    }
}

async fn launch(
    plan: LoadPlan,
    queue: Vec<RosterEntry>,
    dialer: Arc<dyn Dialer>,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
    live: Arc<DashMap<usize, LiveSession>>,
) -> Vec<SessionReport> {
    let semaphore = Arc::new(Semaphore::new(plan.max_concurrent.max(1)));
    let mut handles = Vec::with_capacity(queue.len());

    for (index, entry) in queue.into_iter().enumerate() {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = stopped(&mut shutdown) => break,
        };
        if *shutdown.borrow() {
            break;
        }

        debug!("Launching session {} ({})", index + 1, entry.cp_id);
        live.insert(
            index,
            LiveSession {
                cp_id: entry.cp_id.clone(),
                index,
                launched_at: Utc::now(),
            },
        );

        let session = Session::new(
            entry.cp_id.clone(),
            entry.id_tag,
            plan.session.clone(),
            dialer.clone(),
        )
        .with_events(events.clone())
        .with_shutdown(shutdown.clone());

        let live = live.clone();
        handles.push(tokio::spawn(async move {
            let report = session.run().await;
            live.remove(&index);
            drop(permit);
            report
        }));

        if !plan.ramp_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(plan.ramp_delay) => {}
                _ = stopped(&mut shutdown) => {}
            }
        }
    }
    // The aggregator finishes once the last session drops its sender.
    drop(events);

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Session task failed: {}", e),
        }
    }
    reports
}

async fn aggregate(
    total: usize,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot: watch::Sender<StatsSnapshot>,
) -> StatsSnapshot {
    let mut stats = LoadStats::new(total);
    while let Some(event) = events.recv().await {
        stats.apply(&event);
        snapshot.send_replace(stats.snapshot());
    }
    stats.snapshot()
}

/// Resolves once the stop flag is set
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_cp::SessionState;
    use ocpp_messages::Message;
    use ocpp_transport::{LoopbackDialer, LoopbackPeer};
    use serde_json::json;
    use std::sync::Mutex;

    type CallLog = Arc<Mutex<Vec<(String, String)>>>;

    /// Central system that accepts everything and records each CALL
    fn spawn_csms(mut accept: mpsc::UnboundedReceiver<LoopbackPeer>) -> CallLog {
        let log: CallLog = Arc::default();
        let calls = log.clone();
        tokio::spawn(async move {
            let mut next_tx = 0;
            while let Some(peer) = accept.recv().await {
                next_tx += 1;
                tokio::spawn(serve(peer, next_tx, calls.clone()));
            }
        });
        log
    }

    async fn serve(mut peer: LoopbackPeer, transaction_id: i32, log: CallLog) {
        let cp_id = peer.charge_point_id().to_string();
        while let Some(text) = peer.recv().await {
            let Ok(Message::Call(call)) = Message::decode(&text) else {
                continue;
            };
            log.lock().unwrap().push((cp_id.clone(), call.action.clone()));
            let payload = match call.action.as_str() {
                "BootNotification" => {
                    json!({"status": "Accepted", "currentTime": "2024-01-01T00:00:00Z", "interval": 300})
                }
                "Authorize" => json!({"idTagInfo": {"status": "Accepted"}}),
                "StartTransaction" => {
                    json!({"transactionId": transaction_id, "idTagInfo": {"status": "Accepted"}})
                }
                _ => json!({}),
            };
            let reply = Message::call_result(call.unique_id, payload)
                .unwrap()
                .encode()
                .unwrap();
            if peer.send(reply).is_err() {
                break;
            }
        }
    }

    fn roster(n: usize) -> Vec<RosterEntry> {
        (1..=n)
            .map(|i| RosterEntry::new(format!("CP{i:03}"), format!("TAG{i:03}")))
            .collect()
    }

    fn plan(total_sessions: usize, max_concurrent: usize, hold_secs: u64) -> LoadPlan {
        LoadPlan {
            total_sessions,
            max_concurrent,
            ramp_delay: Duration::ZERO,
            session: SessionConfig {
                base_url: "ws://csms.test/ocpp".to_string(),
                hold_secs,
                ..SessionConfig::default()
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_runs_sessions_sequentially() {
        let (dialer, accept) = LoopbackDialer::new();
        let log = spawn_csms(accept);

        let orchestrator = LoadOrchestrator::start(plan(3, 1, 1), roster(3), Arc::new(dialer));
        let outcome = orchestrator.wait().await.unwrap();

        assert_eq!(outcome.stats.launched, 3);
        assert_eq!(outcome.stats.closed, 3);
        assert_eq!(outcome.stats.started_tx, 3);
        assert_eq!(outcome.stats.errors, 0);
        assert_eq!(outcome.stats.peak, 1);
        assert!(outcome.stats.is_complete());
        assert!(outcome
            .reports
            .iter()
            .all(|report| report.final_state == SessionState::Closed));

        let log = log.lock().unwrap();
        for (earlier, later) in [("CP001", "CP002"), ("CP002", "CP003")] {
            let last_of_earlier = log.iter().rposition(|(cp, _)| cp == earlier).unwrap();
            let first_of_later = log.iter().position(|(cp, _)| cp == later).unwrap();
            assert!(last_of_earlier < first_of_later);
            assert_eq!(log[last_of_earlier].1, "StopTransaction");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_cap() {
        let (dialer, accept) = LoopbackDialer::new();
        spawn_csms(accept);

        let orchestrator = LoadOrchestrator::start(plan(5, 2, 2), roster(5), Arc::new(dialer));
        let mut updates = orchestrator.subscribe();
        let watcher = tokio::spawn(async move {
            let mut max_active = 0;
            while updates.changed().await.is_ok() {
                max_active = max_active.max(updates.borrow().active);
            }
            max_active
        });

        let outcome = orchestrator.wait().await.unwrap();
        assert_eq!(outcome.stats.closed, 5);
        assert_eq!(outcome.stats.peak, 2);
        assert!(watcher.await.unwrap() <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_is_capped_by_roster() {
        let (dialer, accept) = LoopbackDialer::new();
        spawn_csms(accept);

        let orchestrator = LoadOrchestrator::start(plan(10, 4, 1), roster(2), Arc::new(dialer));
        assert_eq!(orchestrator.status().total, 2);
        let outcome = orchestrator.wait().await.unwrap();
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.stats.launched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_live_sessions() {
        let (dialer, accept) = LoopbackDialer::new();
        let log = spawn_csms(accept);

        let orchestrator =
            LoadOrchestrator::start(plan(5, 3, 3600), roster(5), Arc::new(dialer));
        let mut updates = orchestrator.subscribe();
        while updates.borrow().started_tx < 3 {
            updates.changed().await.unwrap();
        }
        assert_eq!(
            orchestrator.live_sessions(),
            vec!["CP001".to_string(), "CP002".to_string(), "CP003".to_string()]
        );

        orchestrator.stop();
        assert!(orchestrator.is_stopping());
        let outcome = orchestrator.wait().await.unwrap();

        assert_eq!(outcome.reports.len(), 3);
        assert_eq!(outcome.stats.launched, 3);
        assert_eq!(outcome.stats.closed, 3);
        assert_eq!(outcome.stats.active, 0);
        let stops = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, action)| action == "StopTransaction")
            .count();
        assert_eq!(stops, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_roster_ids_are_tracked_separately() {
        let (dialer, accept) = LoopbackDialer::new();
        spawn_csms(accept);

        let roster = vec![
            RosterEntry::new("CP001", "TAG001"),
            RosterEntry::new("CP001", "TAG002"),
        ];
        let orchestrator = LoadOrchestrator::start(plan(2, 2, 3600), roster, Arc::new(dialer));
        let mut updates = orchestrator.subscribe();
        while updates.borrow().started_tx < 2 {
            updates.changed().await.unwrap();
        }
        assert_eq!(
            orchestrator.live_sessions(),
            vec!["CP001".to_string(), "CP001".to_string()]
        );

        orchestrator.stop();
        let outcome = orchestrator.wait().await.unwrap();
        assert_eq!(outcome.stats.closed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_delay_spaces_launches() {
        let (dialer, accept) = LoopbackDialer::new();
        spawn_csms(accept);

        let mut plan = plan(3, 3, 60);
        plan.ramp_delay = Duration::from_millis(500);
        let started = tokio::time::Instant::now();
        let orchestrator = LoadOrchestrator::start(plan, roster(3), Arc::new(dialer));

        let mut updates = orchestrator.subscribe();
        while updates.borrow().launched < 3 {
            updates.changed().await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(1000));

        orchestrator.stop();
        orchestrator.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_target_counts_errors() {
        let (dialer, accept) = LoopbackDialer::new();
        drop(accept);

        let orchestrator = LoadOrchestrator::start(plan(2, 2, 1), roster(2), Arc::new(dialer));
        let outcome = orchestrator.wait().await.unwrap();
        assert_eq!(outcome.stats.errors, 2);
        assert_eq!(outcome.stats.closed, 2);
        assert_eq!(outcome.stats.started_tx, 0);
        assert!(outcome.reports.iter().all(|r| !r.was_connected));
    }
}
