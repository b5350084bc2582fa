use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use shared::types::{Notification, ServiceRecord};
use crate::error::{ResolverError, Result};
use crate::platform::{PlatformEvent, ScanRequest};
use crate::resolution::{hash, Coordinator, CoordinatorStatus};

/// Commands sent to the coordinator task
pub enum CoordinatorCommand {
    Subscribe(mpsc::Receiver<PlatformEvent>, oneshot::Sender<Result<()>>),
    Scan(ScanRequest, oneshot::Sender<Result<()>>),
    StopScan(oneshot::Sender<Result<()>>),
    RestartScan(oneshot::Sender<Result<()>>),
    GetDiscovered(oneshot::Sender<Vec<ServiceRecord>>),
    GetResolved(oneshot::Sender<Vec<ServiceRecord>>),
    GetOne(String, oneshot::Sender<Option<ServiceRecord>>),
    Status(oneshot::Sender<CoordinatorStatus>),
    Shutdown,
}

/// Periods of the coordinator's timers
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub resolve_tick: Duration,
    pub watchdog_tick: Duration,
    /// `None` disables backfill
    pub backfill_tick: Option<Duration>,
}

/// Handle to the task that owns the [`Coordinator`]
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Spawn the coordinator task. It runs until `cancel` fires or `shutdown` is called.
    pub fn spawn(
        coordinator: Coordinator,
        schedule: Schedule,
        hash_tx: watch::Sender<String>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<CoordinatorCommand>(256);
        let task = tokio::spawn(run(coordinator, rx, schedule, hash_tx, cancel));
        (Self { tx }, task)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ResolverError::CoordinatorGone)?;
        rx.await.map_err(|_| ResolverError::CoordinatorGone)
    }

    /// Attach the platform event stream. Only the first call succeeds.
    pub async fn subscribe(&self, events: mpsc::Receiver<PlatformEvent>) -> Result<()> {
        self.request(|reply| CoordinatorCommand::Subscribe(events, reply)).await?
    }

    /// Reset all state and start scanning
    pub async fn scan(&self, request: ScanRequest) -> Result<()> {
        self.request(|reply| CoordinatorCommand::Scan(request, reply)).await?
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.request(CoordinatorCommand::StopScan).await?
    }

    /// Stop and start the last scan again, from a clean state
    pub async fn restart_scan(&self) -> Result<()> {
        self.request(CoordinatorCommand::RestartScan).await?
    }

    pub async fn discovered(&self) -> Result<Vec<ServiceRecord>> {
        self.request(CoordinatorCommand::GetDiscovered).await
    }

    pub async fn resolved(&self) -> Result<Vec<ServiceRecord>> {
        self.request(CoordinatorCommand::GetResolved).await
    }

    pub async fn get_one(&self, name: String) -> Result<Option<ServiceRecord>> {
        self.request(|reply| CoordinatorCommand::GetOne(name, reply)).await
    }

    pub async fn status(&self) -> Result<CoordinatorStatus> {
        self.request(CoordinatorCommand::Status).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(CoordinatorCommand::Shutdown)
            .await
            .map_err(|_| ResolverError::CoordinatorGone)
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<PlatformEvent>>) -> Option<PlatformEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_backfill(backfill: &mut Option<tokio::time::Interval>) {
    match backfill {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn interval(period: Duration) -> tokio::time::Interval {
    // First tick one period from now rather than immediately
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Coordinator event loop: commands, platform events and timers are handled one at a
/// time, so every handler sees registry, queue and transaction as one unit.
async fn run(
    mut coordinator: Coordinator,
    mut rx: mpsc::Receiver<CoordinatorCommand>,
    schedule: Schedule,
    hash_tx: watch::Sender<String>,
    cancel: CancellationToken,
) {
    let mut events: Option<mpsc::Receiver<PlatformEvent>> = None;
    let mut subscribed = false;
    let mut resolve_interval = interval(schedule.resolve_tick);
    let mut watchdog_interval = interval(schedule.watchdog_tick);
    let mut backfill_interval = schedule.backfill_tick.map(interval);

    loop {
        // Set by anything that can touch the resolved set
        let mut changed = false;
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::info!("All coordinator handles dropped");
                    break;
                };
                match cmd {
                    CoordinatorCommand::Subscribe(stream, reply) => {
                        let result = if subscribed {
                            tracing::warn!("Rejecting second platform event subscription");
                            coordinator.notify_error(ResolverError::AlreadySubscribed.to_string());
                            Err(ResolverError::AlreadySubscribed)
                        } else {
                            subscribed = true;
                            events = Some(stream);
                            Ok(())
                        };
                        let _ = reply.send(result);
                    }
                    CoordinatorCommand::Scan(request, reply) => {
                        changed = true;
                        let _ = reply.send(coordinator.begin_scan(request).map_err(ResolverError::from));
                    }
                    CoordinatorCommand::StopScan(reply) => {
                        let _ = reply.send(coordinator.stop_scan().map_err(ResolverError::from));
                    }
                    CoordinatorCommand::RestartScan(reply) => {
                        changed = true;
                        let result = match coordinator.restart_scan() {
                            Ok(true) => Ok(()),
                            Ok(false) => Err(ResolverError::NoScan),
                            Err(e) => Err(ResolverError::from(e)),
                        };
                        let _ = reply.send(result);
                    }
                    CoordinatorCommand::GetDiscovered(reply) => {
                        let _ = reply.send(coordinator.discovered());
                    }
                    CoordinatorCommand::GetResolved(reply) => {
                        let _ = reply.send(coordinator.resolved());
                    }
                    CoordinatorCommand::GetOne(name, reply) => {
                        let _ = reply.send(coordinator.get_discovered(&name));
                    }
                    CoordinatorCommand::Status(reply) => {
                        let _ = reply.send(coordinator.status(Instant::now()));
                    }
                    CoordinatorCommand::Shutdown => {
                        tracing::info!("Coordinator shutting down");
                        break;
                    }
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Some(event) => {
                        coordinator.dispatch(event, Instant::now());
                        changed = true;
                    }
                    None => {
                        tracing::warn!("Platform event stream closed");
                        events = None;
                    }
                }
            }
            _ = resolve_interval.tick() => {
                // An issue failure can demote a resolved service
                changed = coordinator.on_resolve_tick(Instant::now());
            }
            _ = watchdog_interval.tick() => {
                coordinator.check_stall(Instant::now());
            }
            _ = next_backfill(&mut backfill_interval) => {
                coordinator.backfill();
            }
            _ = cancel.cancelled() => {
                tracing::info!("Coordinator shutting down");
                break;
            }
        }

        if !changed {
            continue;
        }
        let digest = hash::compute_hash(&coordinator.resolved());
        hash_tx.send_if_modified(|current| {
            if *current == digest {
                return false;
            }
            *current = digest;
            true
        });
    }
}

/// Restarts the scan whenever the watchdog reports a stalled resolution.
pub async fn supervise_stalls(
    handle: CoordinatorHandle,
    mut notifications: broadcast::Receiver<Notification>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            notification = notifications.recv() => {
                match notification {
                    Ok(Notification::StallDetected { name, elapsed_ms }) => {
                        tracing::warn!(name = %name, elapsed_ms, "Restarting scan after stalled resolution");
                        if let Err(e) = handle.restart_scan().await {
                            tracing::error!("Failed to restart scan: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Stall supervisor lagged behind notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}
