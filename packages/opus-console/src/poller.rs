//! Job status poller.
//!
//! Tracks at most one job at a time and reports its status until the job
//! reaches a terminal state.
//!
//! # Guarantees
//!
//! - Starting a new target supersedes the old one. A response for the old
//!   target that arrives late is discarded and never reported.
//! - At most one status request is in flight per poller. A scheduled tick
//!   that finds a request already running is skipped.
//! - Each job id is reported terminal at most once, no matter how many
//!   fetches (scheduled or manual) observe it.
//! - After [`JobPoller::shutdown`] (or drop) no response mutates state.
//!
//! ```text
//! start_polling(A) ──► tick ──► fetch ──► RUNNING ──► tick ──► fetch ──► SUCCEEDED
//!                                                                          │
//!                                           stop polling ◄─────────────────┤
//!                                           PollEvent::Terminal(job) ◄─────┘
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use opus_client::{Job, JobId};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::JobStatusSource;
use crate::error::{ConsoleError, Result};

/// Default delay between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Configuration for the job poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between scheduled status checks. The first check runs at once.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Notifications emitted by the poller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// A job was observed in a terminal status for the first time.
    Terminal(Job),
    /// A status request failed at the transport level.
    FetchFailed { job_id: JobId, message: String },
}

/// Observable poller state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    /// Job currently being polled on a schedule.
    pub active_job_id: Option<JobId>,
    /// Most recent job record applied.
    pub last_status: Option<Job>,
    /// A status request is in flight.
    pub is_fetching: bool,
    /// Error from the most recent failed request.
    pub error: Option<String>,
}

impl PollState {
    pub fn is_polling(&self) -> bool {
        self.active_job_id.is_some()
    }
}

#[derive(Default)]
struct Control {
    /// Bumped on every start, stop and shutdown. A response is applied only if
    /// the epoch it was issued under is still current.
    epoch: u64,
    reported: HashSet<JobId>,
    schedule: Option<CancellationToken>,
    shut_down: bool,
}

struct Shared<S: ?Sized> {
    source: Arc<S>,
    config: PollerConfig,
    state: watch::Sender<PollState>,
    control: Mutex<Control>,
    fetch_gate: tokio::sync::Mutex<()>,
    events: mpsc::UnboundedSender<PollEvent>,
    shutdown: CancellationToken,
}

struct FetchOutcome {
    result: Result<Job>,
    applied: bool,
}

/// Polls one job's status on a fixed interval.
pub struct JobPoller<S: JobStatusSource + ?Sized + 'static> {
    shared: Arc<Shared<S>>,
}

impl<S: JobStatusSource + ?Sized + 'static> JobPoller<S> {
    /// Create a poller that reports events on `events`.
    pub fn new(source: Arc<S>, events: mpsc::UnboundedSender<PollEvent>) -> Self {
        Self::with_config(source, events, PollerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        source: Arc<S>,
        events: mpsc::UnboundedSender<PollEvent>,
        config: PollerConfig,
    ) -> Self {
        let (state, _) = watch::channel(PollState::default());
        Self {
            shared: Arc::new(Shared {
                source,
                config,
                state,
                control: Mutex::new(Control::default()),
                fetch_gate: tokio::sync::Mutex::new(()),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Create a poller together with the receiving end of its event channel.
    pub fn channel(
        source: Arc<S>,
        config: PollerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PollEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_config(source, tx, config), rx)
    }

    /// Begin polling `job_id`, superseding any current target.
    ///
    /// Blank ids are ignored. Returns the normalized id that is now polled.
    /// Must be called from within a Tokio runtime.
    pub fn start_polling(&self, job_id: impl AsRef<str>) -> Option<JobId> {
        let Some(job_id) = JobId::parse(job_id) else {
            debug!("ignoring blank job id");
            return None;
        };

        let mut control = self.shared.control();
        if control.shut_down {
            warn!(job_id = %job_id, "poller is shut down, not polling");
            return None;
        }
        if let Some(previous) = control.schedule.take() {
            previous.cancel();
        }
        control.epoch += 1;
        let epoch = control.epoch;
        let schedule = self.shared.shutdown.child_token();
        control.schedule = Some(schedule.clone());

        self.shared.state.send_modify(|state| {
            state.active_job_id = Some(job_id.clone());
            state.error = None;
        });
        drop(control);

        info!(
            job_id = %job_id,
            interval_ms = self.shared.config.interval.as_millis() as u64,
            "polling job"
        );
        tokio::spawn(run_schedule(
            Arc::clone(&self.shared),
            job_id.clone(),
            epoch,
            schedule,
        ));
        Some(job_id)
    }

    /// Stop scheduled polling. Safe to call when nothing is polled.
    ///
    /// A response already in flight for the stopped target is discarded.
    pub fn stop_polling(&self) {
        let mut control = self.shared.control();
        self.shared.stop_locked(&mut control);
    }

    /// Fetch a job's status once, outside the schedule.
    ///
    /// Waits for any in-flight request to finish first. The result is applied
    /// to state like a scheduled fetch: a terminal status or a transport
    /// failure stops polling, whichever job is the active target. A response
    /// that was superseded while in flight is still returned but not applied.
    pub async fn fetch_once(&self, job_id: impl AsRef<str>) -> Result<Job> {
        let Some(job_id) = JobId::parse(job_id) else {
            let err = ConsoleError::validation("Job ID is required.");
            self.shared.state.send_modify(|state| {
                state.error = Some(err.to_string());
            });
            return Err(err);
        };

        let gate = tokio::select! {
            _ = self.shared.shutdown.cancelled() => return Err(ConsoleError::ShutDown),
            gate = self.shared.fetch_gate.lock() => gate,
        };
        let epoch = self.shared.current_epoch().ok_or(ConsoleError::ShutDown)?;
        let outcome = self.shared.fetch_and_apply(&job_id, epoch).await;
        drop(gate);
        outcome.result
    }

    /// Forget the last status and error along with the jobs already reported
    /// terminal. A job seen terminal again is reported again.
    pub fn clear_status(&self) {
        let mut control = self.shared.control();
        if control.shut_down {
            return;
        }
        control.reported.clear();
        self.shared.state.send_modify(|state| {
            state.last_status = None;
            state.error = None;
        });
    }

    /// Stop polling for good. Later responses are discarded.
    pub fn shutdown(&self) {
        let mut control = self.shared.control();
        if control.shut_down {
            return;
        }
        if let Some(schedule) = control.schedule.take() {
            schedule.cancel();
        }
        control.epoch += 1;
        control.shut_down = true;
        self.shared.shutdown.cancel();
        info!("job poller shut down");
    }

    /// Whether `job_id` was already reported terminal.
    pub fn has_reported(&self, job_id: &JobId) -> bool {
        self.shared.control().reported.contains(job_id)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.control().shut_down
    }

    pub fn snapshot(&self) -> PollState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.shared.state.subscribe()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.state.borrow().is_polling()
    }

    pub fn active_job_id(&self) -> Option<JobId> {
        self.shared.state.borrow().active_job_id.clone()
    }

    pub fn last_status(&self) -> Option<Job> {
        self.shared.state.borrow().last_status.clone()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.shared.config
    }
}

impl<S: JobStatusSource + ?Sized + 'static> Drop for JobPoller<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<S: JobStatusSource + ?Sized> Shared<S> {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_epoch(&self) -> Option<u64> {
        let control = self.control();
        (!control.shut_down).then_some(control.epoch)
    }

    fn stop_locked(&self, control: &mut Control) {
        if let Some(schedule) = control.schedule.take() {
            schedule.cancel();
            control.epoch += 1;
        }
        if control.shut_down {
            return;
        }
        self.state.send_if_modified(|state| state.active_job_id.take().is_some());
    }

    /// Issue one request. The caller must hold the fetch gate.
    async fn fetch_and_apply(&self, job_id: &JobId, epoch: u64) -> FetchOutcome {
        self.state.send_modify(|state| state.is_fetching = true);
        debug!(job_id = %job_id, "fetching job status");

        let result = self.source.fetch_job(job_id).await;

        let mut control = self.control();
        if control.shut_down {
            debug!(job_id = %job_id, "discarding response after shutdown");
            return FetchOutcome {
                result: result.map_err(ConsoleError::from),
                applied: false,
            };
        }
        self.state.send_modify(|state| state.is_fetching = false);

        if control.epoch != epoch {
            debug!(job_id = %job_id, "discarding superseded response");
            return FetchOutcome {
                result: result.map_err(ConsoleError::from),
                applied: false,
            };
        }

        match result {
            Ok(job) => {
                debug!(job_id = %job.id, status = %job.status, "job status");
                self.state.send_modify(|state| {
                    state.last_status = Some(job.clone());
                    state.error = None;
                });
                if job.is_terminal() {
                    self.stop_locked(&mut control);
                    if control.reported.insert(job.id.clone()) {
                        info!(
                            job_id = %job.id,
                            job_type = %job.job_type,
                            status = %job.status,
                            "job finished"
                        );
                        let _ = self.events.send(PollEvent::Terminal(job.clone()));
                    }
                }
                FetchOutcome {
                    result: Ok(job),
                    applied: true,
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(job_id = %job_id, error = %message, "job status request failed");
                self.state.send_modify(|state| state.error = Some(message.clone()));
                self.stop_locked(&mut control);
                let _ = self.events.send(PollEvent::FetchFailed {
                    job_id: job_id.clone(),
                    message,
                });
                FetchOutcome {
                    result: Err(e.into()),
                    applied: true,
                }
            }
        }
    }
}

async fn run_schedule<S: JobStatusSource + ?Sized>(
    shared: Arc<Shared<S>>,
    job_id: JobId,
    epoch: u64,
    cancelled: CancellationToken,
) {
    let mut ticker = tokio::time::interval(shared.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut first = true;

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // The first check waits its turn; later ticks give way to a request
        // that is still running.
        let gate = if first {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                gate = shared.fetch_gate.lock() => gate,
            }
        } else {
            match shared.fetch_gate.try_lock() {
                Ok(gate) => gate,
                Err(_) => {
                    debug!(job_id = %job_id, "status request in flight, skipping tick");
                    continue;
                }
            }
        };
        first = false;

        if shared.current_epoch() != Some(epoch) {
            break;
        }

        let outcome = shared.fetch_and_apply(&job_id, epoch).await;
        drop(gate);

        let keep_polling = outcome.applied
            && matches!(&outcome.result, Ok(job) if !job.is_terminal());
        if !keep_polling {
            break;
        }
    }

    debug!(job_id = %job_id, "poll schedule ended");
}
