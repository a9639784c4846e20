use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    ChallengeConfig, ChallengeDetector, CooldownMarkers, ExecutionContext, ExecutionOutcome,
    FailureKind, PlatformExecution, SessionFailure,
};
use crate::delay::{ActionKind, Delayer};
use crate::fetch::{FetchError, FetchRequest, Fetcher, RateLimiterPool};
use crate::listing::normalize::title_demand_level;
use crate::listing::{CandidateTicket, ScrapedTicket};
use crate::metrics;
use crate::queue::{
    BypassOutcome, DeclineBypass, QueueBypass, QueueMachine, QueuePhase, QueueTracker, WaitOutcome,
};
use crate::session::{SessionLease, SessionPool};

/// What one session's request in a round produced.
enum SessionResult {
    Candidates {
        candidates: Vec<CandidateTicket>,
        cookies: Vec<(String, String)>,
    },
    Failed {
        kind: FailureKind,
        /// Cooldown the failure imposes on the next round.
        cooldown: Option<Duration>,
    },
    Queue {
        body: String,
    },
    Cancelled,
}

/// Runs attempt rounds for one platform using pooled sessions.
pub struct ScrapeExecutor {
    pool: Arc<SessionPool>,
    fetcher: Arc<dyn Fetcher>,
    delayer: Arc<dyn Delayer>,
    queue: Arc<QueueTracker>,
    cooldowns: Arc<CooldownMarkers>,
    limiter: Option<Arc<RateLimiterPool>>,
    challenges: ChallengeDetector,
    blocked_cooldown: Duration,
    bypass: Arc<dyn QueueBypass>,
}

impl std::fmt::Debug for ScrapeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeExecutor")
            .field("challenges", &self.challenges)
            .field("blocked_cooldown", &self.blocked_cooldown)
            .finish_non_exhaustive()
    }
}

impl ScrapeExecutor {
    pub fn new(
        pool: Arc<SessionPool>,
        fetcher: Arc<dyn Fetcher>,
        delayer: Arc<dyn Delayer>,
        queue: Arc<QueueTracker>,
        cooldowns: Arc<CooldownMarkers>,
    ) -> Self {
        let challenges = ChallengeConfig::default();
        Self {
            pool,
            fetcher,
            delayer,
            queue,
            cooldowns,
            limiter: None,
            challenges: ChallengeDetector::new(&challenges),
            blocked_cooldown: challenges.blocked_cooldown(),
            bypass: Arc::new(DeclineBypass),
        }
    }

    pub fn with_challenges(mut self, config: &ChallengeConfig) -> Self {
        self.challenges = ChallengeDetector::new(config);
        self.blocked_cooldown = config.blocked_cooldown();
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiterPool>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_bypass(mut self, bypass: Arc<dyn QueueBypass>) -> Self {
        self.bypass = bypass;
        self
    }

    /// Scrape one platform until tickets are found, attempts run out, a
    /// queue ends the run, or the context is cancelled.
    ///
    /// Never fails: every problem is recorded in the returned execution.
    pub async fn execute(&self, ctx: ExecutionContext<'_>) -> PlatformExecution {
        let started = Instant::now();
        let platform = &ctx.platform.id;
        let mut execution = PlatformExecution::new(platform.clone(), ctx.strategy.name);
        let mut machine = QueueMachine::new(platform.clone());

        info!(
            platform = %platform,
            strategy = %ctx.strategy.name,
            concurrency = ctx.strategy.concurrency,
            max_retries = ctx.strategy.max_retries,
            "Starting platform execution"
        );

        execution.outcome = self.run(&ctx, &mut execution, &mut machine).await;
        execution.queue_phases = machine.history().to_vec();
        execution.duration_ms = started.elapsed().as_millis() as u64;

        metrics::EXECUTIONS
            .with_label_values(&[platform.as_str(), execution.outcome.as_str()])
            .inc();
        metrics::EXECUTION_DURATION
            .with_label_values(&[platform.as_str()])
            .observe(started.elapsed().as_secs_f64());
        metrics::TICKETS_FOUND
            .with_label_values(&[platform.as_str()])
            .inc_by(execution.tickets.len() as u64);

        info!(
            platform = %platform,
            outcome = %execution.outcome,
            tickets = execution.tickets.len(),
            attempts = execution.attempts,
            errors = execution.session_errors.len(),
            "Platform execution finished"
        );
        execution
    }

    async fn run(
        &self,
        ctx: &ExecutionContext<'_>,
        execution: &mut PlatformExecution,
        machine: &mut QueueMachine,
    ) -> ExecutionOutcome {
        let platform = ctx.platform;
        let strategy = ctx.strategy;
        let execution_id = uuid::Uuid::new_v4().to_string();

        // A queue someone else already detected is waited out without
        // touching the platform.
        match self.queue.is_in_queue(&platform.id).await {
            Ok(true) => {
                debug!(platform = %platform.id, "Platform already queued, waiting passively");
                enter(machine, QueuePhase::Waiting);
                let waited = self
                    .queue
                    .wait_passively(
                        &platform.id,
                        &execution_id,
                        ctx.profile.monitoring_interval(),
                        ctx.cancel,
                    )
                    .await;
                match waited {
                    Ok(WaitOutcome::Resume) => {}
                    // No lease to poll with yet. Drop the orphaned marker and
                    // let the scrape show whether the queue is still up.
                    Ok(WaitOutcome::Adopted) => {
                        info!(platform = %platform.id, "Adopted stale queue marker, scraping");
                        if let Err(e) = self.queue.release(&platform.id, &execution_id).await {
                            warn!(platform = %platform.id, error = %e, "Could not release adopted marker");
                        }
                    }
                    Ok(WaitOutcome::Expired) => {
                        enter(machine, QueuePhase::Expired);
                        return ExecutionOutcome::QueueExpired;
                    }
                    Ok(WaitOutcome::Cancelled) => return ExecutionOutcome::Cancelled,
                    Err(e) => {
                        warn!(platform = %platform.id, error = %e, "Queue state unavailable while waiting");
                        return ExecutionOutcome::Failed;
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(platform = %platform.id, error = %e, "Queue state unavailable, scraping anyway");
            }
        }
        enter(machine, QueuePhase::Scraping);

        if ctx.cancel.is_cancelled() {
            return ExecutionOutcome::Cancelled;
        }

        let mut leases = self
            .pool
            .acquire(platform, strategy.concurrency, ctx.cancel)
            .await;
        execution.sessions_used = leases.len();
        if leases.is_empty() {
            warn!(platform = %platform.id, "No sessions available");
            enter(machine, QueuePhase::Failed);
            return ExecutionOutcome::Failed;
        }

        let url = platform.search_url(&ctx.criteria.keyword, ctx.criteria.date_from);
        let mut resumed = false;
        let mut previous_delay = Duration::ZERO;

        for attempt in 1..=strategy.max_retries {
            execution.attempts = attempt;
            metrics::ATTEMPT_ROUNDS
                .with_label_values(&[platform.id.as_str()])
                .inc();
            debug!(platform = %platform.id, attempt, sessions = leases.len(), "Attempt round");

            let (mut results, queued) = self.round(ctx, &leases, attempt, &url).await;

            if let Some((index, body)) = queued {
                if resumed {
                    warn!(platform = %platform.id, attempt, "Queue re-entered after resuming");
                    enter(machine, QueuePhase::Failed);
                    return ExecutionOutcome::QueueReentered;
                }
                match self
                    .handle_queue(ctx, machine, &mut leases, index, &body, &url, &execution_id)
                    .await
                {
                    Some(outcome) => return outcome,
                    None => {
                        resumed = true;
                        continue;
                    }
                }
            }

            results.sort_by_key(|(index, _)| *index);
            let mut failed = None;
            let mut burned = Vec::new();
            let mut floor = Duration::ZERO;

            for (index, result) in results {
                let session_id = leases[index].id.clone();
                match result {
                    SessionResult::Candidates { candidates, cookies } => {
                        if let Some(updated) = self
                            .pool
                            .record_success(&platform.id, &session_id, cookies)
                            .await
                        {
                            leases[index] = updated;
                        }
                        self.collect(ctx, execution, candidates, &session_id);
                    }
                    SessionResult::Failed { kind, cooldown } => {
                        metrics::SESSION_FAILURES
                            .with_label_values(&[platform.id.as_str(), kind.label()])
                            .inc();
                        warn!(
                            platform = %platform.id,
                            attempt,
                            session = %session_id,
                            failure = kind.label(),
                            "Session attempt failed"
                        );

                        match &kind {
                            FailureKind::Challenge { provider } => {
                                metrics::CHALLENGES
                                    .with_label_values(&[platform.id.as_str(), provider.as_str()])
                                    .inc();
                                self.set_cooldown(&platform.id, &format!("challenge:{}", provider), cooldown)
                                    .await;
                            }
                            FailureKind::Blocked { status } => {
                                self.set_cooldown(&platform.id, &format!("blocked:{}", status), cooldown)
                                    .await;
                                burned.push(index);
                            }
                            _ => {
                                if self.pool.record_failure(&platform.id, &session_id).await {
                                    failed.get_or_insert(index);
                                } else {
                                    burned.push(index);
                                }
                            }
                        }

                        if let Some(cooldown) = cooldown {
                            floor = floor.max(cooldown);
                        }
                        execution.session_errors.push(SessionFailure {
                            session_id,
                            attempt,
                            kind,
                        });
                    }
                    SessionResult::Queue { .. } | SessionResult::Cancelled => {}
                }
            }

            if ctx.cancel.is_cancelled() {
                return ExecutionOutcome::Cancelled;
            }
            if !execution.tickets.is_empty() {
                enter(machine, QueuePhase::Completed);
                return ExecutionOutcome::Completed;
            }
            if attempt == strategy.max_retries {
                break;
            }

            // Blocked and unhealthy sessions are replaced right away; otherwise
            // one session is rotated every `rotation_frequency` rounds.
            if burned.is_empty() && attempt % strategy.rotation_frequency.max(1) == 0 {
                let index = failed
                    .unwrap_or((attempt / strategy.rotation_frequency.max(1)) as usize % leases.len());
                burned.push(index);
            }
            for index in burned {
                let previous = leases[index].id.clone();
                leases[index] = self.pool.rotate(platform, &previous, ctx.cancel).await;
            }

            let backoff = self.delayer.backoff(
                strategy.base_backoff_ms,
                strategy.backoff_multiplier,
                attempt,
            );
            let delay = backoff.max(previous_delay).max(floor);
            previous_delay = delay;
            execution.backoff_schedule.push(delay.as_millis() as u64);
            debug!(
                platform = %platform.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Backing off before next round"
            );
            if !self.delayer.pause(delay, ctx.cancel).await {
                return ExecutionOutcome::Cancelled;
            }
        }

        enter(machine, QueuePhase::Completed);
        ExecutionOutcome::Exhausted
    }

    /// One request per session, concurrently. Stops at the first queue page,
    /// dropping the requests still in flight.
    async fn round(
        &self,
        ctx: &ExecutionContext<'_>,
        leases: &[SessionLease],
        attempt: u32,
        url: &str,
    ) -> (Vec<(usize, SessionResult)>, Option<(usize, String)>) {
        let mut pending: FuturesUnordered<_> = leases
            .iter()
            .enumerate()
            .map(|(index, lease)| async move {
                (index, self.request(ctx, lease, attempt, url).await)
            })
            .collect();

        let mut results = Vec::with_capacity(leases.len());
        while let Some((index, result)) = pending.next().await {
            if let SessionResult::Queue { body } = result {
                return (results, Some((index, body)));
            }
            results.push((index, result));
        }
        (results, None)
    }

    async fn request(
        &self,
        ctx: &ExecutionContext<'_>,
        lease: &SessionLease,
        attempt: u32,
        url: &str,
    ) -> SessionResult {
        let platform = ctx.platform;
        let action = if attempt == 1 {
            ActionKind::Search
        } else {
            ActionKind::TicketCheck
        };
        let delay = self.delayer.delay_for(action, platform.delay_multiplier);
        if !self.delayer.pause(delay, ctx.cancel).await {
            return SessionResult::Cancelled;
        }
        if let Some(limiter) = &self.limiter {
            if !limiter.acquire(&platform.id, ctx.cancel).await {
                return SessionResult::Cancelled;
            }
        }

        let home = platform.home_url();
        let request =
            FetchRequest::new(url, ctx.request_timeout).with_headers(lease.headers(Some(&home)));
        let response = tokio::select! {
            _ = ctx.cancel.cancelled() => return SessionResult::Cancelled,
            r = tokio::time::timeout(ctx.request_timeout, self.fetcher.fetch(&request)) => r,
        };

        let response = match response {
            Ok(Ok(response)) => response,
            Ok(Err(FetchError::Timeout)) | Err(_) => {
                return SessionResult::Failed {
                    kind: FailureKind::Timeout,
                    cooldown: None,
                }
            }
            Ok(Err(e)) => {
                return SessionResult::Failed {
                    kind: FailureKind::Transport {
                        message: e.to_string(),
                    },
                    cooldown: None,
                }
            }
        };

        if let Some(challenge) = self.challenges.detect(&response.body) {
            debug!(
                platform = %platform.id,
                session = %lease.id,
                provider = %challenge.provider,
                "Anti-bot challenge detected"
            );
            return SessionResult::Failed {
                kind: FailureKind::Challenge {
                    provider: challenge.provider,
                },
                cooldown: Some(challenge.cooldown),
            };
        }
        if response.is_blocking() {
            return SessionResult::Failed {
                kind: FailureKind::Blocked {
                    status: response.status,
                },
                cooldown: Some(response.retry_after().unwrap_or(self.blocked_cooldown)),
            };
        }
        if self.queue.matches_signature(&response.body) {
            return SessionResult::Queue {
                body: response.body,
            };
        }
        if !(200..300).contains(&response.status) {
            return SessionResult::Failed {
                kind: FailureKind::Transport {
                    message: format!("HTTP {}", response.status),
                },
                cooldown: None,
            };
        }

        match ctx.parser.parse(&response.body, &platform.id) {
            Ok(candidates) => SessionResult::Candidates {
                candidates,
                cookies: response.cookies(),
            },
            Err(e) => {
                debug!(platform = %platform.id, session = %lease.id, error = %e, "Document parse failed");
                SessionResult::Failed {
                    kind: FailureKind::Parse {
                        message: e.to_string(),
                    },
                    cooldown: None,
                }
            }
        }
    }

    /// Drive a detected queue to a conclusion. `None` means scraping resumes.
    #[allow(clippy::too_many_arguments)]
    async fn handle_queue(
        &self,
        ctx: &ExecutionContext<'_>,
        machine: &mut QueueMachine,
        leases: &mut [SessionLease],
        index: usize,
        body: &str,
        url: &str,
        execution_id: &str,
    ) -> Option<ExecutionOutcome> {
        let platform = ctx.platform;
        metrics::QUEUE_DETECTIONS
            .with_label_values(&[platform.id.as_str()])
            .inc();
        info!(platform = %platform.id, session = %leases[index].id, "Virtual queue detected");
        enter(machine, QueuePhase::QueueDetected);

        let owner = match self.queue.mark_in_queue(&platform.id, execution_id, body).await {
            Ok(owner) => owner,
            Err(e) => {
                warn!(platform = %platform.id, error = %e, "Could not record queue state");
                return Some(ExecutionOutcome::Failed);
            }
        };

        if ctx.strategy.bypass_allowed {
            enter(machine, QueuePhase::BypassAttempt);
            match self.bypass.attempt(platform, &leases[index], body).await {
                BypassOutcome::Admitted(lease) => {
                    info!(platform = %platform.id, session = %lease.id, "Queue bypassed");
                    leases[index] = lease;
                    enter(machine, QueuePhase::Scraping);
                    return None;
                }
                BypassOutcome::Declined(reason) => {
                    debug!(platform = %platform.id, reason = %reason, "Falling back to waiting");
                }
            }
        }

        enter(machine, QueuePhase::Waiting);
        let interval = ctx.profile.monitoring_interval();
        let mut owner = owner;
        let mut waited = Ok(WaitOutcome::Resume);
        if !owner {
            waited = self
                .queue
                .wait_passively(&platform.id, execution_id, interval, ctx.cancel)
                .await;
            owner = matches!(waited, Ok(WaitOutcome::Adopted));
        }
        if owner {
            let probe = FetchRequest::new(url, ctx.request_timeout)
                .with_headers(leases[index].headers(Some(&platform.home_url())));
            waited = self
                .queue
                .wait_as_owner(
                    &platform.id,
                    execution_id,
                    self.fetcher.as_ref(),
                    &probe,
                    interval,
                    ctx.cancel,
                )
                .await;
        }

        match waited {
            Ok(WaitOutcome::Resume | WaitOutcome::Adopted) => {
                enter(machine, QueuePhase::Scraping);
                None
            }
            Ok(WaitOutcome::Expired) => {
                enter(machine, QueuePhase::Expired);
                Some(ExecutionOutcome::QueueExpired)
            }
            Ok(WaitOutcome::Cancelled) => Some(ExecutionOutcome::Cancelled),
            Err(e) => {
                warn!(platform = %platform.id, error = %e, "Queue state unavailable while waiting");
                Some(ExecutionOutcome::Failed)
            }
        }
    }

    fn collect(
        &self,
        ctx: &ExecutionContext<'_>,
        execution: &mut PlatformExecution,
        candidates: Vec<CandidateTicket>,
        session_id: &str,
    ) {
        let found = candidates.len();
        let before = execution.tickets.len();
        for candidate in candidates {
            if !ctx.criteria.admits(&candidate) {
                continue;
            }
            let level = ctx
                .profile
                .demand_level
                .most_contested(title_demand_level(&candidate.title, candidate.availability));
            execution.tickets.push(ScrapedTicket::from_candidate(
                candidate,
                &ctx.platform.id,
                session_id,
                level,
            ));
        }
        debug!(
            platform = %ctx.platform.id,
            session = %session_id,
            found,
            kept = execution.tickets.len() - before,
            "Collected candidates"
        );
    }

    async fn set_cooldown(&self, platform: &str, reason: &str, cooldown: Option<Duration>) {
        let cooldown = cooldown.unwrap_or(self.blocked_cooldown);
        if let Err(e) = self.cooldowns.mark(platform, reason, cooldown).await {
            warn!(platform = %platform, error = %e, "Could not set cooldown marker");
        }
    }
}

fn enter(machine: &mut QueueMachine, phase: QueuePhase) {
    if let Err(e) = machine.transition(phase) {
        warn!(error = %e, "Ignoring queue transition");
    }
}
