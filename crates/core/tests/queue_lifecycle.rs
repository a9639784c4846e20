//! Virtual queue integration tests.
//!
//! These tests verify how a scrape behaves around waiting-room pages:
//! scraping -> queue_detected -> [bypass_attempt] -> waiting -> scraping | expired

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ticketscout_core::{
    queue::{BypassOutcome, QueueBypass},
    testing::{fixtures, MockFetcher, NoDelay},
    Config, ExecutionOutcome, FetchResponse, JsonLdEventParser, MemoryStore, ParserRegistry,
    PlatformConfig, QueuePhase, ScrapeCriteria, ScrapeReport, SessionLease, TicketScout,
};

use QueuePhase::*;

struct TestHarness {
    fetcher: Arc<MockFetcher>,
    scout: Arc<TicketScout>,
}

impl TestHarness {
    fn new() -> Self {
        Self::build(config(), None)
    }

    fn build(config: Config, bypass: Option<Arc<dyn QueueBypass>>) -> Self {
        Self::with_fetcher(Arc::new(MockFetcher::new()), config, bypass)
    }

    fn with_fetcher(
        fetcher: Arc<MockFetcher>,
        config: Config,
        bypass: Option<Arc<dyn QueueBypass>>,
    ) -> Self {
        let mut parsers = ParserRegistry::new();
        for platform in &config.platforms {
            parsers.register(platform.id.clone(), Arc::new(JsonLdEventParser::new()));
        }
        let mut builder = TicketScout::builder(
            Arc::new(config),
            fetcher.clone(),
            Arc::new(MemoryStore::new()),
            parsers,
        )
        .delayer(Arc::new(NoDelay));
        if let Some(bypass) = bypass {
            builder = builder.bypass(bypass);
        }
        Self {
            fetcher,
            scout: Arc::new(builder.build()),
        }
    }

    async fn scrape(&self, criteria: ScrapeCriteria) -> ScrapeReport {
        self.scout
            .scrape(&criteria, &CancellationToken::new())
            .await
            .expect("scrape should succeed")
    }
}

fn config() -> Config {
    let mut config = fixtures::test_config();
    config.orchestrator.overall_timeout_secs = 7200;
    config
}

fn psg_criteria() -> ScrapeCriteria {
    ScrapeCriteria::new("PSG vs Marseille").with_platforms(["psg"])
}

fn match_page() -> FetchResponse {
    FetchResponse::ok(fixtures::event_page(
        "PSG vs Marseille",
        "2026-03-15",
        85.0,
        "InStock",
    ))
}

#[tokio::test(start_paused = true)]
async fn test_second_caller_waits_without_fetching() {
    let harness = TestHarness::new();
    harness.fetcher.respond("q=PSG", match_page());
    let queue_page = fixtures::queue_page(400, 45);
    assert!(harness
        .scout
        .queue()
        .mark_in_queue("psg", "other-execution", &queue_page)
        .await
        .unwrap());

    let scout = harness.scout.clone();
    let handle = tokio::spawn(async move {
        scout
            .scrape(&psg_criteria(), &CancellationToken::new())
            .await
    });

    tokio::time::sleep(Duration::from_secs(400)).await;
    assert!(!handle.is_finished());
    assert_eq!(harness.fetcher.fetch_count(), 0);

    // The owner reports the queue is over
    harness.scout.queue().clear("psg").await.unwrap();

    let report = handle.await.unwrap().unwrap();
    let stats = &report.result.platform_stats["psg"];
    assert_eq!(stats.outcome, ExecutionOutcome::Completed);
    assert_eq!(stats.queue_phases, vec![Idle, Waiting, Scraping, Completed]);
    assert_eq!(report.result.tickets.len(), 1);
    assert!(harness.fetcher.fetch_count() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_owner_resumes_when_queue_page_clears() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .respond("q=PSG", FetchResponse::ok(fixtures::queue_page(250, 20)));

    let fetcher = harness.fetcher.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(250)).await;
        fetcher.respond("q=PSG", match_page());
    });

    let report = harness.scrape(psg_criteria()).await;

    let stats = &report.result.platform_stats["psg"];
    assert_eq!(stats.outcome, ExecutionOutcome::Completed);
    assert_eq!(
        stats.queue_phases,
        vec![Idle, Scraping, QueueDetected, Waiting, Scraping, Completed]
    );
    assert_eq!(report.result.tickets.len(), 1);
    assert!(!harness.scout.queue().is_in_queue("psg").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_owner_publishes_position_while_waiting() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .respond("q=PSG", FetchResponse::ok(fixtures::queue_page(900, 60)));

    let fetcher = harness.fetcher.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(100)).await;
        fetcher.respond("q=PSG", FetchResponse::ok(fixtures::queue_page(120, 15)));
    });

    let scout = harness.scout.clone();
    let handle = tokio::spawn(async move {
        scout
            .scrape(&psg_criteria(), &CancellationToken::new())
            .await
    });

    tokio::time::sleep(Duration::from_secs(50)).await;
    let state = harness.scout.queue().state("psg").await.unwrap().unwrap();
    assert_eq!(state.position, Some(900));

    // First probe at the 300 s monitoring interval
    tokio::time::sleep(Duration::from_secs(260)).await;
    let state = harness.scout.queue().state("psg").await.unwrap().unwrap();
    assert!(state.in_queue);
    assert_eq!(state.position, Some(120));
    assert_eq!(state.estimated_wait_secs, Some(15 * 60));

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_requeue_after_resume_fails_execution() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .respond("q=PSG", FetchResponse::ok(fixtures::queue_page(4, 1)));

    let report = harness.scrape(psg_criteria()).await;

    let stats = &report.result.platform_stats["psg"];
    assert_eq!(stats.outcome, ExecutionOutcome::QueueReentered);
    assert_eq!(
        stats.queue_phases,
        vec![Idle, Scraping, QueueDetected, Waiting, Scraping, Failed]
    );
    // Detected once, even though every session saw the queue page
    assert_eq!(
        stats
            .queue_phases
            .iter()
            .filter(|p| **p == QueueDetected)
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_declined_bypass_falls_back_to_waiting() {
    let harness = TestHarness::new();
    harness.fetcher.respond(
        "realmadrid.com/entradas?q=",
        FetchResponse::ok(fixtures::queue_page(3, 1)),
    );

    let report = harness
        .scrape(ScrapeCriteria::new("Real Madrid vs Barcelona").with_platforms(["real_madrid"]))
        .await;

    let stats = &report.result.platform_stats["real_madrid"];
    assert_eq!(stats.outcome, ExecutionOutcome::QueueReentered);
    assert_eq!(
        stats.queue_phases,
        vec![
            Idle,
            Scraping,
            QueueDetected,
            BypassAttempt,
            Waiting,
            Scraping,
            Failed
        ]
    );
}

/// Admits every session it is offered, after which the platform serves
/// the match page.
struct AdmittingBypass {
    fetcher: Arc<MockFetcher>,
    attempts: AtomicUsize,
}

#[async_trait]
impl QueueBypass for AdmittingBypass {
    async fn attempt(
        &self,
        _platform: &PlatformConfig,
        session: &SessionLease,
        _queue_page: &str,
    ) -> BypassOutcome {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.fetcher.respond(
            "realmadrid.com/entradas?q=",
            FetchResponse::ok(fixtures::event_page(
                "Real Madrid vs Barcelona",
                "2026-04-12",
                250.0,
                "InStock",
            )),
        );
        BypassOutcome::Admitted(session.clone())
    }
}

#[tokio::test(start_paused = true)]
async fn test_admitted_bypass_resumes_without_waiting() {
    let fetcher = Arc::new(MockFetcher::new());
    let bypass = Arc::new(AdmittingBypass {
        fetcher: fetcher.clone(),
        attempts: AtomicUsize::new(0),
    });
    let harness = TestHarness::with_fetcher(fetcher, config(), Some(bypass.clone()));
    harness.fetcher.respond(
        "realmadrid.com/entradas?q=",
        FetchResponse::ok(fixtures::queue_page(5000, 240)),
    );

    let report = harness
        .scrape(ScrapeCriteria::new("Real Madrid vs Barcelona").with_platforms(["real_madrid"]))
        .await;

    let stats = &report.result.platform_stats["real_madrid"];
    assert_eq!(stats.outcome, ExecutionOutcome::Completed);
    assert_eq!(
        stats.queue_phases,
        vec![Idle, Scraping, QueueDetected, BypassAttempt, Scraping, Completed]
    );
    assert_eq!(bypass.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(report.result.tickets.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_wait_expires_at_ceiling() {
    let mut config = config();
    config.queue.max_wait_secs = 900;
    let harness = TestHarness::build(config, None);
    harness
        .fetcher
        .respond("q=PSG", FetchResponse::ok(fixtures::queue_page(5000, 120)));

    let report = harness.scrape(psg_criteria()).await;

    let stats = &report.result.platform_stats["psg"];
    assert_eq!(stats.outcome, ExecutionOutcome::QueueExpired);
    assert_eq!(
        stats.queue_phases,
        vec![Idle, Scraping, QueueDetected, Waiting, Expired]
    );
    assert!(report.result.tickets.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .respond("q=PSG", FetchResponse::ok(fixtures::queue_page(800, 50)));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        trigger.cancel();
    });

    let report = harness.scout.scrape(&psg_criteria(), &cancel).await.unwrap();
    assert!(report.result.cancelled);
    assert_eq!(
        report.result.platform_stats["psg"].outcome,
        ExecutionOutcome::Cancelled
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_owner_frees_queue_for_next_scrape() {
    let harness = TestHarness::new();
    harness
        .fetcher
        .respond("q=PSG", FetchResponse::ok(fixtures::queue_page(800, 50)));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        trigger.cancel();
    });

    let report = harness.scout.scrape(&psg_criteria(), &cancel).await.unwrap();
    assert_eq!(
        report.result.platform_stats["psg"].outcome,
        ExecutionOutcome::Cancelled
    );
    assert!(!harness.scout.queue().is_in_queue("psg").await.unwrap());

    harness.fetcher.respond("q=PSG", match_page());
    let started = Instant::now();
    let report = harness.scrape(psg_criteria()).await;

    let stats = &report.result.platform_stats["psg"];
    assert_eq!(stats.outcome, ExecutionOutcome::Completed);
    assert_eq!(stats.queue_phases, vec![Idle, Scraping, Completed]);
    assert_eq!(report.result.tickets.len(), 1);
    assert!(started.elapsed() < Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_expired_owner_frees_queue_for_next_scrape() {
    let mut config = config();
    config.queue.max_wait_secs = 900;
    let harness = TestHarness::build(config, None);
    harness
        .fetcher
        .respond("q=PSG", FetchResponse::ok(fixtures::queue_page(5000, 120)));

    let report = harness.scrape(psg_criteria()).await;
    assert_eq!(
        report.result.platform_stats["psg"].outcome,
        ExecutionOutcome::QueueExpired
    );
    // Released long before the marker's own hour-long lifetime runs out
    assert!(!harness.scout.queue().is_in_queue("psg").await.unwrap());

    harness.fetcher.respond("q=PSG", match_page());
    let started = Instant::now();
    let report = harness.scrape(psg_criteria()).await;

    let stats = &report.result.platform_stats["psg"];
    assert_eq!(stats.outcome, ExecutionOutcome::Completed);
    assert_eq!(stats.queue_phases, vec![Idle, Scraping, Completed]);
    assert_eq!(report.result.tickets.len(), 1);
    assert!(started.elapsed() < Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_silent_owner_marker_is_adopted_by_next_scrape() {
    let harness = TestHarness::new();
    harness.fetcher.respond("q=PSG", match_page());
    // An owner that marked the queue and then went away
    assert!(harness
        .scout
        .queue()
        .mark_in_queue("psg", "vanished-execution", &fixtures::queue_page(600, 40))
        .await
        .unwrap());

    let started = Instant::now();
    let report = harness.scrape(psg_criteria()).await;

    // Two silent 300 s monitoring intervals, not the hour-long marker TTL
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(600));
    assert!(waited < Duration::from_secs(900));

    let stats = &report.result.platform_stats["psg"];
    assert_eq!(stats.outcome, ExecutionOutcome::Completed);
    assert_eq!(stats.queue_phases, vec![Idle, Waiting, Scraping, Completed]);
    assert_eq!(report.result.tickets.len(), 1);
    assert!(!harness.scout.queue().is_in_queue("psg").await.unwrap());
}
