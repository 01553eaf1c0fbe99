use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rebound_core::{Category, RemoteError};
use rebound_engine::{
    confirm_read, run_bulk, BulkError, BulkOptions, BulkOrchestrator, CancellationToken,
    ChannelProgress, ConsistencySettings, Interruption, NoProgress, Progress, Severity, Verdict,
};

fn ids(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("item-{i}")).collect()
}

fn throttled() -> RemoteError {
    RemoteError::api(429, "Throttled", "slow down")
}

#[tokio::test]
async fn test_throttled_items_yield_partial_success() {
    let report = run_bulk(
        ids(5),
        |id| async move {
            if id == "item-2" || id == "item-4" {
                Err(throttled())
            } else {
                Ok(id)
            }
        },
        BulkOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.verdict(), Verdict::PartialSuccess);
    assert_eq!(report.total(), 5);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed_items(), ["item-2", "item-4"]);

    let last = report.last_error().unwrap();
    assert_eq!(last.status_code(), 429);
    assert_eq!(last.category(), Category::Throttling);

    let diagnostic = report.diagnostic(false);
    assert_eq!(diagnostic.severity, Severity::Warning);
    assert!(diagnostic.detail.contains("item-2, item-4"));
    assert_eq!(report.diagnostic(true).severity, Severity::Info);
}

#[tokio::test]
async fn test_single_forbidden_item_is_complete_failure() {
    let result = run_bulk(
        ["only"],
        |_id| async { Err::<(), _>(RemoteError::api(403, "Forbidden", "no access")) },
        BulkOptions::default(),
    )
    .await;

    match result {
        Err(BulkError::CompleteFailure {
            total,
            failed_items,
            last_error,
            interruption,
        }) => {
            assert_eq!(total, 1);
            assert_eq!(interruption, None);
            assert_eq!(failed_items, vec!["only".to_string()]);
            assert_eq!(last_error.status_code(), 403);
            assert_eq!(last_error.category(), Category::Authorization);
        }
        other => panic!("expected complete failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_all_success() {
    let report = run_bulk(
        ids(4),
        |id| async move { Ok::<_, RemoteError>(id.len()) },
        BulkOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.verdict(), Verdict::CompleteSuccess);
    assert!(report.failed_items().is_empty());
    assert!(report.last_error().is_none());
    assert_eq!(report.diagnostic(false).severity, Severity::Info);
    assert!(report.results().iter().all(|r| r.value() == Some(&6)));
}

#[tokio::test]
async fn test_all_failed_ignored_is_reported_not_raised() {
    let report = run_bulk(
        ids(3),
        |_id| async { Err::<(), _>(RemoteError::api(500, "InternalError", "boom")) },
        BulkOptions::default().ignoring_partial_failures(true),
    )
    .await
    .unwrap();

    assert_eq!(report.verdict(), Verdict::CompleteFailure);
    assert_eq!(report.failed_items().len(), 3);
    assert!(!report.is_hard_failure(true));
    assert!(report.is_hard_failure(false));
    assert_eq!(report.diagnostic(true).severity, Severity::Warning);
}

#[tokio::test]
async fn test_all_failed_not_ignored_is_raised() {
    let result = run_bulk(
        ids(3),
        |_id| async { Err::<(), _>(RemoteError::api(500, "InternalError", "boom")) },
        BulkOptions::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(BulkError::CompleteFailure { total: 3, .. })
    ));
}

#[tokio::test]
async fn test_counts_always_add_up() {
    for failing_every in 1..=5 {
        let report = run_bulk(
            ids(10),
            move |id| async move {
                let n: usize = id.trim_start_matches("item-").parse().unwrap();
                if n % failing_every == 0 {
                    Err(throttled())
                } else {
                    Ok(n)
                }
            },
            BulkOptions::default().ignoring_partial_failures(true),
        )
        .await
        .unwrap();

        assert_eq!(report.total(), 10);
        assert_eq!(report.results().len(), 10);
        assert_eq!(report.succeeded() + report.failed_items().len(), report.total());
    }
}

#[tokio::test]
async fn test_panicking_item_does_not_sink_siblings() {
    let report = run_bulk(
        ids(3),
        |id| async move {
            assert!(id != "item-2", "simulated crash");
            Ok::<_, RemoteError>(id)
        },
        BulkOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.verdict(), Verdict::PartialSuccess);
    assert_eq!(report.failed_items(), ["item-2"]);
    let error = report.last_error().unwrap();
    assert_eq!(error.status_code(), 500);
    assert_eq!(error.error_code(), "ActionPanicked");
    assert!(error.message().contains("simulated crash"));
}

#[tokio::test]
async fn test_cancellation_keeps_finished_items() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let orchestrator = BulkOrchestrator::new(BulkOptions::default().ignoring_partial_failures(true));

    let report = orchestrator
        .run(
            ["fast", "slow"],
            move |id| {
                let trigger = trigger.clone();
                async move {
                    if id == "fast" {
                        trigger.cancel();
                        Ok::<_, RemoteError>(())
                    } else {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok(())
                    }
                }
            },
            &NoProgress,
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(report.interruption(), Some(Interruption::Cancelled));
    assert_eq!(report.results().len(), 2);
    assert!(report.results()[0].succeeded());
    let slow = report.results()[1].error().unwrap();
    assert_eq!(slow.status_code(), 499);
    assert_eq!(slow.error_code(), "RequestCancelled");
}

#[tokio::test]
async fn test_cancel_before_any_item_finishes_is_reported_as_interrupted() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = BulkOrchestrator::default()
        .run(
            ["first", "second"],
            |_id| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, RemoteError>(())
            },
            &NoProgress,
            &cancel,
        )
        .await;

    assert!(started.elapsed() < Duration::from_secs(10));
    let err = result.unwrap_err();
    assert!(err.is_interrupted());
    assert_eq!(err.interruption(), Some(Interruption::Cancelled));
    assert!(err.to_string().contains("(batch cancelled)"));
    match err {
        BulkError::CompleteFailure {
            failed_items,
            last_error,
            ..
        } => {
            assert_eq!(failed_items, vec!["first".to_string(), "second".to_string()]);
            assert_eq!(last_error.error_code(), "RequestCancelled");
        }
        other => panic!("expected complete failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_batch_is_not_interrupted() {
    let err = run_bulk(
        ["a", "b"],
        |_id| async { Err::<(), _>(RemoteError::api(401, "Unauthorized", "expired token")) },
        BulkOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(!err.is_interrupted());
    assert_eq!(err.interruption(), None);
}

#[tokio::test]
async fn test_batch_timeout_marks_stragglers() {
    let orchestrator = BulkOrchestrator::new(
        BulkOptions::default()
            .with_timeout(Duration::from_millis(50))
            .ignoring_partial_failures(true),
    );

    let report = orchestrator
        .run(
            ["quick", "stuck"],
            |id| async move {
                if id == "stuck" {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                }
                Ok::<_, RemoteError>(())
            },
            &NoProgress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.interruption(), Some(Interruption::TimedOut));
    assert_eq!(report.failed_items(), ["stuck"]);
    let error = report.last_error().unwrap();
    assert_eq!(error.status_code(), 504);
    assert_eq!(error.error_code(), "BatchTimeout");
}

#[tokio::test]
async fn test_concurrency_cap_is_respected() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (counter, high) = (Arc::clone(&running), Arc::clone(&peak));

    let report = run_bulk(
        ids(12),
        move |_id| {
            let running = Arc::clone(&counter);
            let peak = Arc::clone(&high);
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, RemoteError>(())
            }
        },
        BulkOptions::default().with_max_concurrency(3),
    )
    .await
    .unwrap();

    assert_eq!(report.verdict(), Verdict::CompleteSuccess);
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_progress_reaches_total() {
    let seen = Mutex::new(Vec::new());
    let sink = |p: Progress| seen.lock().unwrap().push(p);

    BulkOrchestrator::default()
        .run(
            ids(4),
            |_id| async { Ok::<_, RemoteError>(()) },
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|p| p.total == 4));
    assert!(seen.windows(2).all(|w| w[0].completed < w[1].completed));
    assert_eq!(seen.last().unwrap().completed, 4);
    assert_eq!(seen.last().unwrap().percent(), 100);
}

#[tokio::test]
async fn test_channel_progress() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sink = ChannelProgress::new(tx);

    BulkOrchestrator::default()
        .run(
            ids(2),
            |_id| async { Ok::<_, RemoteError>(()) },
            &sink,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    drop(sink);

    let mut last = None;
    while let Some(progress) = rx.recv().await {
        last = Some(progress);
    }
    assert_eq!(last.unwrap().completed, 2);
}

#[tokio::test]
async fn test_preflight_validation() {
    let action = |_id: String| async { Ok::<_, RemoteError>(()) };

    let empty = run_bulk(Vec::<String>::new(), action, BulkOptions::default()).await;
    assert!(matches!(empty, Err(BulkError::EmptyBatch)));

    let duplicate = run_bulk(["a", "a"], action, BulkOptions::default()).await;
    assert!(matches!(duplicate, Err(BulkError::DuplicateItem(_))));

    let zero = run_bulk(["a"], action, BulkOptions::default().with_max_concurrency(0)).await;
    assert!(matches!(zero, Err(BulkError::InvalidConcurrency)));
}

#[tokio::test]
async fn test_consistency_loop_inside_bulk_action() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let settings = ConsistencySettings::new(Duration::from_secs(5))
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5));

    let report = run_bulk(
        ["created"],
        move |id| {
            let counter = Arc::clone(&counter);
            async move {
                confirm_read(
                    || {
                        let seen = counter.fetch_add(1, Ordering::SeqCst);
                        let id = id.clone();
                        async move {
                            if seen < 2 {
                                Err(RemoteError::api(404, "NotFound", "not yet"))
                            } else {
                                Ok(id)
                            }
                        }
                    },
                    &settings,
                    &CancellationToken::new(),
                )
                .await
            }
        },
        BulkOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.verdict(), Verdict::CompleteSuccess);
    assert_eq!(report.results()[0].value().map(String::as_str), Some("created"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}
