//! End-to-end job lifecycle over mocked infrastructure.
//!
//! Start a job, stream worker messages through the decoding entry point
//! and check what finalization leaves behind.

mod common;

use std::time::Duration;

use backup_core::config::BackupSettings;
use backup_core::domains::backup::protocol::WorkerStatus;
use backup_core::domains::backup::{BackupError, IngestOutcome};
use backup_core::domains::backup::models::BackupJob;
use backup_core::kernel::test_dependencies::{
    InMemoryJobStore, MockArchiver, MockLauncher, MockNotifier, MockSigner,
};
use backup_core::kernel::{BaseJobStore, TestDependencies};
use serde_json::json;
use tempfile::TempDir;

use crate::common::*;

fn status_of(fixture: &ServiceFixture, tag: &str) -> Option<WorkerStatus> {
    fixture
        .service
        .statuses()
        .into_iter()
        .find(|w| w.tag == tag)
        .map(|w| w.status)
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn two_workers_finish_and_the_job_is_finalized_once() {
    let fixture = ServiceFixture::new(TestDependencies::new());

    let started = fixture.service.start(Some("tester")).await.unwrap();
    assert_eq!(started.workers, vec!["alpha", "beta"]);

    fixture.complete_worker("alpha", 5, 10).await;
    assert_eq!(fixture.deps.archiver.call_count(), 0);
    assert_eq!(fixture.service.active_job(), Some(started.job_id));

    fixture.send(&preflight("beta", 8)).await.unwrap();
    fixture.send(&progress_pages("beta", 7, 1)).await.unwrap();
    let outcome = fixture.service.ingest(&bytes(&finish("beta"))).await.unwrap();

    let summary = match outcome {
        IngestOutcome::Finalized(summary) => summary,
        other => panic!("expected finalization, got {:?}", other),
    };
    assert_eq!(summary.job_id, started.job_id);
    assert!(summary.signed);
    assert!(summary.notified);
    assert!(summary.report.contains("alpha\nBacked up 5 of 10 pages\nRecorded 0 errors"));
    assert!(summary.report.contains("beta\nBacked up 7 of 8 pages\nRecorded 0 errors"));
    assert!(summary.report.contains("0123 4567 89AB CDEF"));
    assert!(summary.report.contains(&summary.archive_hash));

    assert_eq!(fixture.deps.archiver.call_count(), 1);
    assert!(fixture.deps.notifier.was_sent_containing("Backed up 5 of 10 pages"));

    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    assert!(job.is_finished);
    assert!(job.signature_present);
    assert_eq!(job.initiator.as_deref(), Some("tester"));
    assert_eq!(job.archive_hash.as_deref(), Some(summary.archive_hash.as_str()));

    let archive = fixture.service.archive_path(&job).unwrap();
    assert_eq!(archive, summary.archive_path);
    assert!(archive.exists());
    assert!(fixture.service.signature_path(&job).unwrap().exists());

    // Registry and slot are cleared after finalization
    assert!(fixture.service.statuses().is_empty());
    assert_eq!(fixture.service.active_job(), None);
}

#[tokio::test]
async fn string_wrapped_messages_are_accepted() {
    let fixture = ServiceFixture::new(TestDependencies::new().with_sites(&["alpha"]));
    fixture.service.start(None).await.unwrap();

    fixture
        .service
        .ingest(&string_wrapped(&preflight("alpha", 3)))
        .await
        .unwrap();

    let alpha = fixture.service.statuses().remove(0);
    assert_eq!(alpha.total_items, Some(3));
}

#[tokio::test]
async fn two_job_cycles_in_one_process_both_finalize() {
    let fixture = ServiceFixture::new(TestDependencies::new());

    let first = fixture.service.start(None).await.unwrap();
    fixture.complete_worker("alpha", 1, 1).await;
    fixture.complete_worker("beta", 2, 2).await;

    let second = fixture.service.start(None).await.unwrap();
    assert_ne!(first.job_id, second.job_id);
    assert_eq!(fixture.service.statuses().len(), 2);
    assert!(fixture
        .service
        .statuses()
        .iter()
        .all(|w| w.status == WorkerStatus::Other && w.finished_items == 0));

    fixture.complete_worker("alpha", 3, 3).await;
    fixture.complete_worker("beta", 4, 4).await;

    assert_eq!(fixture.deps.archiver.call_count(), 2);
    let jobs = fixture.deps.job_store.jobs();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.is_finished));
    assert!(fixture.deps.notifier.was_sent_containing("Backed up 4 of 4 pages"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_finish_messages_finalize_exactly_once() {
    let tags = ["a1", "a2", "a3", "a4", "a5", "a6", "a7", "a8"];
    let fixture = ServiceFixture::new(TestDependencies::new().with_sites(&tags));
    fixture.service.start(None).await.unwrap();

    for tag in tags {
        fixture.send(&preflight(tag, 2)).await.unwrap();
        fixture.send(&progress_pages(tag, 2, 0)).await.unwrap();
    }

    let handles: Vec<_> = tags
        .iter()
        .map(|tag| {
            let service = fixture.service.clone();
            let payload = bytes(&finish(tag));
            tokio::spawn(async move { service.ingest(&payload).await })
        })
        .collect();

    let mut finalized = 0;
    for handle in handles {
        if let IngestOutcome::Finalized(_) = handle.await.unwrap().unwrap() {
            finalized += 1;
        }
    }

    assert_eq!(finalized, 1);
    assert_eq!(fixture.deps.archiver.call_count(), 1);
    assert!(fixture.deps.job_store.jobs()[0].is_finished);
}

#[tokio::test]
async fn finalization_completes_when_the_caller_goes_away() {
    let fixture = ServiceFixture::new(
        TestDependencies::new()
            .mock_archiver(MockArchiver::new().with_delay(Duration::from_millis(300))),
    );
    let started = fixture.service.start(None).await.unwrap();
    fixture.complete_worker("alpha", 1, 1).await;
    fixture.send(&preflight("beta", 1)).await.unwrap();

    // The client disconnects while the archive is still being written
    let payload = bytes(&finish("beta"));
    let dropped =
        tokio::time::timeout(Duration::from_millis(50), fixture.service.ingest(&payload)).await;
    assert!(dropped.is_err());

    // The slot is released only after the record is marked finished
    for _ in 0..200 {
        if fixture.service.active_job().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fixture.service.active_job(), None);
    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    assert!(job.is_finished);
    assert_eq!(fixture.deps.archiver.call_count(), 1);
    assert_eq!(fixture.deps.notifier.sent_messages().len(), 1);
    assert!(fixture.service.statuses().is_empty());

    fixture.service.start(None).await.unwrap();
}

// =============================================================================
// Message handling
// =============================================================================

#[tokio::test]
async fn unknown_message_type_is_rejected_without_mutation() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    fixture.service.start(None).await.unwrap();
    fixture.send(&preflight("alpha", 10)).await.unwrap();
    let before = fixture.service.statuses();

    let err = fixture
        .send(&json!({ "type": 9, "tag": "alpha" }))
        .await
        .unwrap_err();

    assert!(matches!(err, BackupError::Codec(_)));
    assert!(err.is_client_error());
    assert_eq!(fixture.service.statuses(), before);
}

#[tokio::test]
async fn malformed_payloads_leave_state_unchanged() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    fixture.service.start(None).await.unwrap();
    fixture.send(&preflight("alpha", 10)).await.unwrap();
    let before = fixture.service.statuses();

    let payloads = [
        json!({ "tag": "alpha" }),
        json!({ "type": 1, "tag": "alpha" }),
        json!({ "type": 1, "tag": "alpha", "total": -1 }),
        json!({ "type": 2, "tag": "alpha", "status": 1 }),
        json!({ "type": 2, "tag": "alpha", "status": 9 }),
        json!({ "type": 3, "tag": "alpha", "errorKind": 15 }),
        json!({ "type": 4, "tag": "alpha", "errorKind": 13 }),
        json!({ "type": 5, "tag": 7 }),
        json!([1, 2, 3]),
    ];
    for payload in &payloads {
        let err = fixture.send(payload).await.unwrap_err();
        assert!(err.is_client_error(), "accepted {}", payload);
    }

    let err = fixture.service.ingest(b"{not json").await.unwrap_err();
    assert!(matches!(err, BackupError::Codec(_)));

    assert_eq!(fixture.service.statuses(), before);
}

#[tokio::test]
async fn error_kind_with_required_name() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    fixture.service.start(None).await.unwrap();

    let err = fixture.send(&error_fatal("alpha", 3, None)).await.unwrap_err();
    assert!(matches!(err, BackupError::Codec(_)));
    assert_eq!(status_of(&fixture, "alpha"), Some(WorkerStatus::Other));

    fixture
        .send(&error_fatal("alpha", 3, Some("index.html")))
        .await
        .unwrap();
    fixture.send(&error_nonfatal("beta", 0)).await.unwrap();

    let statuses = fixture.service.statuses();
    let alpha = statuses.iter().find(|w| w.tag == "alpha").unwrap();
    let beta = statuses.iter().find(|w| w.tag == "beta").unwrap();
    assert_eq!(alpha.status, WorkerStatus::FatalError);
    assert_eq!(alpha.error_count, 1);
    assert_eq!(beta.status, WorkerStatus::Other);
    assert_eq!(beta.error_count, 1);
}

#[tokio::test]
async fn progress_after_done_is_ignored() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    fixture.service.start(None).await.unwrap();

    fixture.complete_worker("alpha", 5, 10).await;
    fixture.send(&progress_pages("alpha", 9, 0)).await.unwrap();
    fixture.send(&progress("alpha", 3)).await.unwrap();

    let alpha = fixture
        .service
        .statuses()
        .into_iter()
        .find(|w| w.tag == "alpha")
        .unwrap();
    assert_eq!(alpha.status, WorkerStatus::Done);
    assert_eq!(alpha.finished_items, 5);
}

#[tokio::test]
async fn progress_is_clamped_to_total() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    fixture.service.start(None).await.unwrap();

    fixture.send(&preflight("alpha", 4)).await.unwrap();
    fixture.send(&progress_pages("alpha", 9, 0)).await.unwrap();

    let alpha = fixture.service.statuses().remove(0);
    assert_eq!(alpha.finished_items, 4);
}

#[tokio::test]
async fn messages_for_unknown_workers_are_rejected() {
    let fixture = ServiceFixture::new(TestDependencies::new());

    // No job running
    let err = fixture.send(&handshake("alpha")).await.unwrap_err();
    assert!(matches!(err, BackupError::UnknownWorker { .. }));

    fixture.service.start(None).await.unwrap();
    let err = fixture.send(&handshake("gamma")).await.unwrap_err();
    assert!(matches!(err, BackupError::UnknownWorker { ref tag } if tag == "gamma"));
    assert!(err.is_client_error());

    fixture.send(&handshake("alpha")).await.unwrap();
}

#[tokio::test]
async fn page_signals_are_not_applied() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    fixture.service.start(None).await.unwrap();
    let before = fixture.service.statuses();

    let err = fixture
        .send(&json!({ "type": 6, "tag": "alpha" }))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::UnhandledMessage(_)));
    assert!(err.is_client_error());
    assert_eq!(fixture.service.statuses(), before);
}

// =============================================================================
// Finalization failures
// =============================================================================

#[tokio::test]
async fn archive_failure_leaves_job_unfinished_and_notifies() {
    let fixture = ServiceFixture::new(
        TestDependencies::new().mock_archiver(MockArchiver::new().failing()),
    );
    let started = fixture.service.start(None).await.unwrap();

    fixture.complete_worker("alpha", 1, 1).await;
    fixture.send(&preflight("beta", 1)).await.unwrap();
    let outcome = fixture.service.ingest(&bytes(&finish("beta"))).await.unwrap();

    assert!(matches!(
        outcome,
        IngestOutcome::FinalizationFailed(BackupError::Archive(_))
    ));
    assert!(fixture.deps.notifier.was_sent_containing("archiving failed"));
    assert!(fixture.service.statuses().is_empty());

    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    assert!(!job.is_finished);
    assert!(job.archive_hash.is_none());

    // The stuck job blocks new starts until an operator abandons it
    let err = fixture.service.start(None).await.unwrap_err();
    assert!(matches!(err, BackupError::JobAlreadyRunning(id) if id == started.job_id));
    assert_eq!(fixture.service.abandon().await.unwrap(), Some(started.job_id));
    fixture.service.start(None).await.unwrap();
}

#[tokio::test]
async fn signing_failure_still_finishes_the_job() {
    let fixture =
        ServiceFixture::new(TestDependencies::new().mock_signer(MockSigner::new().failing()));
    let started = fixture.service.start(None).await.unwrap();

    fixture.complete_worker("alpha", 1, 2).await;
    fixture.complete_worker("beta", 2, 2).await;

    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    assert!(job.is_finished);
    assert!(!job.signature_present);
    assert!(fixture.service.signature_path(&job).is_none());
    assert!(fixture.deps.notifier.was_sent_containing("NOT SIGNED"));

    let signatures: Vec<_> = std::fs::read_dir(fixture.archive_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "asc"))
        .collect();
    assert!(signatures.is_empty());
    assert_eq!(fixture.deps.signer.fingerprint_calls(), 0);
}

#[tokio::test]
async fn notifier_failure_still_finishes_the_job() {
    let fixture =
        ServiceFixture::new(TestDependencies::new().mock_notifier(MockNotifier::new().failing()));
    let started = fixture.service.start(None).await.unwrap();

    fixture.complete_worker("alpha", 1, 1).await;
    fixture.send(&preflight("beta", 1)).await.unwrap();
    let outcome = fixture.service.ingest(&bytes(&finish("beta"))).await.unwrap();

    let summary = match outcome {
        IngestOutcome::Finalized(summary) => summary,
        other => panic!("expected finalization, got {:?}", other),
    };
    assert!(!summary.notified);
    assert_eq!(fixture.deps.notifier.sent_messages().len(), 1);

    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    assert!(job.is_finished);
    assert!(fixture.service.archive_path(&job).unwrap().exists());
    assert_eq!(fixture.service.active_job(), None);
}

#[tokio::test]
async fn completion_without_matching_record_is_inconsistent() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    let started = fixture.service.start(None).await.unwrap();

    // The record was closed behind the orchestrator's back
    assert_eq!(
        fixture.deps.job_store.abandon_unfinished().await.unwrap(),
        Some(started.job_id)
    );

    fixture.complete_worker("alpha", 1, 1).await;
    fixture.send(&preflight("beta", 1)).await.unwrap();
    let outcome = fixture.service.ingest(&bytes(&finish("beta"))).await.unwrap();

    assert!(matches!(
        outcome,
        IngestOutcome::FinalizationFailed(BackupError::InconsistentState(_))
    ));
    assert!(fixture.deps.notifier.was_sent_containing("finalization aborted"));
    assert_eq!(fixture.deps.archiver.call_count(), 0);
    assert!(fixture.service.statuses().is_empty());
    assert_eq!(fixture.service.active_job(), None);
}

#[tokio::test]
async fn archive_hash_store_failure_leaves_job_unfinished() {
    let fixture = ServiceFixture::new(
        TestDependencies::new().mock_job_store(InMemoryJobStore::new().failing_archive_hash()),
    );
    let started = fixture.service.start(None).await.unwrap();

    fixture.complete_worker("alpha", 1, 1).await;
    fixture.send(&preflight("beta", 1)).await.unwrap();
    let outcome = fixture.service.ingest(&bytes(&finish("beta"))).await.unwrap();

    assert!(matches!(
        outcome,
        IngestOutcome::FinalizationFailed(BackupError::Store(_))
    ));
    assert!(fixture.deps.notifier.was_sent_containing("could not be recorded"));
    assert!(fixture.deps.signer.signed_files().is_empty());

    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    assert!(!job.is_finished);
    assert!(fixture.service.statuses().is_empty());
    assert_eq!(fixture.service.active_job(), None);
}

// =============================================================================
// Start preconditions and rollback
// =============================================================================

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    let started = fixture.service.start(None).await.unwrap();
    fixture.send(&preflight("alpha", 3)).await.unwrap();
    let before = fixture.service.statuses();

    let err = fixture.service.start(None).await.unwrap_err();

    assert!(matches!(err, BackupError::JobAlreadyRunning(id) if id == started.job_id));
    assert_eq!(fixture.deps.job_store.jobs().len(), 1);
    assert_eq!(fixture.service.statuses(), before);
    assert_eq!(fixture.deps.launcher.start_calls(), 1);
}

#[tokio::test]
async fn unfinished_job_from_store_blocks_start() {
    let leftover = BackupJob::started(Some("previous run".into()));
    let leftover_id = leftover.id;
    let fixture = ServiceFixture::new(
        TestDependencies::new().mock_job_store(InMemoryJobStore::new().with_job(leftover)),
    );

    let err = fixture.service.start(None).await.unwrap_err();
    assert!(matches!(err, BackupError::JobAlreadyRunning(id) if id == leftover_id));
}

#[tokio::test]
async fn launcher_start_failure_rolls_back() {
    let fixture = ServiceFixture::new(
        TestDependencies::new().mock_launcher(MockLauncher::new().failing_start()),
    );

    let err = fixture.service.start(None).await.unwrap_err();

    assert!(matches!(err, BackupError::LauncherStart(_)));
    assert!(fixture.deps.job_store.jobs().is_empty());
    assert_eq!(fixture.service.active_job(), None);
    assert!(fixture.service.statuses().is_empty());
}

#[tokio::test]
async fn launcher_start_timeout_rolls_back() {
    let deps = TestDependencies::new()
        .mock_launcher(MockLauncher::new().with_start_delay(Duration::from_secs(5)));
    let dir = TempDir::new().unwrap();
    let mut settings = settings_in(&dir);
    settings.launch_timeout = Duration::from_millis(50);
    let service = deps.build_service(settings);

    let err = service.start(None).await.unwrap_err();

    assert!(matches!(err, BackupError::LauncherStart(ref msg) if msg.contains("timed out")));
    assert!(deps.job_store.jobs().is_empty());
    assert_eq!(service.active_job(), None);
}

#[tokio::test]
async fn launcher_login_failure_creates_nothing() {
    let fixture = ServiceFixture::new(
        TestDependencies::new().mock_launcher(MockLauncher::new().failing_login()),
    );

    let err = fixture.service.start(None).await.unwrap_err();

    assert!(matches!(err, BackupError::LauncherLogin(_)));
    assert_eq!(fixture.deps.launcher.login_calls(), 1);
    assert_eq!(fixture.deps.launcher.start_calls(), 0);
    assert!(fixture.deps.job_store.jobs().is_empty());
}

#[tokio::test]
async fn launcher_login_runs_before_start() {
    let fixture =
        ServiceFixture::new(TestDependencies::new().mock_launcher(MockLauncher::new().with_login()));

    fixture.service.start(None).await.unwrap();

    assert_eq!(fixture.deps.launcher.login_calls(), 1);
    assert_eq!(fixture.deps.launcher.start_calls(), 1);
}

#[tokio::test]
async fn start_preconditions_are_checked_in_order() {
    let deps = TestDependencies::new();

    let service = deps.build_service(BackupSettings::builder().build());
    assert!(matches!(
        service.start(None).await.unwrap_err(),
        BackupError::LaunchMethodInvalid
    ));

    let service = deps.build_service(
        BackupSettings::builder()
            .launch_method(Some(backup_core::config::LaunchMethod::Command))
            .build(),
    );
    assert!(matches!(
        service.start(None).await.unwrap_err(),
        BackupError::PathsMissing
    ));

    let unconfigured = TestDependencies::new().mock_launcher(MockLauncher::new().unconfigured());
    let dir = TempDir::new().unwrap();
    let service = unconfigured.build_service(settings_in(&dir));
    assert!(matches!(
        service.start(None).await.unwrap_err(),
        BackupError::LauncherNotConfigured(ref name) if name == "mock"
    ));

    let no_sites = TestDependencies::new().with_sites(&[]);
    let service = no_sites.build_service(settings_in(&dir));
    assert!(matches!(
        service.start(None).await.unwrap_err(),
        BackupError::NoActiveSites
    ));

    assert!(deps.job_store.jobs().is_empty());
    assert!(no_sites.job_store.jobs().is_empty());
}

// =============================================================================
// Administration
// =============================================================================

#[tokio::test]
async fn abandon_clears_the_running_job() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    let started = fixture.service.start(None).await.unwrap();

    assert_eq!(fixture.service.abandon().await.unwrap(), Some(started.job_id));
    assert_eq!(fixture.service.active_job(), None);
    assert!(fixture.service.statuses().is_empty());
    assert_eq!(fixture.deps.launcher.stop_calls(), 1);

    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    assert!(job.is_finished);
    assert!(job.archive_hash.is_none());

    // Late messages from the abandoned fleet are rejected
    let err = fixture.send(&finish("alpha")).await.unwrap_err();
    assert!(matches!(err, BackupError::UnknownWorker { .. }));

    assert_eq!(fixture.service.abandon().await.unwrap(), None);
    assert_eq!(fixture.deps.launcher.stop_calls(), 1);
}

#[tokio::test]
async fn abandon_succeeds_when_the_crawler_cannot_be_stopped() {
    let fixture = ServiceFixture::new(
        TestDependencies::new().mock_launcher(MockLauncher::new().failing_stop()),
    );
    let started = fixture.service.start(None).await.unwrap();

    assert_eq!(fixture.service.abandon().await.unwrap(), Some(started.job_id));
    assert_eq!(fixture.deps.launcher.stop_calls(), 1);
    assert_eq!(fixture.service.active_job(), None);
    fixture.service.start(None).await.unwrap();
}

#[tokio::test]
async fn delete_removes_record_and_files() {
    let fixture = ServiceFixture::new(TestDependencies::new());
    let started = fixture.service.start(None).await.unwrap();
    fixture.complete_worker("alpha", 1, 1).await;
    fixture.complete_worker("beta", 1, 1).await;

    let job = fixture.service.find_job(started.job_id).await.unwrap().unwrap();
    let archive = fixture.service.archive_path(&job).unwrap();
    let signature = fixture.service.signature_path(&job).unwrap();

    assert!(fixture.service.delete_job(started.job_id).await.unwrap());
    assert!(!archive.exists());
    assert!(!signature.exists());
    assert!(fixture.service.find_job(started.job_id).await.unwrap().is_none());
    assert!(!fixture.service.delete_job(started.job_id).await.unwrap());
}

#[tokio::test]
async fn jobs_with_identical_archives_keep_their_files() {
    let fixture = ServiceFixture::new(TestDependencies::new());

    let first = fixture.service.start(None).await.unwrap();
    fixture.complete_worker("alpha", 1, 1).await;
    fixture.complete_worker("beta", 1, 1).await;
    let second = fixture.service.start(None).await.unwrap();
    fixture.complete_worker("alpha", 1, 1).await;
    fixture.complete_worker("beta", 1, 1).await;

    let first_job = fixture.service.find_job(first.job_id).await.unwrap().unwrap();
    let second_job = fixture.service.find_job(second.job_id).await.unwrap().unwrap();
    assert!(second_job.is_finished);
    assert_eq!(first_job.archive_hash, second_job.archive_hash);
    let archive = fixture.service.archive_path(&first_job).unwrap();
    let signature = fixture.service.signature_path(&first_job).unwrap();
    assert_eq!(fixture.service.archive_path(&second_job), Some(archive.clone()));

    assert!(fixture.service.delete_job(second.job_id).await.unwrap());
    assert!(archive.exists());
    assert!(signature.exists());

    assert!(fixture.service.delete_job(first.job_id).await.unwrap());
    assert!(!archive.exists());
    assert!(!signature.exists());
}

#[tokio::test]
async fn replace_sites_validates_urls() {
    let fixture = ServiceFixture::new(TestDependencies::new());

    let err = fixture
        .service
        .replace_sites(Some("https://gamma.wikidot.com\nnot a url"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::InvalidSite(_)));

    let sites = fixture
        .service
        .replace_sites(Some("https://gamma.wikidot.com\n\nhttps://alpha.wikidot.com\n"))
        .await
        .unwrap();
    let mut names: Vec<_> = sites.into_iter().map(|s| s.name).collect();
    names.sort();
    assert_eq!(names, vec!["alpha", "gamma"]);

    let started = fixture.service.start(None).await.unwrap();
    assert_eq!(started.workers, vec!["alpha", "gamma"]);
}

#[tokio::test]
async fn replace_sites_rejects_colliding_tags() {
    let fixture = ServiceFixture::new(TestDependencies::new());

    let err = fixture
        .service
        .replace_sites(Some("https://scp-cs.wikidot.com\nhttps://scp-cs.example.org"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackupError::InvalidSite(ref msg) if msg.contains("scp-cs")));

    // The site list is untouched
    let started = fixture.service.start(None).await.unwrap();
    assert_eq!(started.workers, vec!["alpha", "beta"]);

    // Repeating the same URL is not a collision
    fixture.service.abandon().await.unwrap();
    let sites = fixture
        .service
        .replace_sites(Some("https://gamma.wikidot.com\nhttps://gamma.wikidot.com"))
        .await
        .unwrap();
    assert_eq!(sites.len(), 1);
}
