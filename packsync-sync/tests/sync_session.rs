mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use packsync_core::Digest;
use packsync_sync::{
    CancelToken, DiffEngine, FetchError, HashVerifier, ManifestClient, ProgressSink,
    RuntimeControl, SyncAbort, SyncEvent, SyncOrchestrator, SyncPhase, SyncResult,
};
use tempfile::TempDir;

use common::{
    config, file_url, instant_countdown, manifest_url, FakeServer, RecordingControl, Route,
};

fn orchestrator<'a>(
    server: &'a FakeServer,
    dir: &TempDir,
    retries: u32,
    threads: usize,
) -> SyncOrchestrator<&'a FakeServer> {
    SyncOrchestrator::new(config(retries, threads), server)
        .with_target_dir(dir.path())
        .with_countdown(instant_countdown())
}

fn count(events: &[SyncEvent], pred: impl Fn(&SyncEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_single_missing_file_downloads_and_restarts() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"0123456789")]);
    let control = RecordingControl::default();
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 3, 2).synchronize(&mut sink, &control);

    assert_eq!(
        result,
        SyncResult::AllSucceeded {
            downloaded: 1,
            restart_scheduled: true
        }
    );
    assert_eq!(control.restarts(), 1);
    assert_eq!(sink.first(), Some(&SyncEvent::Total { count: 1 }));

    let complete = sink
        .iter()
        .position(|e| *e == SyncEvent::Complete { filename: "a.jar".into() })
        .expect("complete event");
    let all_done = sink
        .iter()
        .position(|e| *e == SyncEvent::AllDone)
        .expect("all done event");
    assert!(complete < all_done);
    assert_eq!(
        &sink[all_done + 1..],
        &[
            SyncEvent::CountdownTick { seconds_left: 3 },
            SyncEvent::CountdownTick { seconds_left: 2 },
            SyncEvent::CountdownTick { seconds_left: 1 },
        ]
    );
    assert_eq!(fs::read(dir.path().join("a.jar")).expect("file"), b"0123456789");
}

#[test]
fn scenario_b_manifest_http_500_aborts_before_any_download() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.route(manifest_url(), Route::Status(500));
    let control = RecordingControl::default();
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 3, 2).synchronize(&mut sink, &control);

    assert_eq!(
        result,
        SyncResult::AbortedOnError(SyncAbort::Manifest(FetchError::HttpStatus(500)))
    );
    assert_eq!(count(&sink, |e| matches!(e, SyncEvent::Start { .. })), 0);
    assert_eq!(
        sink,
        vec![SyncEvent::Error {
            filename: None,
            message: "manifest request failed with HTTP 500".to_string(),
        }]
    );
    assert_eq!(server.total_hits(), 1);
    assert_eq!(control.restarts(), 0);
}

#[test]
fn scenario_c_corrupt_payload_exhausts_three_attempts() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"expected bytes")]);
    server.route(file_url("a.jar"), Route::Ok(b"something else".to_vec()));
    let control = RecordingControl::default();
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 2, 1).synchronize(&mut sink, &control);

    match result {
        SyncResult::AbortedOnError(SyncAbort::Tasks {
            failed,
            planned,
            first_error,
        }) => {
            assert_eq!((failed, planned), (1, 1));
            assert!(first_error.contains("after 3 attempt(s)"), "{first_error}");
            assert!(first_error.contains("digest mismatch"), "{first_error}");
        }
        other => panic!("expected task abort, got {other:?}"),
    }
    assert_eq!(server.hits(&file_url("a.jar")), 3);
    assert_eq!(count(&sink, |e| matches!(e, SyncEvent::Start { .. })), 3);
    assert!(sink.contains(&SyncEvent::Error {
        filename: Some("a.jar".to_string()),
        message: format!(
            "download failed after 3 attempt(s): digest mismatch for a.jar: expected {}, got {}",
            packsync_sync::hash::digest_bytes(b"expected bytes"),
            packsync_sync::hash::digest_bytes(b"something else"),
        ),
    }));
    assert!(!sink.contains(&SyncEvent::AllDone));
    assert!(!dir.path().join("a.jar").exists());
    assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 0);
    assert_eq!(control.restarts(), 0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn always_failing_task_is_attempted_exactly_retries_plus_one_times() {
    for retries in [0_u32, 1, 3] {
        let dir = TempDir::new().expect("target dir");
        let server = FakeServer::new();
        server.publish(&[("a.jar", b"x")]);
        server.route(file_url("a.jar"), Route::Timeout);
        let mut sink: Vec<SyncEvent> = Vec::new();

        let result = orchestrator(&server, &dir, retries, 4)
            .synchronize(&mut sink, &RecordingControl::default());

        assert_eq!(result.phase(), SyncPhase::AbortedOnError);
        assert_eq!(server.hits(&file_url("a.jar")), retries as usize + 1);
    }
}

#[test]
fn failed_task_does_not_stop_siblings() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"a"), ("b.jar", b"b"), ("c.jar", b"c"), ("d.jar", b"d")]);
    server.route(file_url("b.jar"), Route::Network);
    let control = RecordingControl::default();
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 1, 2).synchronize(&mut sink, &control);

    match result {
        SyncResult::AbortedOnError(SyncAbort::Tasks {
            failed,
            planned,
            first_error,
        }) => {
            assert_eq!((failed, planned), (1, 4));
            assert!(first_error.starts_with("b.jar"), "{first_error}");
        }
        other => panic!("expected task abort, got {other:?}"),
    }
    for name in ["a.jar", "c.jar", "d.jar"] {
        assert!(dir.path().join(name).exists(), "{name} should be downloaded");
    }
    assert_eq!(count(&sink, |e| matches!(e, SyncEvent::Complete { .. })), 3);
    // The final abort summary is the last thing the sink hears.
    assert!(matches!(sink.last(), Some(SyncEvent::Error { filename: None, .. })));
    assert_eq!(control.restarts(), 0);
}

#[test]
fn manifest_and_downloads_use_their_own_timeouts() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"a"), ("b.jar", b"b")]);
    let mut cfg = config(0, 2);
    cfg.providers.api.connect_timeout_secs = 3;
    cfg.providers.api.read_timeout_secs = 7;
    cfg.download.connect_timeout_secs = 11;
    cfg.download.read_timeout_secs = 90;

    let result = SyncOrchestrator::new(cfg.clone(), &server)
        .with_target_dir(dir.path())
        .with_countdown(instant_countdown())
        .synchronize(&mut Vec::<SyncEvent>::new(), &RecordingControl::default());

    assert_eq!(result.phase(), SyncPhase::AllSucceeded);
    assert_eq!(
        server.timeouts_for(&manifest_url()),
        Some(cfg.manifest_timeouts())
    );
    for name in ["a.jar", "b.jar"] {
        assert_eq!(
            server.timeouts_for(&file_url(name)),
            Some(cfg.download_timeouts()),
            "{name}"
        );
    }
    assert_ne!(cfg.manifest_timeouts(), cfg.download_timeouts());
}

#[test]
fn up_to_date_directory_is_a_no_op() {
    let dir = TempDir::new().expect("target dir");
    fs::write(dir.path().join("a.jar"), b"same").expect("seed");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"same")]);
    let control = RecordingControl::default();
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 3, 2).synchronize(&mut sink, &control);

    assert_eq!(result, SyncResult::UpToDate);
    assert_eq!(sink, vec![SyncEvent::UpToDate]);
    assert_eq!(server.hits(&file_url("a.jar")), 0);
    assert_eq!(control.restarts(), 0);
}

#[test]
fn successful_sync_converges() {
    let dir = TempDir::new().expect("target dir");
    fs::write(dir.path().join("stale.jar"), b"old").expect("seed");
    let files: &[(&str, &[u8])] = &[("new.jar", b"fresh"), ("stale.jar", b"updated")];
    let server = FakeServer::new();
    server.publish(files);

    let client = ManifestClient::new(&server, config(0, 1).manifest_timeouts());
    let manifest = client
        .fetch_manifest(common::API, common::VERSION)
        .expect("manifest");
    let before = DiffEngine::new().plan(dir.path(), &manifest);
    assert_eq!(before.filenames().collect::<Vec<_>>(), ["new.jar", "stale.jar"]);

    let result = orchestrator(&server, &dir, 0, 2)
        .synchronize(&mut Vec::<SyncEvent>::new(), &RecordingControl::default());
    assert!(result.is_success());

    let after = DiffEngine::new().plan(dir.path(), &manifest);
    assert!(after.is_empty(), "plan after sync: {after:?}");
    for entry in &manifest {
        assert!(HashVerifier
            .matches(&dir.path().join(&entry.filename), &entry.digest)
            .expect("hash"));
    }
}

#[test]
fn duplicate_manifest_entries_are_each_fetched() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"one"), ("a.jar", b"one")]);
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 0, 2)
        .synchronize(&mut sink, &RecordingControl::default());

    assert_eq!(
        result,
        SyncResult::AllSucceeded {
            downloaded: 2,
            restart_scheduled: true
        }
    );
    assert_eq!(sink.first(), Some(&SyncEvent::Total { count: 2 }));
    assert_eq!(server.hits(&file_url("a.jar")), 2);
    assert_eq!(fs::read(dir.path().join("a.jar")).expect("file"), b"one");
    assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 1);
}

#[test]
fn many_tasks_on_many_workers_finish_exactly_once() {
    let dir = TempDir::new().expect("target dir");
    let names: Vec<String> = (0..40).map(|i| format!("mod-{i}.jar")).collect();
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), n.as_bytes())).collect();
    let server = FakeServer::new();
    server.publish(&files);
    let control = RecordingControl::default();
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 0, 8).synchronize(&mut sink, &control);

    assert_eq!(
        result,
        SyncResult::AllSucceeded {
            downloaded: 40,
            restart_scheduled: true
        }
    );
    assert_eq!(control.restarts(), 1);
    assert_eq!(count(&sink, |e| *e == SyncEvent::AllDone), 1);
    assert_eq!(count(&sink, |e| matches!(e, SyncEvent::Complete { .. })), 40);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Sink and control writing to one shared log, to check relative order.
struct SharedLog(Arc<Mutex<Vec<String>>>);

impl ProgressSink for SharedLog {
    fn on_start(&mut self, _: &str) {}
    fn on_progress(&mut self, _: &str, _: u64, _: Option<u64>) {}
    fn on_total(&mut self, count: usize) {
        self.0.lock().unwrap().push(format!("total {count}"));
    }
    fn on_complete(&mut self, filename: &str) {
        self.0.lock().unwrap().push(format!("complete {filename}"));
    }
    fn on_error(&mut self, _: Option<&str>, message: &str) {
        self.0.lock().unwrap().push(format!("error {message}"));
    }
    fn on_all_done(&mut self) {
        self.0.lock().unwrap().push("all done".to_string());
    }
    fn on_countdown_tick(&mut self, seconds_left: u32) {
        self.0.lock().unwrap().push(format!("tick {seconds_left}"));
    }
}

impl RuntimeControl for SharedLog {
    fn schedule_restart(&self) {
        self.0.lock().unwrap().push("restart".to_string());
    }
}

#[test]
fn restart_follows_every_countdown_tick() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"a")]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut sink = SharedLog(log.clone());
    let control = SharedLog(log.clone());

    orchestrator(&server, &dir, 0, 1).synchronize(&mut sink, &control);

    assert_eq!(
        *log.lock().unwrap(),
        ["total 1", "complete a.jar", "all done", "tick 3", "tick 2", "tick 1", "restart"]
    );
}

#[test]
fn cancelled_session_downloads_nothing_and_never_restarts() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"a"), ("b.jar", b"b")]);
    let cancel = CancelToken::new();
    cancel.cancel();
    let control = RecordingControl::default();
    let mut sink: Vec<SyncEvent> = Vec::new();

    let result = orchestrator(&server, &dir, 5, 2)
        .with_cancel(cancel)
        .synchronize(&mut sink, &control);

    match result {
        SyncResult::AbortedOnError(SyncAbort::Tasks {
            failed,
            planned,
            first_error,
        }) => {
            assert_eq!((failed, planned), (2, 2));
            assert!(first_error.contains("cancelled"), "{first_error}");
        }
        other => panic!("expected task abort, got {other:?}"),
    }
    assert_eq!(server.hits(&file_url("a.jar")), 0);
    assert_eq!(server.hits(&file_url("b.jar")), 0);
    assert_eq!(control.restarts(), 0);
}

#[test]
fn unreadable_local_file_is_skipped_and_reported() {
    let dir = TempDir::new().expect("target dir");
    // A directory where a file is expected cannot be hashed.
    fs::create_dir(dir.path().join("a.jar")).expect("seed dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"a")]);
    let mut sink: Vec<SyncEvent> = Vec::new();

    let report = orchestrator(&server, &dir, 0, 1)
        .synchronize_with_report(&mut sink, &RecordingControl::default());

    assert_eq!(report.result, SyncResult::UpToDate);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].filename, "a.jar");
    assert_eq!(server.hits(&file_url("a.jar")), 0);
}

#[test]
fn report_summarises_the_session() {
    let dir = TempDir::new().expect("target dir");
    let server = FakeServer::new();
    server.publish(&[("a.jar", b"a"), ("b.jar", b"b")]);

    let report = orchestrator(&server, &dir, 0, 2)
        .synchronize_with_report(&mut Vec::<SyncEvent>::new(), &RecordingControl::default());

    assert_eq!(report.phase, SyncPhase::AllSucceeded);
    assert_eq!((report.planned, report.downloaded, report.failed), (2, 2, 0));
    assert!(report.restart_scheduled);
    assert!(report.error.is_none());
    assert!(report.finished_at >= report.started_at);

    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["phase"], "all_succeeded");
    assert_eq!(json["downloaded"], 2);
}

#[test]
fn uppercase_manifest_digest_matches_local_file() {
    let dir = TempDir::new().expect("target dir");
    fs::write(dir.path().join("a.jar"), b"same").expect("seed");
    let upper = packsync_sync::hash::digest_bytes(b"same")
        .as_str()
        .to_uppercase();
    let server = FakeServer::new();
    server.route(
        manifest_url(),
        Route::Ok(
            format!(r#"[{{"filename":"a.jar","digest":"{upper}","size":4}}]"#).into_bytes(),
        ),
    );

    let result = orchestrator(&server, &dir, 0, 1)
        .synchronize(&mut Vec::<SyncEvent>::new(), &RecordingControl::default());

    assert_eq!(result, SyncResult::UpToDate);
    assert_eq!(
        Digest::from(upper.as_str()),
        packsync_sync::hash::digest_bytes(b"same")
    );
}
