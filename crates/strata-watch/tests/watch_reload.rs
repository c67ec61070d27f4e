//! Live reload end-to-end: debounced file changes, failure recovery, stop
//! semantics and out-of-band polling.

use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;
use strata_core::{Described, Loader, LoaderOptions, SchemaBuilder};
use strata_watch::{ConfigWatcher, WatchEvent, WatchOptions};
use tokio::time::timeout;

#[derive(Debug, Clone, Default, PartialEq)]
struct ServiceConfig {
    name: String,
    port: u16,
}

impl Described for ServiceConfig {
    fn describe(s: &mut SchemaBuilder<Self>) {
        s.scalar("name", |c: &Self| &c.name, |c: &mut Self| &mut c.name)
            .default("svc");
        s.scalar("port", |c: &Self| &c.port, |c: &mut Self| &mut c.port)
            .default("8080");
    }
}

fn loader_for(file: PathBuf) -> Loader {
    strata_core::logging::init();
    Loader::new(LoaderOptions {
        file: Some(file),
        file_required: true,
        ..LoaderOptions::default()
    })
    .unwrap()
}

fn options(debounce: Duration) -> WatchOptions {
    WatchOptions {
        debounce,
        poll: None,
    }
}

const EVENT_WAIT: Duration = Duration::from_secs(10);

async fn next(watcher: &mut ConfigWatcher<ServiceConfig>) -> WatchEvent<ServiceConfig> {
    timeout(EVENT_WAIT, watcher.next_event())
        .await
        .expect("timed out waiting for a reload event")
        .expect("event stream closed unexpectedly")
}

#[tokio::test]
async fn initial_resolution_precedes_watching() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("service.toml");
    std::fs::write(&file, "name = \"alpha\"\nport = 9000\n").unwrap();

    let mut watcher: ConfigWatcher<ServiceConfig> =
        ConfigWatcher::spawn(loader_for(file), options(Duration::from_millis(50)))
            .await
            .unwrap();

    let snapshot = watcher.current();
    assert_eq!(snapshot.version, 1);
    assert_eq!(
        snapshot.value,
        ServiceConfig {
            name: "alpha".to_string(),
            port: 9000,
        }
    );

    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn initial_failure_is_fatal_to_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConfigWatcher::<ServiceConfig>::spawn(
        loader_for(dir.path().join("absent.toml")),
        options(Duration::from_millis(50)),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn a_file_change_publishes_a_new_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("service.toml");
    std::fs::write(&file, "name = \"alpha\"\nport = 9000\n").unwrap();

    let mut watcher: ConfigWatcher<ServiceConfig> =
        ConfigWatcher::spawn(loader_for(file.clone()), options(Duration::from_millis(50)))
            .await
            .unwrap();

    std::fs::write(&file, "name = \"beta\"\nport = 9100\n").unwrap();

    match next(&mut watcher).await {
        WatchEvent::Updated(snapshot) => {
            assert_eq!(snapshot.version, 2);
            assert_eq!(snapshot.value.name, "beta");
            assert_eq!(snapshot.value.port, 9100);
        }
        WatchEvent::Failed(error) => panic!("unexpected reload failure: {error}"),
    }
    assert_eq!(watcher.current().version, 2);

    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn a_burst_of_writes_triggers_exactly_one_reload() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("service.toml");
    std::fs::write(&file, "name = \"alpha\"\nport = 9000\n").unwrap();

    let mut watcher: ConfigWatcher<ServiceConfig> =
        ConfigWatcher::spawn(loader_for(file.clone()), options(Duration::from_millis(200)))
            .await
            .unwrap();

    for port in 9101..=9105 {
        std::fs::write(&file, format!("name = \"alpha\"\nport = {port}\n")).unwrap();
    }

    match next(&mut watcher).await {
        WatchEvent::Updated(snapshot) => {
            assert_eq!(snapshot.version, 2);
            // The one re-resolution reads the final contents.
            assert_eq!(snapshot.value.port, 9105);
        }
        WatchEvent::Failed(error) => panic!("unexpected reload failure: {error}"),
    }

    // No second reload follows once the burst has settled.
    let quiet = timeout(Duration::from_millis(600), watcher.next_event()).await;
    assert!(quiet.is_err(), "burst produced more than one reload");

    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn a_failed_reload_keeps_the_last_good_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("service.toml");
    std::fs::write(&file, "name = \"alpha\"\nport = 9000\n").unwrap();

    let mut watcher: ConfigWatcher<ServiceConfig> =
        ConfigWatcher::spawn(loader_for(file.clone()), options(Duration::from_millis(50)))
            .await
            .unwrap();

    std::fs::write(&file, "port = [\n").unwrap();

    match next(&mut watcher).await {
        WatchEvent::Failed(_) => {}
        WatchEvent::Updated(snapshot) => {
            panic!("malformed file published snapshot {:?}", snapshot)
        }
    }
    let current = watcher.current();
    assert_eq!(current.version, 1);
    assert_eq!(current.value.name, "alpha");

    // The loop keeps running and recovers once the file is fixed.
    std::fs::write(&file, "name = \"gamma\"\nport = 9200\n").unwrap();
    match next(&mut watcher).await {
        WatchEvent::Updated(snapshot) => {
            assert_eq!(snapshot.version, 2);
            assert_eq!(snapshot.value.name, "gamma");
        }
        WatchEvent::Failed(error) => panic!("unexpected reload failure: {error}"),
    }

    watcher.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_and_final() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("service.toml");
    std::fs::write(&file, "name = \"alpha\"\nport = 9000\n").unwrap();

    let mut watcher: ConfigWatcher<ServiceConfig> =
        ConfigWatcher::spawn(loader_for(file.clone()), options(Duration::from_millis(50)))
            .await
            .unwrap();
    let handle = watcher.handle();

    watcher.stop().await.unwrap();
    watcher.stop().await.unwrap();

    // A change after stop never publishes.
    std::fs::write(&file, "name = \"omega\"\nport = 9999\n").unwrap();
    assert!(watcher.next_event().await.is_none());
    assert_eq!(handle.snapshot().version, 1);
    assert_eq!(handle.snapshot().value.name, "alpha");
}

#[derive(Debug, Clone, Default)]
struct TokenConfig {
    endpoint: String,
    token: String,
}

impl Described for TokenConfig {
    fn describe(s: &mut SchemaBuilder<Self>) {
        s.scalar(
            "endpoint",
            |c: &Self| &c.endpoint,
            |c: &mut Self| &mut c.endpoint,
        )
        .default("https://example.test");
        s.scalar("token", |c: &Self| &c.token, |c: &mut Self| &mut c.token)
            .dsn("${ref:file:///tmp/strata-watch-poll-secret.txt}");
    }
}

#[tokio::test]
#[serial]
async fn polling_picks_up_changes_with_no_file_event() {
    // The secret lives outside any watched path, so only the poll interval
    // can observe it changing.
    let secret = PathBuf::from("/tmp/strata-watch-poll-secret.txt");
    std::fs::write(&secret, "first\n").unwrap();

    let loader = Loader::new(LoaderOptions::default()).unwrap();
    let mut watcher: ConfigWatcher<TokenConfig> = ConfigWatcher::spawn(
        loader,
        WatchOptions {
            debounce: Duration::from_millis(50),
            poll: Some(Duration::from_millis(100)),
        },
    )
    .await
    .unwrap();
    assert_eq!(watcher.current().value.token, "first");

    std::fs::write(&secret, "second\n").unwrap();

    let deadline = tokio::time::Instant::now() + EVENT_WAIT;
    loop {
        let event = tokio::time::timeout_at(deadline, watcher.next_event())
            .await
            .expect("timed out waiting for the poll to observe the change")
            .expect("event stream closed unexpectedly");
        match event {
            WatchEvent::Updated(snapshot) if snapshot.value.token == "second" => break,
            WatchEvent::Updated(_) => continue,
            WatchEvent::Failed(error) => panic!("unexpected reload failure: {error}"),
        }
    }

    watcher.stop().await.unwrap();
}
