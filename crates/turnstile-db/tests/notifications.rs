// Notifications: lifecycle events, failures with no completion to receive
// them, and the hook relays switched on through `configure`.

use std::sync::mpsc as gate;
use std::time::Duration;

use tokio::sync::broadcast;
use turnstile_core::{ChangeKind, DatabaseConfig, LimitConfig};
use turnstile_db::{ConfigureOption, Database, DatabaseError, Event, OpenFlags, Request};

/// Next event matching `pick`, skipping the rest. Fails after two seconds.
async fn next_matching<T>(
    events: &mut broadcast::Receiver<Event>,
    mut pick: impl FnMut(Event) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event stream ended"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_subscriber_sees_open_and_close() {
    let db = Database::open(":memory:", OpenFlags::default(), None);
    let mut events = db.subscribe();

    assert!(matches!(events.recv().await.unwrap(), Event::Open));
    db.close().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), Event::Close));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_without_a_completion_become_error_events() {
    let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();
    let mut events = db.subscribe();

    db.post(Request::Exec { sql: "SELEKT nothing".to_string() });
    let err = next_matching(&mut events, |event| match event {
        Event::Error { error } => Some(error),
        _ => None,
    })
    .await;
    assert_eq!(err.code(), "SQLITE_ERROR");
    assert!(err.to_string().contains("syntax error"), "got {err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_open_without_a_completion_is_reported() {
    let db = Database::open("/nonexistent/turnstile/db.sqlite", OpenFlags::SQLITE_OPEN_READ_ONLY, None);
    let mut events = db.subscribe();

    let err = next_matching(&mut events, |event| match event {
        Event::Error { error } => Some(error),
        _ => None,
    })
    .await;
    assert_eq!(err.code(), "SQLITE_CANTOPEN");
    assert!(!db.is_open());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn posting_to_a_closed_connection_is_reported() {
    let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();
    db.close().await.unwrap();

    let mut events = db.subscribe();
    db.post(Request::Wait);
    let err = next_matching(&mut events, |event| match event {
        Event::Error { error } => Some(error),
        _ => None,
    })
    .await;
    assert_eq!(err, DatabaseError::closed());
}

/// Nothing more reaches `events` as an error once the connection task has
/// answered a status request.
async fn assert_no_more_errors(db: &Database, events: &mut broadcast::Receiver<Event>) {
    db.status().await.unwrap();
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, Event::Error { .. }), "unexpected {event:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calls_flushed_without_completions_are_reported_once() {
    let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();
    let mut events = db.subscribe();

    let (release, hold) = gate::channel::<()>();
    let held = db.run(true, move |_| {
        let _ = hold.recv();
        Ok(())
    });
    db.post(Request::Close);
    db.post(Request::Exec { sql: "CREATE TABLE never (x)".to_string() });
    db.post(Request::Wait);
    assert_eq!(db.status().await.unwrap().queued, 3);

    release.send(()).unwrap();
    held.await.unwrap();
    next_matching(&mut events, |event| matches!(event, Event::Close).then_some(())).await;
    let err = next_matching(&mut events, |event| match event {
        Event::Error { error } => Some(error),
        _ => None,
    })
    .await;
    assert_eq!(err, DatabaseError::handle_closed());
    assert_no_more_errors(&db, &mut events).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn flushed_batch_with_a_completion_raises_no_event() {
    let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();
    let mut events = db.subscribe();

    let (release, hold) = gate::channel::<()>();
    let held = db.run(true, move |_| {
        let _ = hold.recv();
        Ok(())
    });
    db.post(Request::Close);
    let waited = db.wait();
    db.post(Request::Exec { sql: "CREATE TABLE never (x)".to_string() });
    assert_eq!(db.status().await.unwrap().queued, 3);

    release.send(()).unwrap();
    held.await.unwrap();
    assert_eq!(waited.await.unwrap_err(), DatabaseError::handle_closed());
    next_matching(&mut events, |event| matches!(event, Event::Close).then_some(())).await;
    assert_no_more_errors(&db, &mut events).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn change_hook_reports_each_row_change() {
    let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();
    let mut events = db.subscribe();

    db.configure(ConfigureOption::Change).await.unwrap();
    db.exec(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);
         INSERT INTO t (v) VALUES ('a');
         UPDATE t SET v = 'b' WHERE id = 1;
         DELETE FROM t WHERE id = 1;",
    )
    .await
    .unwrap();

    let mut kinds = Vec::new();
    while kinds.len() < 3 {
        let change = next_matching(&mut events, |event| match event {
            Event::Change(change) => Some(change),
            _ => None,
        })
        .await;
        assert_eq!(change.table, "t");
        assert_eq!(change.rowid, 1);
        kinds.push(change.kind);
    }
    assert_eq!(kinds, vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);

    // Closing with the hook still on detaches it cleanly.
    db.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trace_and_profile_report_statements() {
    let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();
    let mut events = db.subscribe();

    db.configure(ConfigureOption::Trace).await.unwrap();
    db.configure(ConfigureOption::Profile).await.unwrap();
    db.exec("CREATE TABLE traced (x)").await.unwrap();

    let traced = next_matching(&mut events, |event| match event {
        Event::Trace(trace) if trace.sql.starts_with("CREATE TABLE traced") => Some(trace),
        _ => None,
    })
    .await;
    assert!(traced.sql.contains("traced"));

    let profiled = next_matching(&mut events, |event| match event {
        Event::Profile(profile) if profile.sql.starts_with("CREATE TABLE traced") => Some(profile),
        _ => None,
    })
    .await;
    assert!(profiled.elapsed_ms() >= 0.0);

    // Toggling again switches tracing off.
    db.configure(ConfigureOption::Trace).await.unwrap();
    db.exec("CREATE TABLE untraced (x)").await.unwrap();
    db.wait().await.unwrap();
    while let Ok(event) = events.try_recv() {
        if let Event::Trace(trace) = event {
            assert!(!trace.sql.contains("untraced"), "trace still on: {}", trace.sql);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn configure_rejects_an_unknown_limit() {
    let db = Database::connect(":memory:", OpenFlags::default()).await.unwrap();

    db.configure(ConfigureOption::BusyTimeout(10)).await.unwrap();
    let err = db.configure(ConfigureOption::Limit { id: 99, value: 1 }).await.unwrap_err();
    assert_eq!(err.code(), "INVALID_ARGUMENT");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn config_applies_limits_and_mode_after_open() {
    let config = DatabaseConfig {
        serialize: true,
        limits: vec![LimitConfig { id: 1, value: 64 }],
        busy_timeout_ms: 50,
        ..DatabaseConfig::default()
    };
    let db = Database::open_with_config(&config, None).unwrap();
    assert_eq!(db.filename(), ":memory:");

    db.exec("CREATE TABLE t (x)").await.unwrap();
    assert!(db.status().await.unwrap().serialize);

    // SQLITE_LIMIT_SQL_LENGTH = 1
    let long = format!("INSERT INTO t VALUES ('{}')", "x".repeat(100));
    let err = db.exec(long).await.unwrap_err();
    assert_eq!(err.code(), "SQLITE_TOOBIG");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn config_with_an_unknown_limit_fails_up_front() {
    let config = DatabaseConfig {
        limits: vec![LimitConfig { id: 42, value: 1 }],
        ..DatabaseConfig::default()
    };
    let err = Database::open_with_config(&config, None).unwrap_err();
    assert!(matches!(err, DatabaseError::InvalidArgument { .. }));
}
