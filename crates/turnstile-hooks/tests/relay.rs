// Relays must deliver every event sent before `finish` and nothing after it.
// All engine-side work runs inside spawn_blocking, as it does in production.

use rusqlite::Connection;
use tokio::sync::mpsc;
use turnstile_core::{ChangeEvent, ChangeKind, ProfileEvent, TraceEvent};
use turnstile_hooks::{HookKind, HookSet, Relay};

#[derive(Debug)]
enum Msg {
    Trace(TraceEvent),
    Profile(ProfileEvent),
    Change(ChangeEvent),
}

impl From<TraceEvent> for Msg {
    fn from(ev: TraceEvent) -> Self {
        Msg::Trace(ev)
    }
}

impl From<ProfileEvent> for Msg {
    fn from(ev: ProfileEvent) -> Self {
        Msg::Profile(ev)
    }
}

impl From<ChangeEvent> for Msg {
    fn from(ev: ChangeEvent) -> Self {
        Msg::Change(ev)
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Msg>) -> Vec<Msg> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn finish_drains_in_order_and_seals_the_relay() {
    let (outlet, mut inbox) = mpsc::unbounded_channel::<Msg>();

    let late_accepted = tokio::task::spawn_blocking(move || {
        let relay: Relay<TraceEvent> = Relay::spawn(outlet);
        let producer = relay.producer();
        for i in 0..50 {
            assert!(producer.send(TraceEvent { sql: format!("SELECT {i}") }));
        }
        relay.finish();
        producer.send(TraceEvent { sql: "too late".to_string() })
    })
    .await
    .unwrap();

    assert!(!late_accepted, "send after finish must be refused");

    let got = drain(&mut inbox);
    assert_eq!(got.len(), 50, "finish returned before the pump drained");
    for (i, msg) in got.iter().enumerate() {
        match msg {
            Msg::Trace(ev) => assert_eq!(ev.sql, format!("SELECT {i}")),
            other => panic!("unexpected {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn change_hook_reports_row_changes_until_toggled_off() {
    let (outlet, mut inbox) = mpsc::unbounded_channel::<Msg>();

    tokio::task::spawn_blocking(move || {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut hooks = HookSet::new(outlet);

        assert!(hooks.toggle(HookKind::Change, &mut conn));
        {
            let _scope = hooks.enter();
            conn.execute_batch(
                "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);
                 INSERT INTO t (v) VALUES ('a');
                 UPDATE t SET v = 'b' WHERE id = 1;
                 DELETE FROM t WHERE id = 1;",
            )
            .unwrap();
        }
        assert!(!hooks.toggle(HookKind::Change, &mut conn));
        assert!(!hooks.is_active(HookKind::Change));

        // Unhooked: this one must not show up.
        conn.execute_batch("INSERT INTO t (v) VALUES ('c');").unwrap();
    })
    .await
    .unwrap();

    let kinds: Vec<ChangeKind> = drain(&mut inbox)
        .into_iter()
        .map(|msg| match msg {
            Msg::Change(ev) => {
                assert_eq!(ev.database, "main");
                assert_eq!(ev.table, "t");
                assert_eq!(ev.rowid, 1);
                ev.kind
            }
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(kinds, vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trace_and_profile_reach_the_relay_through_the_sink_scope() {
    let (outlet, mut inbox) = mpsc::unbounded_channel::<Msg>();

    tokio::task::spawn_blocking(move || {
        let mut conn = Connection::open_in_memory().unwrap();
        let mut hooks = HookSet::new(outlet);
        hooks.toggle(HookKind::Trace, &mut conn);
        hooks.toggle(HookKind::Profile, &mut conn);

        // Outside a scope nothing is routed.
        conn.execute_batch("CREATE TABLE before_scope (x);").unwrap();

        {
            let _scope = hooks.enter();
            conn.execute_batch("CREATE TABLE in_scope (x);").unwrap();
        }
        hooks.finish_all(&mut conn);
        assert!(!hooks.is_active(HookKind::Trace));
        assert!(!hooks.is_active(HookKind::Profile));
    })
    .await
    .unwrap();

    let got = drain(&mut inbox);
    let traced: Vec<&str> = got
        .iter()
        .filter_map(|m| match m {
            Msg::Trace(ev) => Some(ev.sql.as_str()),
            _ => None,
        })
        .collect();
    assert!(traced.iter().any(|sql| sql.starts_with("CREATE TABLE in_scope")), "got {traced:?}");
    assert!(traced.iter().all(|sql| !sql.contains("before_scope")));
    assert!(got
        .iter()
        .any(|m| matches!(m, Msg::Profile(ev) if ev.sql.starts_with("CREATE TABLE in_scope"))));
}
