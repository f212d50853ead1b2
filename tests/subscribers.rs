mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use depvisor::{Engine, EngineConfig, Event, EventKind, LogWriter, ManifoldState, Subscribe};

use common::*;

#[derive(Default)]
struct Recorder(Mutex<Vec<(EventKind, Option<String>)>>);

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        let name = ev.manifold.as_ref().map(|m| m.to_string());
        self.0.lock().expect("lock").push((ev.kind, name));
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

impl Recorder {
    fn saw(&self, kind: EventKind, manifold: &str) -> bool {
        self.0
            .lock()
            .expect("lock")
            .iter()
            .any(|(k, m)| *k == kind && m.as_deref() == Some(manifold))
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_receive_bounces_and_exits() {
    init_tracing();
    let recorder = Arc::new(Recorder::default());
    let subs: Vec<Arc<dyn Subscribe>> = vec![recorder.clone(), Arc::new(LogWriter::new())];
    let engine = Engine::builder(EngineConfig::default())
        .with_subscribers(subs)
        .build();
    assert_eq!(engine.subscriber_count(), 2);

    let journal = Journal::default();
    let exit_a = Arc::new(tokio::sync::Notify::new());
    engine
        .install("a", triggered("a", &journal, exit_a.clone(), Ok(())))
        .await
        .expect("a");
    until_state(&engine, "a", ManifoldState::Running).await;
    engine
        .install("b", consumer("b", &["a"], &journal))
        .await
        .expect("b");
    until_state(&engine, "b", ManifoldState::Running).await;

    exit_a.notify_one();
    settle(Duration::from_secs(5)).await;
    engine.kill();
    assert_eq!(engine.wait().await, Ok(()));
    settle(Duration::from_millis(50)).await;

    assert!(recorder.saw(EventKind::ManifoldInstalled, "a"));
    assert!(recorder.saw(EventKind::ManifoldStarted, "b"));
    assert!(recorder.saw(EventKind::ManifoldExited, "a"));
    assert!(recorder.saw(EventKind::ManifoldBounced, "b"));
    assert!(recorder.saw(EventKind::UnmetDependencies, "b"));
}
