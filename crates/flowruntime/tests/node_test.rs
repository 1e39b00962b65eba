// crates/flowruntime/tests/node_test.rs

mod common;

use async_trait::async_trait;
use common::*;
use flowcore::{task_fn, ExecutionEvent, NodeError, Record, ScriptExecutor, Value};
use flowruntime::{ExecutionManager, Node};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;

fn sink(manager: &ExecutionManager) -> (Arc<Node>, mpsc::UnboundedReceiver<Record>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let node = manager
        .create_node(TestPlugin::standard(vec![recorder(tx)]).into_arc(), None, "")
        .unwrap();
    (node, rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_activations_are_serialized() {
    let manager = ExecutionManager::new(test_context());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    let task = {
        let (in_flight, max_in_flight, runs) = (in_flight.clone(), max_in_flight.clone(), runs.clone());
        task_fn(move |_ctx, input| {
            let (in_flight, max_in_flight, runs) = (in_flight.clone(), max_in_flight.clone(), runs.clone());
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(input)
            }
        })
    };

    let node = manager
        .create_node(TestPlugin::standard(vec![task]).into_arc(), None, "")
        .unwrap();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let node = node.clone();
            tokio::spawn(async move { node.execute(Record::new()).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(runs.load(Ordering::SeqCst), 5);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1, "task sequences overlapped");
}

#[tokio::test]
async fn test_prepare_runs_exactly_once() {
    let manager = ExecutionManager::new(test_context());
    let plugin = TestPlugin::standard(vec![emit(Record::new())]);
    let prepare_calls = plugin.prepare_calls.clone();
    let node = manager.create_node(plugin.into_arc(), None, "").unwrap();

    assert!(!node.is_initialized());
    for _ in 0..10 {
        node.execute(Record::new()).await;
    }

    assert_eq!(prepare_calls.load(Ordering::SeqCst), 1);
    assert!(node.is_initialized());
}

#[tokio::test]
async fn test_failed_prepare_is_retried_on_next_activation() {
    let manager = ExecutionManager::new(test_context());
    let runs = Arc::new(AtomicUsize::new(0));
    let plugin = TestPlugin::standard(vec![counter(runs.clone())]).failing_prepares(1);
    let prepare_calls = plugin.prepare_calls.clone();
    let node = manager.create_node(plugin.into_arc(), None, "").unwrap();

    node.execute(Record::new()).await;
    assert!(!node.is_initialized());
    assert_eq!(runs.load(Ordering::SeqCst), 0, "tasks must not run unprepared");

    node.execute(Record::new()).await;
    assert!(node.is_initialized());
    assert_eq!(prepare_calls.load(Ordering::SeqCst), 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_task_does_not_stop_siblings() {
    let manager = ExecutionManager::new(test_context());
    let source = manager
        .create_node(
            TestPlugin::standard(vec![
                emit(record("port", 0i64)),
                failing("boom"),
                emit(record("port", 2i64)),
            ])
            .into_arc(),
            None,
            "",
        )
        .unwrap();

    let (first, mut rx0) = sink(&manager);
    let (second, mut rx1) = sink(&manager);
    let (third, mut rx2) = sink(&manager);
    manager.connect(source.id(), 0, first.id()).unwrap();
    manager.connect(source.id(), 1, second.id()).unwrap();
    manager.connect(source.id(), 2, third.id()).unwrap();

    source.execute(Record::new()).await;

    assert_eq!(recv(&mut rx0).await, Some(record("port", 0i64)));
    assert_eq!(recv(&mut rx2).await, Some(record("port", 2i64)));
    assert!(stays_silent(&mut rx1).await, "failed task must not emit");
}

#[tokio::test]
async fn test_panicking_task_is_contained() {
    let manager = ExecutionManager::new(test_context());
    let panicking = task_fn(|_ctx, _input| async move {
        if true {
            panic!("task exploded");
        }
        Ok(Record::new())
    });
    let source = manager
        .create_node(
            TestPlugin::standard(vec![panicking, emit(record("ok", true))]).into_arc(),
            None,
            "",
        )
        .unwrap();
    let (target, mut rx) = sink(&manager);
    manager.connect(source.id(), 1, target.id()).unwrap();

    let mut events = manager.subscribe_events();
    source.execute(Record::new()).await;
    assert_eq!(recv(&mut rx).await, Some(record("ok", true)));

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::TaskFailed { task_index, error, .. } = event {
            assert_eq!(task_index, 0);
            assert!(error.contains("task exploded"));
            saw_failure = true;
        }
    }
    assert!(saw_failure);

    // Guard was released: a second activation goes through
    timeout(Duration::from_secs(1), source.execute(Record::new()))
        .await
        .expect("node stayed locked after a panic");
    assert_eq!(recv(&mut rx).await, Some(record("ok", true)));
}

#[tokio::test]
async fn test_results_only_reach_their_own_port() {
    let manager = ExecutionManager::new(test_context());
    let source = manager
        .create_node(
            TestPlugin::standard(vec![emit(record("port", 0i64)), emit(record("port", 1i64))])
                .into_arc(),
            None,
            "",
        )
        .unwrap();

    let (left_a, mut rx_a) = sink(&manager);
    let (left_b, mut rx_b) = sink(&manager);
    let (right, mut rx_right) = sink(&manager);
    manager.connect(source.id(), 0, left_a.id()).unwrap();
    manager.connect(source.id(), 0, left_b.id()).unwrap();
    manager.connect(source.id(), 1, right.id()).unwrap();

    source.execute(Record::new()).await;

    assert_eq!(recv(&mut rx_a).await, Some(record("port", 0i64)));
    assert_eq!(recv(&mut rx_b).await, Some(record("port", 0i64)));
    assert_eq!(recv(&mut rx_right).await, Some(record("port", 1i64)));
    assert!(stays_silent(&mut rx_a).await);
    assert!(stays_silent(&mut rx_b).await);
    assert!(stays_silent(&mut rx_right).await);
}

#[tokio::test]
async fn test_disabled_node_skips_work_and_propagation() {
    let manager = ExecutionManager::new(test_context());
    let runs = Arc::new(AtomicUsize::new(0));
    let source = manager
        .create_node(
            TestPlugin::standard(vec![counter(runs.clone())]).into_arc(),
            None,
            "",
        )
        .unwrap();
    let (target, mut rx) = sink(&manager);
    manager.connect(source.id(), 0, target.id()).unwrap();

    source.set_enabled(false);
    source.execute(Record::new()).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(stays_silent(&mut rx).await);

    source.set_enabled(true);
    source.execute(Record::new()).await;
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(recv(&mut rx).await, Some(Record::new()));
}

#[tokio::test]
async fn test_downstream_dispatch_does_not_wait() {
    let manager = ExecutionManager::new(test_context());
    let gate = Arc::new(Notify::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let gated = {
        let gate = gate.clone();
        task_fn(move |_ctx, input: Record| {
            let (gate, tx) = (gate.clone(), tx.clone());
            async move {
                gate.notified().await;
                let _ = tx.send(input.clone());
                Ok(input)
            }
        })
    };

    let source = manager
        .create_node(TestPlugin::standard(vec![emit(record("x", 1i64))]).into_arc(), None, "")
        .unwrap();
    let target = manager
        .create_node(TestPlugin::standard(vec![gated]).into_arc(), None, "")
        .unwrap();
    manager.connect(source.id(), 0, target.id()).unwrap();

    timeout(Duration::from_secs(1), source.execute(Record::new()))
        .await
        .expect("upstream waited for downstream work");
    assert!(stays_silent(&mut rx).await);

    gate.notify_one();
    assert_eq!(recv(&mut rx).await, Some(record("x", 1i64)));
}

#[tokio::test]
async fn test_dispatch_records_parent() {
    let manager = ExecutionManager::new(test_context());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let parent_probe = task_fn(move |ctx, input| {
        let tx = tx.clone();
        async move {
            let parent = ctx.parent.map(|id| id.to_string()).unwrap_or_default();
            let _ = tx.send(record("parent", parent));
            Ok(input)
        }
    });

    let source = manager
        .create_node(TestPlugin::standard(vec![emit(Record::new())]).into_arc(), None, "")
        .unwrap();
    let target = manager
        .create_node(TestPlugin::standard(vec![parent_probe]).into_arc(), None, "")
        .unwrap();
    manager.connect(source.id(), 0, target.id()).unwrap();

    assert!(target.parent().is_none());
    source.execute(Record::new()).await;

    assert_eq!(
        recv(&mut rx).await,
        Some(record("parent", source.id().to_string()))
    );
    assert_eq!(target.parent().map(|p| p.id()), Some(source.id()));
}

#[tokio::test]
async fn test_config_write_back_reaches_tasks() {
    let manager = ExecutionManager::new(test_context());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let config_probe = task_fn(move |ctx, input| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(record("config", ctx.config.clone()));
            Ok(input)
        }
    });

    let node = manager
        .create_node(TestPlugin::standard(vec![config_probe]).into_arc(), None, "v1")
        .unwrap();

    node.execute(Record::new()).await;
    assert_eq!(recv(&mut rx).await, Some(record("config", "v1")));

    node.set_config("v2");
    assert_eq!(node.config(), "v2");
    node.execute(Record::new()).await;
    assert_eq!(recv(&mut rx).await, Some(record("config", "v2")));
}

#[tokio::test]
async fn test_cancelled_graph_does_not_activate() {
    let manager = ExecutionManager::new(test_context());
    let runs = Arc::new(AtomicUsize::new(0));
    let node = manager
        .create_node(TestPlugin::standard(vec![counter(runs.clone())]).into_arc(), None, "")
        .unwrap();

    manager.cancellation().cancel();
    node.execute(Record::new()).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_starter_loops_until_cancelled() {
    let manager = ExecutionManager::new(test_context());
    let runs = Arc::new(AtomicUsize::new(0));
    manager
        .create_node(TestPlugin::starter(vec![counter(runs.clone())]).into_arc(), None, "")
        .unwrap();

    assert_eq!(manager.initialize().unwrap(), 1);
    assert!(eventually(|| runs.load(Ordering::SeqCst) >= 5).await);

    manager.shutdown().await.unwrap();
    let after_shutdown = runs.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.load(Ordering::SeqCst), after_shutdown);
    assert!(!manager.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disabled_starter_idles_until_enabled() {
    let manager = ExecutionManager::new(test_context());
    let runs = Arc::new(AtomicUsize::new(0));
    let starter = manager
        .create_node(TestPlugin::starter(vec![counter(runs.clone())]).into_arc(), None, "")
        .unwrap();
    starter.set_enabled(false);

    let mut events = manager.subscribe_events();
    manager.initialize().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let mut skipped = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ExecutionEvent::ActivationSkipped { .. }) {
            skipped += 1;
        }
    }
    assert!(skipped >= 1, "disabled starter should keep looping");
    // 10ms backoff bounds the number of idle passes
    assert!(skipped < 50, "disabled starter spun without backing off");

    starter.set_enabled(true);
    assert!(eventually(|| runs.load(Ordering::SeqCst) > 0).await);

    manager.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_starter_pipeline_delivers_fresh_results() {
    let manager = ExecutionManager::new(test_context());

    let tick = task_fn(|_ctx, _input| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(record("x", 1i64))
    });
    let double = task_fn(|_ctx, input: Record| async move {
        let x = input
            .get("x")
            .and_then(Value::as_f64)
            .ok_or_else(|| NodeError::MissingInput("x".to_string()))?;
        Ok(record("x", x * 2.0))
    });

    let a = manager
        .create_node(TestPlugin::starter(vec![tick]).into_arc(), Some("A".into()), "")
        .unwrap();
    let b = manager
        .create_node(TestPlugin::standard(vec![double]).into_arc(), Some("B".into()), "")
        .unwrap();
    let (c, mut rx) = sink(&manager);
    manager.connect(a.id(), 0, b.id()).unwrap();
    manager.connect(b.id(), 0, c.id()).unwrap();

    manager.initialize().unwrap();
    for _ in 0..3 {
        assert_eq!(recv(&mut rx).await, Some(record("x", 2.0)));
    }

    manager.shutdown().await.unwrap();
}

struct EchoScript;

#[async_trait]
impl ScriptExecutor for EchoScript {
    async fn execute(&self, code: &str, mut parameters: Record) -> Result<Record, NodeError> {
        parameters.insert("code".to_string(), Value::from(code));
        Ok(parameters)
    }
}

#[tokio::test]
async fn test_tasks_reach_injected_script_executor() {
    let manager = ExecutionManager::new(test_context().with_script_executor(Arc::new(EchoScript)));
    let script_task = task_fn(|ctx, input| async move { ctx.run_script("return input", input).await });
    let source = manager
        .create_node(TestPlugin::standard(vec![script_task]).into_arc(), None, "")
        .unwrap();
    let (target, mut rx) = sink(&manager);
    manager.connect(source.id(), 0, target.id()).unwrap();

    source.execute(record("n", 3i64)).await;

    let mut expected = record("n", 3i64);
    expected.insert("code".to_string(), Value::from("return input"));
    assert_eq!(recv(&mut rx).await, Some(expected));
}

#[tokio::test]
async fn test_missing_script_executor_is_a_task_failure() {
    let manager = ExecutionManager::new(test_context());
    let script_task = task_fn(|ctx, input| async move { ctx.run_script("1 + 1", input).await });
    let node = manager
        .create_node(TestPlugin::standard(vec![script_task]).into_arc(), None, "")
        .unwrap();

    let mut events = manager.subscribe_events();
    node.execute(Record::new()).await;

    let failed = std::iter::from_fn(|| events.try_recv().ok())
        .any(|e| matches!(e, ExecutionEvent::TaskFailed { task_index: 0, .. }));
    assert!(failed);
}
