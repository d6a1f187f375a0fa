//! Model-service control against a fake container runtime and a stub server.

mod common;

use common::{FakeRuntime, StubServer};
use docscribe::{
    BackendSettings, ContainerStatus, DigitizeError, DigitizerConfig, ModelFamily,
    ModelServiceController,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const READY: &str = "/v1/models";

fn bindings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(m, c)| (m.to_string(), c.to_string()))
        .collect()
}

fn config(start_timeout_secs: f64) -> Arc<DigitizerConfig> {
    Arc::new(
        DigitizerConfig::builder()
            .backend(
                ModelFamily::Generic,
                BackendSettings::new("http://unused:8000").with_start_timeout(start_timeout_secs),
            )
            .poll_interval_secs(0.5)
            .build()
            .unwrap(),
    )
}

fn controller(runtime: &Arc<FakeRuntime>, start_timeout_secs: f64) -> ModelServiceController {
    ModelServiceController::new(runtime.clone(), config(start_timeout_secs)).unwrap()
}

#[tokio::test]
async fn unbound_model_is_a_no_op() {
    let server = StubServer::start(|_| (200, "{}".into())).await;
    let runtime = Arc::new(FakeRuntime::default());
    let c = controller(&runtime, 5.0);

    let secs = c
        .ensure_ready("Qwen/Qwen3-VL-4B-Instruct", &server.base_url, &HashMap::new(), READY)
        .await
        .unwrap();
    assert_eq!(secs, 0.0);

    let other_model_only = bindings(&[("datalab-to/chandra", "chandra")]);
    let secs = c
        .ensure_ready("Qwen/Qwen3-VL-4B-Instruct", &server.base_url, &other_model_only, READY)
        .await
        .unwrap();
    assert_eq!(secs, 0.0);

    assert_eq!(runtime.calls(), 0);
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn running_and_ready_issues_no_start() {
    let server = StubServer::start(|_| (200, r#"{"data":[]}"#.into())).await;
    let runtime = Arc::new(FakeRuntime::with(&[("vllm", ContainerStatus::Running)]));
    let c = controller(&runtime, 5.0);

    let secs = c
        .ensure_ready("qwen", &server.base_url, &bindings(&[("qwen", "vllm")]), READY)
        .await
        .unwrap();

    assert!((0.0..5.0).contains(&secs), "got {secs}");
    assert!(runtime.starts().is_empty());
    assert!(runtime.stops().is_empty());
    let probes = server.requests_to(READY);
    assert_eq!(probes.len(), 1);
    assert_eq!(probes[0].method, "GET");
}

#[tokio::test]
async fn starts_target_and_stops_competitors() {
    let server = StubServer::start(|_| (200, "{}".into())).await;
    let runtime = Arc::new(FakeRuntime::with(&[
        ("vllm", ContainerStatus::Exited),
        ("chandra", ContainerStatus::Running),
        ("deepseek", ContainerStatus::Exited),
        ("paused-one", ContainerStatus::Paused),
    ]));
    let c = controller(&runtime, 5.0);
    let map = bindings(&[
        ("qwen-4b", "vllm"),
        ("qwen-8b", "vllm"),
        ("chandra", "chandra"),
        ("deepseek", "deepseek"),
        ("paused", "paused-one"),
    ]);

    c.ensure_ready("qwen-4b", &server.base_url, &map, READY)
        .await
        .unwrap();

    assert_eq!(runtime.starts(), vec!["vllm".to_string()]);
    let mut stops = runtime.stops();
    stops.sort();
    assert_eq!(stops, vec!["chandra".to_string(), "paused-one".to_string()]);
    assert_eq!(runtime.status_of("vllm"), Some(ContainerStatus::Running));
    assert_eq!(runtime.status_of("chandra"), Some(ContainerStatus::Exited));
}

#[tokio::test]
async fn stop_failure_is_swallowed() {
    let server = StubServer::start(|_| (200, "{}".into())).await;
    let runtime = Arc::new(
        FakeRuntime::with(&[
            ("vllm", ContainerStatus::Running),
            ("chandra", ContainerStatus::Running),
        ])
        .failing_stop("chandra"),
    );
    let c = controller(&runtime, 5.0);

    let result = c
        .ensure_ready(
            "qwen",
            &server.base_url,
            &bindings(&[("qwen", "vllm"), ("chandra", "chandra")]),
            READY,
        )
        .await;

    assert!(result.is_ok(), "got {result:?}");
    assert_eq!(runtime.stops(), vec!["chandra".to_string()]);
    assert_eq!(runtime.status_of("chandra"), Some(ContainerStatus::Running));
}

#[tokio::test]
async fn missing_container_is_unavailable() {
    let server = StubServer::start(|_| (200, "{}".into())).await;
    let runtime = Arc::new(FakeRuntime::default());
    let c = controller(&runtime, 5.0);

    let err = c
        .ensure_ready("qwen", &server.base_url, &bindings(&[("qwen", "vllm")]), READY)
        .await
        .unwrap_err();

    match err {
        DigitizeError::ServiceUnavailable {
            model, container, ..
        } => {
            assert_eq!(model, "qwen");
            assert_eq!(container.as_deref(), Some("vllm"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(runtime.starts().is_empty());
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn never_ready_times_out_with_last_status() {
    let server = StubServer::start(|_| (503, r#"{"error":"loading"}"#.into())).await;
    let runtime = Arc::new(FakeRuntime::with(&[("vllm", ContainerStatus::Running)]));
    let c = controller(&runtime, 1.0);

    let err = c
        .ensure_ready("qwen", &server.base_url, &bindings(&[("qwen", "vllm")]), READY)
        .await
        .unwrap_err();

    match err {
        DigitizeError::ServiceTimeout {
            model,
            url,
            last_error,
            secs,
        } => {
            assert_eq!(model, "qwen");
            assert_eq!(url, format!("{}{}", server.base_url, READY));
            assert_eq!(last_error.as_deref(), Some("HTTP 503"));
            assert_eq!(secs, 1.0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(server.requests_to(READY).len() >= 2);
}

#[tokio::test]
async fn shared_lock_is_the_same_object() {
    let runtime = Arc::new(FakeRuntime::default());
    let first = controller(&runtime, 5.0);
    let second =
        ModelServiceController::with_lock(runtime.clone(), config(5.0), first.lock()).unwrap();
    assert!(Arc::ptr_eq(&first.lock(), &second.lock()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readiness_poll_does_not_hold_the_shared_lock() {
    let loading = StubServer::start(|_| (503, r#"{"error":"loading"}"#.into())).await;
    let ready = StubServer::start(|_| (200, r#"{"data":[]}"#.into())).await;
    let runtime = Arc::new(FakeRuntime::with(&[
        ("slow-svc", ContainerStatus::Running),
        ("fast-svc", ContainerStatus::Running),
    ]));
    let slow = controller(&runtime, 5.0);
    let fast =
        ModelServiceController::with_lock(runtime.clone(), config(5.0), slow.lock()).unwrap();

    let loading_url = loading.base_url.clone();
    let polling = tokio::spawn(async move {
        slow.ensure_ready("slow", &loading_url, &bindings(&[("slow", "slow-svc")]), READY)
            .await
    });
    while loading.requests_to(READY).is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let started = Instant::now();
    fast.ensure_ready("fast", &ready.base_url, &bindings(&[("fast", "fast-svc")]), READY)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert!(!polling.is_finished());
    polling.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_stop_phases_do_not_interleave() {
    let server = StubServer::start(|_| (200, r#"{"data":[]}"#.into())).await;
    let runtime = Arc::new(
        FakeRuntime::with(&[
            ("a-svc", ContainerStatus::Exited),
            ("b-svc", ContainerStatus::Exited),
        ])
        .slow_start(Duration::from_millis(200)),
    );
    let first = controller(&runtime, 5.0);
    let second =
        ModelServiceController::with_lock(runtime.clone(), config(5.0), first.lock()).unwrap();
    let all = bindings(&[("a", "a-svc"), ("b", "b-svc")]);

    let (a, b) = tokio::join!(
        first.ensure_ready("a", &server.base_url, &all, READY),
        second.ensure_ready("b", &server.base_url, &all, READY),
    );
    a.unwrap();
    b.unwrap();

    let events = runtime.events();
    assert_eq!(events.len(), 4, "{events:?}");
    for pair in events.chunks(2) {
        let name = pair[0].strip_prefix("start:").unwrap();
        assert_eq!(pair[1], format!("started:{name}"), "{events:?}");
    }
}
