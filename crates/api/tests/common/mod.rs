#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use http_body_util::BodyExt;
use tokio::sync::Notify;
use tower::ServiceExt;
use webpilot_api::config::ServerConfig;
use webpilot_api::engine::dispatcher::JobDispatcher;
use webpilot_api::engine::tracker::JobTracker;
use webpilot_api::router::build_app_router;
use webpilot_api::state::AppState;
use webpilot_browser::{
    AutomationExecutor, BrowserContext, BrowserError, BrowserManager, ExecutorError,
    ExecutorOutput, Invocation, SharedBrowser,
};
use webpilot_core::backend::ApiKey;
use webpilot_core::job::ContextConfig;
use webpilot_events::{CallbackDelivery, DeliveryConfig, JobEventBus, RetryPolicy};
use webpilot_worker::{BackendCredentials, BackendRegistry, WorkerDeps};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        job_retention_secs: 3600,
    }
}

// ---------------------------------------------------------------------------
// Fake browser engine
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct BrowserCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub browser_closed: AtomicUsize,
}

struct FakeBrowser {
    counters: Arc<BrowserCounters>,
}

struct FakeContext {
    id: String,
    counters: Arc<BrowserCounters>,
}

#[async_trait]
impl SharedBrowser for FakeBrowser {
    async fn new_context(
        &self,
        _config: &ContextConfig,
    ) -> Result<Arc<dyn BrowserContext>, BrowserError> {
        let n = self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeContext {
            id: format!("ctx-{n}"),
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.counters.browser_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl BrowserContext for FakeContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake executor
// ---------------------------------------------------------------------------

/// Behaviour keyed on the task text:
///
/// - `"block"` waits for [`TestApp::unblock`] or cancellation
/// - `"fail"` reports a navigation timeout
/// - anything else succeeds with `"done: <task>"`
#[derive(Default)]
pub struct FakeExecutor {
    pub runs: AtomicUsize,
    pub gate: Notify,
}

#[async_trait]
impl AutomationExecutor for FakeExecutor {
    async fn run(&self, invocation: Invocation<'_>) -> Result<ExecutorOutput, ExecutorError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match invocation.task {
            "block" => {
                tokio::select! {
                    _ = self.gate.notified() => Ok(ExecutorOutput {
                        final_result: Some("unblocked".into()),
                        screenshots: Vec::new(),
                    }),
                    _ = invocation.cancel.cancelled() => Err(ExecutorError::Cancelled),
                }
            }
            "fail" => Err(ExecutorError::Navigation("navigation timeout".into())),
            task => Ok(ExecutorOutput {
                final_result: Some(format!("done: {task}")),
                screenshots: vec!["data:image/png;base64,AAA".into()],
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Test application
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub browser_counters: Arc<BrowserCounters>,
    pub executor: Arc<FakeExecutor>,
}

impl TestApp {
    pub fn unblock(&self) {
        self.executor.gate.notify_one();
    }
}

/// Build the full application router over fake engine components.
///
/// Uses the same [`build_app_router`] as `main.rs`, so integration tests
/// exercise the production middleware stack.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let browser_counters = Arc::new(BrowserCounters::default());
    let browser = Arc::new(BrowserManager::new(
        Arc::new(FakeBrowser {
            counters: Arc::clone(&browser_counters),
        }),
        ContextConfig::default(),
        true,
    ));
    let executor = Arc::new(FakeExecutor::default());
    let event_bus = Arc::new(JobEventBus::default());
    let tracker = Arc::new(JobTracker::new());
    tokio::spawn(Arc::clone(&tracker).run(event_bus.subscribe()));

    let delivery = CallbackDelivery::new(&DeliveryConfig {
        timeout: Duration::from_secs(5),
        retry: RetryPolicy::none(),
        overflow_path: None,
    })
    .unwrap();

    let deps = WorkerDeps {
        browser: Arc::clone(&browser),
        executor: executor.clone(),
        registry: Arc::new(BackendRegistry::standard(&BackendCredentials {
            openai_api_key: Some(ApiKey::new("sk-test")),
            openai_base_url: None,
            gemini_api_key: None,
        })),
        delivery: Arc::new(delivery),
        events: Arc::clone(&event_bus),
    };

    let state = AppState {
        browser,
        dispatcher: Arc::new(JobDispatcher::new(deps, Arc::clone(&tracker))),
        tracker,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        browser_counters,
        executor,
    }
}

// ---------------------------------------------------------------------------
// Callback receiver
// ---------------------------------------------------------------------------

/// A loopback HTTP server that records every callback body it receives.
pub struct CallbackReceiver {
    pub url: String,
    received: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl CallbackReceiver {
    pub async fn spawn() -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let app = Router::new().route(
            "/callback",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(body);
                    StatusCode::OK
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{addr}/callback"),
            received,
        }
    }

    pub fn received(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }

    /// Wait until `count` callbacks have arrived, failing after five seconds.
    pub async fn wait_for(&self, count: usize) -> Vec<serde_json::Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let received = self.received();
                if received.len() >= count {
                    return received;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for callbacks")
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body.to_string())).await
}

pub async fn post_raw(app: Router, uri: &str, body: &str) -> Response<Body> {
    send(app, Method::POST, uri, Some(body.to_string())).await
}

async fn send(app: Router, method: Method, uri: &str, body: Option<String>) -> Response<Body> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body)),
        None => builder.body(Body::empty()),
    }
    .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
