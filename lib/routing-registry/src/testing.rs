//! In-process fake of the registry's HTTP API for tests
//!
//! Serves the health listing with blocking-query semantics, plus agent
//! register/deregister, on an ephemeral localhost port.

use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::{Method, Request, StatusCode};
use routing_api::v1::{INDEX_HEADER, STATUS_PASSING, TOKEN_HEADER};
use routing_api::{AgentService, HealthCheck, HealthEntry, ServiceRegistration};
use routing_core::server::{
    collect_body, json_response, not_found_response, parse_query, serve, text_response, HttpResponse,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Build a health entry with one check per status
pub fn entry(id: &str, address: &str, port: u16, tags: &[&str], statuses: &[&str]) -> HealthEntry {
    HealthEntry {
        node: None,
        service: AgentService {
            id: id.to_string(),
            service: "app".to_string(),
            address: address.to_string(),
            port,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            meta: HashMap::new(),
        },
        checks: statuses
            .iter()
            .enumerate()
            .map(|(i, status)| HealthCheck {
                check_id: format!("check-{}", i),
                name: format!("check {}", i),
                status: status.to_string(),
            })
            .collect(),
    }
}

#[derive(Default)]
struct Inner {
    services: HashMap<String, Vec<HealthEntry>>,
    failure: Option<u16>,
    requests: Vec<String>,
    registrations: Vec<ServiceRegistration>,
    last_token: Option<String>,
}

struct FakeState {
    inner: Mutex<Inner>,
    index: watch::Sender<u64>,
}

impl FakeState {
    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.index.send_modify(|index| *index += 1);
    }
}

/// A running fake registry; the server stops when this is dropped
pub struct FakeRegistry {
    addr: SocketAddr,
    state: Arc<FakeState>,
    _shutdown: watch::Sender<bool>,
}

impl FakeRegistry {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake registry");
        let addr = listener.local_addr().expect("fake registry address");
        let (index, _) = watch::channel(1);
        let state = Arc::new(FakeState {
            inner: Mutex::new(Inner::default()),
            index,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handler_state = state.clone();
        tokio::spawn(serve(
            listener,
            move |req| handle(handler_state.clone(), req),
            shutdown_rx,
        ));

        Self {
            addr,
            state,
            _shutdown: shutdown_tx,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Current registry index
    pub fn index(&self) -> u64 {
        *self.state.index.borrow()
    }

    /// Replace the entries of a service and advance the index
    pub fn set_entries(&self, service: &str, entries: Vec<HealthEntry>) {
        self.state.lock().services.insert(service.to_string(), entries);
        self.state.bump();
    }

    /// Answer health queries with this status until cleared
    pub fn fail_with(&self, status: Option<u16>) {
        self.state.lock().failure = status;
    }

    /// Query strings of the health requests received so far
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }

    pub fn registrations(&self) -> Vec<ServiceRegistration> {
        self.state.lock().registrations.clone()
    }

    pub fn last_token(&self) -> Option<String> {
        self.state.lock().last_token.clone()
    }
}

async fn handle(state: Arc<FakeState>, req: Request<Incoming>) -> Result<HttpResponse, hyper::Error> {
    let token = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if token.is_some() {
        state.lock().last_token = token;
    }

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    if method == Method::GET {
        if let Some(service) = path.strip_prefix("/v1/health/service/") {
            return Ok(health(&state, service, query.as_deref()).await);
        }
    }

    if method == Method::PUT && path == "/v1/agent/service/register" {
        let body = collect_body(req.into_body()).await?;
        let registration: ServiceRegistration = match serde_json::from_slice(&body) {
            Ok(registration) => registration,
            Err(e) => return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string())),
        };
        let mut registered = entry(
            &registration.id,
            &registration.address,
            registration.port,
            &[],
            &[STATUS_PASSING],
        );
        registered.service.service = registration.name.clone();
        registered.service.tags = registration.tags.clone();
        registered.service.meta = registration.meta.clone();
        {
            let mut inner = state.lock();
            inner
                .services
                .entry(registration.name.clone())
                .or_default()
                .push(registered);
            inner.registrations.push(registration);
        }
        state.bump();
        return Ok(text_response(StatusCode::OK, ""));
    }

    if method == Method::PUT {
        if let Some(id) = path.strip_prefix("/v1/agent/service/deregister/") {
            {
                let mut inner = state.lock();
                for entries in inner.services.values_mut() {
                    entries.retain(|e| e.service.id != id);
                }
            }
            state.bump();
            return Ok(text_response(StatusCode::OK, ""));
        }
    }

    Ok(not_found_response())
}

async fn health(state: &FakeState, service: &str, query: Option<&str>) -> HttpResponse {
    let params = parse_query(query);
    state.lock().requests.push(query.unwrap_or_default().to_string());

    let failure = state.lock().failure;
    if let Some(status) = failure {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return text_response(status, "injected failure\n");
    }

    let requested: u64 = params.get("index").and_then(|i| i.parse().ok()).unwrap_or(0);
    let wait = params.get("wait").map(|w| parse_wait(w)).unwrap_or(Duration::from_secs(5));

    let mut index_rx = state.index.subscribe();
    if requested > 0 && *index_rx.borrow_and_update() <= requested {
        let _ = tokio::time::timeout(wait, index_rx.changed()).await;
    }

    let index = *state.index.borrow();
    let passing_only = params.get("passing").map(|p| p == "true").unwrap_or(false);
    let entries = state.lock().services.get(service).cloned();

    let mut response = match entries {
        None => text_response(StatusCode::NOT_FOUND, ""),
        Some(entries) => {
            let entries: Vec<HealthEntry> = entries
                .into_iter()
                .filter(|e| !passing_only || e.checks.iter().all(|c| c.status == STATUS_PASSING))
                .collect();
            json_response(StatusCode::OK, &entries)
        }
    };
    if let Ok(value) = HeaderValue::from_str(&index.to_string()) {
        response.headers_mut().insert(INDEX_HEADER, value);
    }
    response
}

fn parse_wait(wait: &str) -> Duration {
    if let Some(ms) = wait.strip_suffix("ms") {
        return Duration::from_millis(ms.parse().unwrap_or(0));
    }
    if let Some(secs) = wait.strip_suffix('s') {
        return Duration::from_secs(secs.parse().unwrap_or(0));
    }
    Duration::from_secs(5)
}
