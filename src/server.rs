// ===============================
// src/server.rs (HTTP API + /metrics)
// ===============================
//
// Routes (prefix `/api` opsional, dipakai frontend lama):
//   POST /api/start               -> mulai run baru (run lama di-stop dulu)
//   POST /api/stop                -> summary (idempotent)
//   GET  /api/status              -> poolSize + recentLogs
//   POST /api/configuration       -> simpan konfigurasi, balas id
//   GET  /api/configuration/last  -> konfigurasi terakhir / 404
//   GET  /metrics                 -> Prometheus text
//
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::controller::{RunOptions, SimulationController, StopReason};
use crate::domain::{RunSummary, SimConfig, SimConfigRequest, StatusSnapshot};
use crate::error::{SimError, StoreError};
use crate::metrics::encode_metrics;
use crate::store::ConfigStore;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error("invalid request body: {0}")]
    BadBody(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("reading request body: {0}")]
    Body(#[from] hyper::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Sim(_) | ApiError::BadBody(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Body(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn into_response(self) -> Response<Body> {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        json_response(status, &json!({ "error": self.to_string(), "status": status.as_u16() }))
    }
}

/// Explicitly owned application state: the current run (if any) and the
/// configuration store.
pub struct AppState {
    run: Mutex<Option<SimulationController>>,
    store: ConfigStore,
    run_opts: RunOptions,
    cors_origin: HeaderValue,
}

impl AppState {
    pub fn new(store: ConfigStore, run_opts: RunOptions, cors_origin: &str) -> Self {
        let cors_origin = HeaderValue::from_str(cors_origin).unwrap_or_else(|_| {
            warn!(%cors_origin, "invalid CORS origin, falling back to *");
            HeaderValue::from_static("*")
        });
        Self { run: Mutex::new(None), store, run_opts, cors_origin }
    }

    /// Start a fresh run; an existing one is stopped first.
    pub async fn start(&self, config: SimConfig) -> Result<(), SimError> {
        config.validate()?;
        let mut slot = self.run.lock().await;
        if let Some(prev) = slot.take() {
            prev.stop_with(StopReason::Replaced).await;
        }
        *slot = Some(SimulationController::start(config, self.run_opts.clone())?);
        Ok(())
    }

    pub async fn stop(&self) -> Result<RunSummary, SimError> {
        let ctl = self.run.lock().await.clone().ok_or(SimError::NoActiveRun)?;
        Ok(ctl.stop().await)
    }

    pub async fn status(&self) -> Result<StatusSnapshot, SimError> {
        self.run.lock().await.as_ref().ok_or(SimError::NoActiveRun)?.status()
    }

    /// Stop whatever is running; used on process shutdown.
    pub async fn shutdown(&self) {
        if let Some(ctl) = self.run.lock().await.take() {
            if ctl.is_running() {
                ctl.stop().await;
            }
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut resp = Response::new(Body::from(bytes));
            *resp.status_mut() = status;
            resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            resp
        }
        Err(e) => {
            let mut resp = Response::new(Body::from(format!("serialize error: {e}")));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    }
}

async fn read_config(req: Request<Body>) -> Result<SimConfig, ApiError> {
    let bytes = hyper::body::to_bytes(req.into_body()).await?;
    let raw: SimConfigRequest =
        serde_json::from_slice(&bytes).map_err(|e| ApiError::BadBody(e.to_string()))?;
    Ok(SimConfig::try_from(raw)?)
}

async fn handle_start(req: Request<Body>, state: &AppState) -> Result<Response<Body>, ApiError> {
    let config = read_config(req).await?;
    state.start(config.clone()).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "message": "Simulation started successfully.", "config": config }),
    ))
}

async fn handle_stop(state: &AppState) -> Result<Response<Body>, ApiError> {
    let summary = state.stop().await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "message": "Simulation stopped successfully", "summary": summary }),
    ))
}

async fn handle_status(state: &AppState) -> Result<Response<Body>, ApiError> {
    Ok(json_response(StatusCode::OK, &state.status().await?))
}

async fn handle_save_config(req: Request<Body>, state: &AppState) -> Result<Response<Body>, ApiError> {
    let config = read_config(req).await?;
    let id = state.store.save(&config).await?;
    Ok(json_response(StatusCode::OK, &json!({ "message": "Configuration saved", "id": id })))
}

async fn handle_last_config(state: &AppState) -> Result<Response<Body>, ApiError> {
    match state.store.load_last().await? {
        Some(config) => Ok(json_response(StatusCode::OK, &config)),
        None => Err(ApiError::NotFound("no configuration saved yet".into())),
    }
}

fn metrics_response() -> Response<Body> {
    let mut resp = Response::new(Body::from(encode_metrics()));
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    resp
}

pub async fn route(req: Request<Body>, state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let full_path = req.uri().path().to_string();
    let path = match full_path.strip_prefix("/api") {
        Some(rest) if rest.starts_with('/') => rest,
        _ => full_path.as_str(),
    };

    let result = match (&method, path) {
        (&Method::OPTIONS, _) => {
            let mut resp = Response::new(Body::empty());
            *resp.status_mut() = StatusCode::NO_CONTENT;
            Ok(resp)
        }
        (&Method::POST, "/start") => handle_start(req, &state).await,
        (&Method::POST, "/stop") => handle_stop(&state).await,
        (&Method::GET, "/status") => handle_status(&state).await,
        (&Method::POST, "/configuration") => handle_save_config(req, &state).await,
        (&Method::GET, "/configuration/last") => handle_last_config(&state).await,
        (&Method::GET, "/metrics") => Ok(metrics_response()),
        _ => Err(ApiError::NotFound(format!("no route for {method} {full_path}"))),
    };

    let mut resp = result.unwrap_or_else(ApiError::into_response);
    let headers = resp.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_origin.clone());
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("content-type"));
    Ok(resp)
}

/// Serve until ctrl-c.
pub async fn serve(state: Arc<AppState>, port: u16) -> Result<(), hyper::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| route(req, state.clone()))) }
    });

    info!(%addr, "http api listening");
    Server::try_bind(&addr)?
        .serve(make_svc)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_path;

    const SCENARIO: &str = r#"{"totalTickets":10,"maxTicketCapacity":5,"ticketsPerRelease":5,
        "ticketReleaseInterval":60000,"customerRetrievalInterval":60000,
        "vendorCount":2,"customerCount":1}"#;

    fn state(tag: &str) -> Arc<AppState> {
        Arc::new(AppState::new(
            ConfigStore::new(temp_path(tag)),
            RunOptions::default(),
            "http://localhost:3000",
        ))
    }

    async fn call(state: &Arc<AppState>, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = route(req, state.clone()).await.unwrap();
        let status = resp.status();
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn start_rejects_missing_total_tickets() {
        let st = state("http_missing");
        let (code, body) = call(&st, "POST", "/api/start", r#"{"vendorCount":2}"#).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("totalTickets"));

        let (code, _) = call(&st, "POST", "/api/start", "not json").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn stop_and_status_without_run_are_bad_requests() {
        let st = state("http_norun");
        let (code, body) = call(&st, "POST", "/api/stop", "").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
        let (code, _) = call(&st, "GET", "/status", "").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_status_stop_lifecycle() {
        let st = state("http_lifecycle");
        let (code, body) = call(&st, "POST", "/api/start", SCENARIO).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["config"]["totalTickets"], 10);

        let (code, body) = call(&st, "GET", "/api/status", "").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["poolSize"], 0);
        assert_eq!(body["activeVendors"], 2);
        assert!(body.get("running").is_none());
        assert!(body["recentLogs"].as_array().unwrap().len() >= 1);

        let (code, first) = call(&st, "POST", "/api/stop", "").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(first["summary"]["vendorSales"]["Vendor-1"], 0);
        assert_eq!(first["summary"]["vendorReleases"]["Vendor-1"], 0);
        assert_eq!(first["summary"]["customerPurchases"]["Customer-0"], 0);
        assert_eq!(first["summary"]["config"]["vendorCount"], 2);

        let (code, second) = call(&st, "POST", "/api/stop", "").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(first["summary"], second["summary"]);

        let (code, _) = call(&st, "GET", "/api/status", "").await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn restart_replaces_previous_run() {
        let st = state("http_restart");
        assert_eq!(call(&st, "POST", "/start", SCENARIO).await.0, StatusCode::OK);
        let old = st.run.lock().await.clone().unwrap();
        assert_eq!(call(&st, "POST", "/start", SCENARIO).await.0, StatusCode::OK);
        assert!(!old.is_running());
        assert_eq!(call(&st, "GET", "/status", "").await.0, StatusCode::OK);
        st.shutdown().await;
    }

    #[tokio::test]
    async fn configuration_save_and_load_last() {
        let st = state("http_config");
        let (code, _) = call(&st, "GET", "/api/configuration/last", "").await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (code, body) = call(&st, "POST", "/api/configuration", SCENARIO).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["id"], 1);

        let (code, body) = call(&st, "GET", "/api/configuration/last", "").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["ticketReleaseInterval"], 60000);
    }

    #[tokio::test]
    async fn cors_preflight_and_unknown_route() {
        let st = state("http_cors");
        let req = Request::builder().method("OPTIONS").uri("/api/start").body(Body::empty()).unwrap();
        let resp = route(req, st.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");

        let (code, _) = call(&st, "GET", "/api/nope", "").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn start_rejects_oversized_values() {
        let st = state("http_oversized");
        for body in [
            r#"{"totalTickets":10,"maxTicketCapacity":1000000000000,"ticketsPerRelease":5,
                "ticketReleaseInterval":100,"customerRetrievalInterval":100,"vendorCount":2,"customerCount":1}"#,
            r#"{"totalTickets":9223372036854775807,"maxTicketCapacity":5,"ticketsPerRelease":5,
                "ticketReleaseInterval":100,"customerRetrievalInterval":100,"vendorCount":2,"customerCount":1}"#,
            r#"{"totalTickets":10,"maxTicketCapacity":5,"ticketsPerRelease":5,
                "ticketReleaseInterval":100,"customerRetrievalInterval":100,"vendorCount":2,"customerCount":99999999}"#,
        ] {
            let (code, body) = call(&st, "POST", "/api/start", body).await;
            assert_eq!(code, StatusCode::BAD_REQUEST);
            assert!(body["error"].as_str().unwrap().contains("must not exceed"));
        }
        assert!(st.run.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_reflect_a_finished_run() {
        crate::metrics::init();
        let st = state("http_metrics");
        let body = r#"{"totalTickets":4,"maxTicketCapacity":4,"ticketsPerRelease":2,
            "ticketReleaseInterval":10,"customerRetrievalInterval":10,"vendorCount":1,"customerCount":1}"#;
        assert_eq!(call(&st, "POST", "/api/start", body).await.0, StatusCode::OK);
        let ctl = st.run.lock().await.clone().unwrap();
        ctl.finished().await;

        let req = Request::builder().method("GET").uri("/metrics").body(Body::empty()).unwrap();
        let resp = route(req, st.clone()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains(r#"tickets_released_total{vendor="Vendor-0"}"#), "{text}");
        assert!(text.contains(r#"tickets_sold_total{vendor="Vendor-0"}"#));
        assert!(text.contains("pool_size"));
        assert!(text.contains("runs_started_total"));
        st.shutdown().await;
    }
}
