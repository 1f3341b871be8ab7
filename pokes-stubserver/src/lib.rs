use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{any, get};
use bytes::Bytes;
use rand::Rng;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_PIXEL: &str = "/pixel";
pub const PATH_OK: &str = "/ok";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_ECHO: &str = "/echo";

/// Request counters shared by every handler of one server.
#[derive(Debug, Clone, Default)]
pub struct StubStats {
    requests_total: Arc<AtomicU64>,
    bodies: Arc<Mutex<HashSet<Bytes>>>,
}

impl StubStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn record_body(&self, body: Bytes) {
        self.bodies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(body);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Distinct request bodies seen on [`PATH_ECHO`].
    pub fn distinct_bodies(&self) -> Vec<Bytes> {
        self.bodies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct StubUrls {
    pub base_url: String,
    pub pixel: String,
    pub ok: String,
    pub slow: String,
    pub echo: String,
}

impl StubUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            pixel: format!("{base_url}{PATH_PIXEL}"),
            ok: format!("{base_url}{PATH_OK}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            base_url,
        }
    }
}

/// Status and delay for one `/pixel` hit: 204 (50%, <500ms), 400 (30%, <100ms), 500 (20%, <300ms).
pub fn pixel_outcome<R: Rng + ?Sized>(rng: &mut R) -> (StatusCode, Duration) {
    let roll: u32 = rng.gen_range(0..10);
    let (status, max_delay_ms) = match roll {
        0..=4 => (StatusCode::NO_CONTENT, 500),
        5..=7 => (StatusCode::BAD_REQUEST, 100),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, 300),
    };
    let delay = Duration::from_millis(rng.gen_range(0..max_delay_ms));
    (status, delay)
}

async fn handle_pixel(State(stats): State<StubStats>) -> StatusCode {
    stats.inc_requests_total();
    let (status, delay) = pixel_outcome(&mut rand::thread_rng());
    sleep(delay).await;
    status
}

async fn handle_ok(State(stats): State<StubStats>) -> StatusCode {
    stats.inc_requests_total();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: Option<u64>,
}

async fn handle_slow(State(stats): State<StubStats>, Query(q): Query<SlowQuery>) -> StatusCode {
    stats.inc_requests_total();
    sleep(Duration::from_millis(q.ms.unwrap_or(1_000))).await;
    StatusCode::NO_CONTENT
}

async fn handle_echo(State(stats): State<StubStats>, body: Bytes) -> (StatusCode, Bytes) {
    stats.inc_requests_total();
    stats.record_body(body.clone());
    (StatusCode::OK, body)
}

pub fn router(stats: StubStats) -> Router {
    Router::new()
        .route(PATH_PIXEL, any(handle_pixel))
        .route(PATH_OK, any(handle_ok))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_ECHO, any(handle_echo))
        .with_state(stats)
}

/// In-process stub target bound to an ephemeral localhost port.
pub struct StubServer {
    addr: SocketAddr,
    urls: StubUrls,
    stats: StubStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl StubServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::bind("127.0.0.1:0".parse().map_err(std::io::Error::other)?).await
    }

    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let stats = StubStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::error!(error = %err, "stub server stopped");
            }
        });

        Ok(Self {
            addr,
            urls: StubUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn urls(&self) -> &StubUrls {
        &self.urls
    }

    pub fn stats(&self) -> &StubStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
