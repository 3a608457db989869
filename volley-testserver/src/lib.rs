//! In-memory stand-in for the link-shortening service targeted by the built-in simulation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_LINKS: &str = "/links";
pub const PATH_LINK_STATS: &str = "/links/{slug}";
pub const PATH_REDIRECT: &str = "/{slug}";
pub const PATH_SLOW: &str = "/slow";

pub const SLOW_DELAY: Duration = Duration::from_millis(200);

const GENERATED_SLUG_LEN: usize = 7;
const SLUG_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    links_created: Arc<AtomicU64>,
    redirects: Arc<AtomicU64>,
    conflicts: Arc<AtomicU64>,
    not_found: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn links_created(&self) -> u64 {
        self.links_created.load(Ordering::Relaxed)
    }

    pub fn redirects(&self) -> u64 {
        self.redirects.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn not_found(&self) -> u64 {
        self.not_found.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Link {
    url: String,
    clicks: AtomicU64,
}

/// Shared link table plus request counters.
#[derive(Debug, Clone)]
pub struct LinkStore {
    links: Arc<DashMap<String, Link>>,
    next_id: Arc<AtomicU64>,
    base_url: Arc<str>,
    stats: TestServerStats,
}

impl LinkStore {
    pub fn new(base_url: impl Into<Arc<str>>) -> Self {
        Self {
            links: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
            base_url: base_url.into(),
            stats: TestServerStats::default(),
        }
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub fn clicks(&self, slug: &str) -> Option<u64> {
        self.links
            .get(slug)
            .map(|l| l.clicks.load(Ordering::Relaxed))
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn generate_slug(&self) -> String {
        // Spread sequential ids over the alphabet; collisions are resolved by the caller.
        let mut n = self
            .next_id
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let base = SLUG_ALPHABET.len() as u64;
        (0..GENERATED_SLUG_LEN)
            .map(|_| {
                let c = SLUG_ALPHABET[(n % base) as usize] as char;
                n /= base;
                c
            })
            .collect()
    }
}

fn is_valid_slug(slug: &str) -> bool {
    (3..=30).contains(&slug.len())
        && slug
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn is_valid_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|u| u.has_host())
}

#[derive(Debug, Deserialize)]
struct CreateLink {
    url: String,
    slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedLink {
    slug: String,
    short_url: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct LinkStats {
    slug: String,
    url: String,
    clicks: u64,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn handle_create(State(store): State<LinkStore>, body: Bytes) -> Response {
    TestServerStats::inc(&store.stats.requests_total);

    let req: CreateLink = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return error(StatusCode::BAD_REQUEST, "invalid json"),
    };
    if !is_valid_url(&req.url) {
        return error(StatusCode::BAD_REQUEST, "invalid url");
    }

    let explicit = req.slug.is_some();
    let slug = match req.slug {
        Some(slug) if is_valid_slug(&slug) => slug,
        Some(_) => return error(StatusCode::BAD_REQUEST, "invalid slug"),
        None => store.generate_slug(),
    };

    match store.links.entry(slug.clone()) {
        Entry::Occupied(_) => {
            TestServerStats::inc(&store.stats.conflicts);
            let message = if explicit {
                "slug already in use"
            } else {
                "generated slug collided"
            };
            error(StatusCode::CONFLICT, message)
        }
        Entry::Vacant(v) => {
            v.insert(Link {
                url: req.url.clone(),
                clicks: AtomicU64::new(0),
            });
            TestServerStats::inc(&store.stats.links_created);

            let created = CreatedLink {
                short_url: format!("{}/{slug}", store.base_url),
                slug,
                url: req.url,
            };
            (StatusCode::CREATED, Json(created)).into_response()
        }
    }
}

async fn handle_redirect(State(store): State<LinkStore>, Path(slug): Path<String>) -> Response {
    TestServerStats::inc(&store.stats.requests_total);

    let Some(link) = store.links.get(&slug) else {
        TestServerStats::inc(&store.stats.not_found);
        return error(StatusCode::NOT_FOUND, "not found");
    };

    link.clicks.fetch_add(1, Ordering::Relaxed);
    TestServerStats::inc(&store.stats.redirects);
    (StatusCode::FOUND, [(header::LOCATION, link.url.clone())]).into_response()
}

async fn handle_stats(State(store): State<LinkStore>, Path(slug): Path<String>) -> Response {
    TestServerStats::inc(&store.stats.requests_total);

    let Some(link) = store.links.get(&slug) else {
        TestServerStats::inc(&store.stats.not_found);
        return error(StatusCode::NOT_FOUND, "not found");
    };

    let stats = LinkStats {
        slug,
        url: link.url.clone(),
        clicks: link.clicks.load(Ordering::Relaxed),
    };
    (StatusCode::OK, Json(stats)).into_response()
}

async fn handle_slow(State(store): State<LinkStore>) -> &'static str {
    TestServerStats::inc(&store.stats.requests_total);
    sleep(SLOW_DELAY).await;
    "slow"
}

pub fn router(store: LinkStore) -> Router {
    Router::new()
        .route(PATH_LINKS, post(handle_create))
        .route(PATH_LINK_STATS, get(handle_stats))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_REDIRECT, get(handle_redirect))
        .with_state(store)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    store: LinkStore,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{addr}");

        let store = LinkStore::new(base_url.as_str());
        let app = router(store.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url,
            store,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        self.store.stats()
    }

    pub fn store(&self) -> &LinkStore {
        &self.store
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

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
