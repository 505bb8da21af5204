//! HTTP control endpoint
//!
//! Uses hyper http1 with TokioIo; one task per connection. Push endpoints
//! take their targets from the query string and the message from the raw
//! request body. Every reply is `{code, message, data}` JSON.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::APP_ID;
use crate::discovery::Resolver;
use crate::logic::{Logic, PushDispatcher, PushReport};
use crate::model::encode_room_key;
use crate::types::{HeraldError, Result};

/// Shared application state
pub struct AppState {
    pub logic: Arc<Logic>,
    pub dispatcher: Arc<PushDispatcher>,
    pub resolver: Arc<Resolver>,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        logic: Arc<Logic>,
        dispatcher: Arc<PushDispatcher>,
        resolver: Arc<Resolver>,
    ) -> Self {
        Self {
            logic,
            dispatcher,
            resolver,
            started: Instant::now(),
        }
    }
}

/// JSON reply envelope
#[derive(Debug, Serialize)]
pub struct Reply<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PushKeysQuery {
    operation: i32,
    keys: String,
}

#[derive(Debug, Deserialize)]
struct PushMidsQuery {
    operation: i32,
    mids: String,
}

#[derive(Debug, Deserialize)]
struct PushRoomQuery {
    operation: i32,
    #[serde(rename = "type")]
    typ: String,
    room: String,
}

#[derive(Debug, Deserialize)]
struct PushAllQuery {
    operation: i32,
    #[serde(default)]
    speed: i32,
}

#[derive(Debug, Deserialize)]
struct OnlineRoomQuery {
    #[serde(rename = "type")]
    typ: String,
    rooms: String,
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    uptime: u64,
    closed: bool,
}

/// Running HTTP server
pub struct HttpServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tracker: TaskTracker,
    acceptor: JoinHandle<()>,
}

impl HttpServer {
    /// Bind `addr` and start accepting connections
    pub async fn start(addr: SocketAddr, state: Arc<AppState>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("HTTP control endpoint listening on {}", local_addr);

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let acceptor = {
            let cancel = cancel.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        accepted = listener.accept() => match accepted {
                            Ok((stream, peer)) => {
                                let state = Arc::clone(&state);
                                let cancel = cancel.clone();
                                tracker.spawn(serve_connection(stream, peer, state, cancel));
                            }
                            Err(e) => error!("Error accepting connection: {:?}", e),
                        }
                    }
                }
                tracker.close();
            })
        };

        Ok(Self {
            local_addr,
            cancel,
            tracker,
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let open connections finish, bounded by `drain`
    pub async fn graceful_stop(self, drain: Duration) {
        self.cancel.cancel();
        if let Err(e) = self.acceptor.await {
            error!("HTTP acceptor task failed: {}", e);
        }
        if tokio::time::timeout(drain, self.tracker.wait()).await.is_err() {
            warn!(
                "HTTP drain timed out with {} connection(s) open",
                self.tracker.len()
            );
        } else {
            info!("HTTP server stopped");
        }
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    state: Arc<AppState>,
    cancel: CancellationToken,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let state = Arc::clone(&state);
        async move { handle_request(state, peer, req).await }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);
    tokio::select! {
        res = conn.as_mut() => {
            if let Err(err) = res {
                debug!("Error serving connection from {}: {:?}", peer, err);
            }
        }
        _ = cancel.cancelled() => {
            conn.as_mut().graceful_shutdown();
            if let Err(err) = conn.as_mut().await {
                debug!("Error closing connection from {}: {:?}", peer, err);
            }
        }
    }
}

async fn handle_request(
    state: Arc<AppState>,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    debug!("[{}] {} {}", peer, method, path);

    let body = req.into_body().collect().await?.to_bytes();
    Ok(route(&state, &method, &path, &query, body).await)
}

/// Dispatch one request to its handler
pub async fn route(
    state: &AppState,
    method: &Method,
    path: &str,
    query: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::POST, "/push/keys") => {
            let result: Result<PushReport> = async {
                let q: PushKeysQuery = parse_query(query)?;
                let keys = split_list(&q.keys);
                if keys.is_empty() {
                    return Err(HeraldError::BadRequest("keys must not be empty".into()));
                }
                state.dispatcher.push_keys(q.operation, &keys, body, None).await
            }
            .await;
            push_response(result)
        }
        (&Method::POST, "/push/mids") => {
            let result: Result<PushReport> = async {
                let q: PushMidsQuery = parse_query(query)?;
                let mids = parse_mids(&q.mids)?;
                state.dispatcher.push_mids(q.operation, &mids, body, None).await
            }
            .await;
            push_response(result)
        }
        (&Method::POST, "/push/room") => {
            let result: Result<PushReport> = async {
                let q: PushRoomQuery = parse_query(query)?;
                if q.typ.is_empty() || q.room.is_empty() {
                    return Err(HeraldError::BadRequest("type and room are required".into()));
                }
                state
                    .dispatcher
                    .push_room(q.operation, &q.typ, &q.room, body, None)
                    .await
            }
            .await;
            push_response(result)
        }
        (&Method::POST, "/push/all") => {
            let result: Result<PushReport> = async {
                let q: PushAllQuery = parse_query(query)?;
                state
                    .dispatcher
                    .push_all(q.operation, q.speed, body, None)
                    .await
            }
            .await;
            push_response(result)
        }
        (&Method::GET, "/online/room") => match parse_query::<OnlineRoomQuery>(query) {
            Ok(q) => {
                let counts: std::collections::HashMap<String, i32> = split_list(&q.rooms)
                    .into_iter()
                    .map(|room| {
                        let key = encode_room_key(&q.typ, &room);
                        let count = state.logic.online().room_count(&key);
                        (room, count)
                    })
                    .collect();
                ok_response(counts)
            }
            Err(e) => error_response(&e),
        },
        (&Method::GET, "/nodes") => ok_response(state.resolver.instances(APP_ID)),
        (&Method::GET, "/health") => ok_response(Health {
            status: if state.logic.is_closed() { "closing" } else { "online" },
            version: env!("CARGO_PKG_VERSION"),
            uptime: state.started.elapsed().as_secs(),
            closed: state.logic.is_closed(),
        }),
        _ => error_response(&HeraldError::NotFound(format!("{method} {path}"))),
    }
}

fn parse_query<T: for<'de> Deserialize<'de>>(query: &str) -> Result<T> {
    serde_urlencoded::from_str(query).map_err(|e| HeraldError::BadRequest(e.to_string()))
}

/// Comma-separated list, empty items dropped
fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_mids(list: &str) -> Result<Vec<i64>> {
    let mids = split_list(list)
        .iter()
        .map(|m| m.parse::<i64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| HeraldError::BadRequest(format!("invalid mids: {e}")))?;
    if mids.is_empty() {
        return Err(HeraldError::BadRequest("mids must not be empty".into()));
    }
    Ok(mids)
}

fn push_response(result: Result<PushReport>) -> Response<Full<Bytes>> {
    match result {
        Ok(report) => ok_response(report),
        Err(HeraldError::PartialPush(failure)) => {
            warn!("Partial push: {}", failure);
            let message = failure.to_string();
            json_response(
                StatusCode::BAD_GATEWAY,
                &Reply {
                    code: StatusCode::BAD_GATEWAY.as_u16() as i32,
                    message,
                    data: Some(failure),
                },
            )
        }
        Err(e) => error_response(&e),
    }
}

fn ok_response<T: Serialize>(data: T) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &Reply {
            code: 0,
            message: "ok".to_string(),
            data: Some(data),
        },
    )
}

fn error_response(e: &HeraldError) -> Response<Full<Bytes>> {
    let status = e.status_code();
    if status.is_server_error() {
        error!("Request failed: {}", e);
    }
    json_response(
        status,
        &Reply::<()> {
            code: status.as_u16() as i32,
            message: e.to_string(),
            data: None,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, reply: &Reply<T>) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec(reply) {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to encode reply: {}", e);
            br#"{"code":500,"message":"encode failure"}"#.to_vec()
        }
    };
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
