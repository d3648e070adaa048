use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// How the mock server answers one identifier.
#[derive(Debug, Clone)]
pub enum MockReply {
    Json,
    Status(u16, &'static str),
    Delay(Duration),
    /// Raw bytes with a 200 status.
    Bytes(&'static [u8]),
    /// `len` bytes with a `content-length` header.
    Sized(usize),
    /// `len` bytes sent chunked, without a declared length.
    Streamed(usize),
}

type ReplyPolicy = Arc<dyn Fn(&str) -> MockReply + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub identifier: Option<String>,
    pub headers: HashMap<String, String>,
}

#[derive(Clone)]
struct ServerState {
    policy: ReplyPolicy,
    id_param: Option<String>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

pub struct MockHttpServer {
    url: String,
    state: ServerState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockHttpServer {
    /// Starts a server that reads the identifier from the last path segment.
    pub async fn start<F>(policy: F) -> Result<Self>
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        Self::start_with_param(None, policy).await
    }

    /// Starts a server that reads the identifier from the `param` query pair
    /// when given, otherwise from the last path segment.
    pub async fn start_with_param<F>(param: Option<&str>, policy: F) -> Result<Self>
    where
        F: Fn(&str) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock HTTP listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let state = ServerState {
            policy: Arc::new(policy),
            id_param: param.map(str::to_owned),
            requests: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let service_state = state.clone();
        let make_service = make_service_fn(move |_| {
            let state = service_state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(state.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock HTTP server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{addr}"),
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .expect("mock request log poisoned")
            .clone()
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|request| request.identifier)
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.state.peak_in_flight.load(Ordering::SeqCst)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(state: ServerState, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak_in_flight.fetch_max(current, Ordering::SeqCst);

    let response = respond(&state, req).await;

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    Ok(response)
}

async fn respond(state: &ServerState, req: Request<Body>) -> Response<Body> {
    let identifier = extract_identifier(&req, state.id_param.as_deref());
    let headers = req
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                value.to_str().unwrap_or_default().to_owned(),
            )
        })
        .collect();

    state
        .requests
        .lock()
        .expect("mock request log poisoned")
        .push(RecordedRequest {
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            identifier: identifier.clone(),
            headers,
        });

    if req.method() != Method::GET {
        return with_status(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method");
    }

    let Some(identifier) = identifier else {
        return with_status(StatusCode::BAD_REQUEST, "missing identifier");
    };

    match (state.policy)(&identifier) {
        MockReply::Json => json_reply(&identifier),
        MockReply::Status(code, body) => with_status(
            StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        ),
        MockReply::Delay(delay) => {
            tokio::time::sleep(delay).await;
            json_reply(&identifier)
        }
        MockReply::Bytes(bytes) => Response::new(Body::from(bytes)),
        MockReply::Sized(len) => Response::new(Body::from(vec![b'a'; len])),
        MockReply::Streamed(len) => {
            let chunks = vec![b'a'; len]
                .chunks(64 * 1024)
                .map(|chunk| Ok::<_, Infallible>(chunk.to_vec()))
                .collect::<Vec<_>>();
            Response::new(Body::wrap_stream(futures::stream::iter(chunks)))
        }
    }
}

fn extract_identifier(req: &Request<Body>, param: Option<&str>) -> Option<String> {
    let url = Url::parse(&format!("http://mock{}", req.uri())).ok()?;
    match param {
        Some(param) => url
            .query_pairs()
            .find(|(key, _)| key == param)
            .map(|(_, value)| value.into_owned()),
        None => {
            let segment = url.path_segments()?.last()?.to_owned();
            url::form_urlencoded::parse(format!("id={segment}").as_bytes())
                .next()
                .map(|(_, value)| value.into_owned())
        }
    }
}

fn json_reply(identifier: &str) -> Response<Body> {
    let body = json!({ "id": identifier, "ok": true });
    let mut response = Response::new(Body::from(body.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn with_status(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}
