//! Mock REST venue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

/// A request as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Path without query
    pub path: String,
    /// Raw query string, empty if none
    pub query: String,
    /// Headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Body as text
    pub body: String,
}

impl RecordedRequest {
    /// Header value by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

#[derive(Default)]
struct MockState {
    /// (method, path) -> queued (status, body); the last entry repeats
    routes: Mutex<HashMap<(String, String), VecDeque<(u16, String)>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Local HTTP server answering with canned responses.
///
/// Unrouted requests get `404 {"label":"NO_ROUTE"}`.
pub struct MockRestServer {
    base_url: String,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockRestServer {
    /// Bind to an ephemeral local port and start serving.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState::default());

        let app = Router::new().fallback(serve_route).with_state(state.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                debug!(error = %e, "Mock REST server stopped");
            }
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        })
    }

    /// Base URL to point an adapter at.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Serve `body` with `status` for `method path`, replacing any earlier route.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        self.respond_sequence(method, path, vec![(status, body.into())]);
    }

    /// Serve `responses` to successive `method path` requests, repeating the
    /// last one once the rest are used up.
    pub fn respond_sequence(&self, method: &str, path: &str, responses: Vec<(u16, String)>) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert((method.to_uppercase(), path.to_string()), responses.into());
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Requests received for `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

impl Drop for MockRestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_route(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_lowercase(), value.to_string()))
        })
        .collect();

    let request = RecordedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        headers,
        body,
    };
    debug!(method = %request.method, path = %request.path, "Mock REST request");

    let route = {
        let mut routes = state.routes.lock().unwrap();
        routes
            .get_mut(&(request.method.clone(), request.path.clone()))
            .and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
    };
    state.requests.lock().unwrap().push(request);

    match route {
        Some((status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"label":"NO_ROUTE"}"#,
        )
            .into_response(),
    }
}
