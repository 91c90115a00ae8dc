//! Stand-in for the upstream image API, bound to a local port for the duration of a test.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header::{ACCEPT, AUTHORIZATION};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::store::ImageStore;

pub(crate) const TEST_API_KEY: &str = "test-key";

#[derive(Clone, Debug)]
pub(crate) struct ReceivedRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) authorization: Option<String>,
    pub(crate) accept: Option<String>,
    pub(crate) fields: HashMap<String, String>,
    /// file name and contents of the `image` part
    pub(crate) file: Option<(String, Vec<u8>)>,
}

#[derive(Clone, Default)]
struct StubState {
    replies: Arc<Mutex<VecDeque<(StatusCode, Vec<u8>)>>>,
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
}

pub(crate) struct StubUpstream {
    pub(crate) base_url: Url,
    state: StubState,
}

impl StubUpstream {
    /// Replies are used in order, the last one repeats forever.
    pub(crate) async fn start(replies: Vec<(StatusCode, Vec<u8>)>) -> Self {
        let state = StubState {
            replies: Arc::new(Mutex::new(replies.into())),
            received: Arc::default(),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub upstream");
        let addr = listener.local_addr().expect("stub address");
        let app = Router::new().fallback(record).with_state(state.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let base_url = Url::parse(&format!("http://{addr}/")).expect("stub url");
        Self { base_url, state }
    }

    pub(crate) fn received(&self) -> Vec<ReceivedRequest> {
        self.state.received.lock().expect("received lock").clone()
    }

    pub(crate) fn gateway(&self, image_dir: &Path) -> Gateway {
        Gateway::new(
            GatewayConfig::new(TEST_API_KEY, self.base_url.clone()),
            ImageStore::new(image_dir),
        )
    }
}

fn header(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

async fn record(
    State(state): State<StubState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut fields = HashMap::new();
    let mut file = None;
    if let Ok(mut multipart) = multipart {
        while let Ok(Some(field)) = multipart.next_field().await {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_owned) {
                Some(file_name) => {
                    let bytes = field.bytes().await.expect("stub file part");
                    file = Some((file_name, bytes.to_vec()));
                }
                None => {
                    let value = field.text().await.expect("stub text part");
                    fields.insert(name, value);
                }
            }
        }
    }

    state
        .received
        .lock()
        .expect("received lock")
        .push(ReceivedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            authorization: header(&headers, AUTHORIZATION),
            accept: header(&headers, ACCEPT),
            fields,
            file,
        });

    let reply = {
        let mut replies = state.replies.lock().expect("replies lock");
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    };
    match reply {
        Some((status, body)) => (status, body).into_response(),
        None => StatusCode::NOT_IMPLEMENTED.into_response(),
    }
}
