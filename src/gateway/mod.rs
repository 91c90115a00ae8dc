//! The forward-and-persist pipeline.
//!
//! Every operation goes through [Gateway::execute]: validate, make exactly one upstream call,
//! classify the status, and store the bytes when (and only when) the upstream says 200.

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use reqwest::header::ACCEPT;
use tracing::{debug, info, instrument};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::store::{ImageStore, StoredImage};

mod envelope;
mod request;

pub use envelope::ResultEnvelope;
pub use request::{
    ControlStrength, GenerateParams, GenerationKind, GenerationRequest, ImageUpload,
    OutputFormat, SearchReplaceParams, SketchParams,
};
use request::UpstreamCall;

/// What a successful pipeline run produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The upstream returned an image and it's on disk.
    Stored(StoredImage),
    /// The async result isn't ready yet, nothing was written.
    Pending,
}

impl Outcome {
    /// Status and envelope for the client.
    pub fn into_envelope(self) -> (StatusCode, ResultEnvelope) {
        match self {
            Outcome::Stored(image) => (StatusCode::OK, ResultEnvelope::stored(image.public_url)),
            Outcome::Pending => (StatusCode::ACCEPTED, ResultEnvelope::pending()),
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> axum::response::Response {
        let (status, envelope) = self.into_envelope();
        (status, Json(envelope)).into_response()
    }
}

/// Talks to the upstream image API and files away the results.
#[derive(Clone, Debug)]
pub struct Gateway {
    client: reqwest::Client,
    config: GatewayConfig,
    store: ImageStore,
}

impl Gateway {
    /// Gateway with a default HTTP client.
    pub fn new(config: GatewayConfig, store: ImageStore) -> Self {
        Self::with_client(reqwest::Client::new(), config, store)
    }

    /// Gateway using the given HTTP client.
    pub fn with_client(client: reqwest::Client, config: GatewayConfig, store: ImageStore) -> Self {
        Self {
            client,
            config,
            store,
        }
    }

    /// Where results are written.
    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    /// Text to image.
    pub async fn generate(&self, params: GenerateParams) -> Result<Outcome, GatewayError> {
        self.execute(GenerationRequest::Generate(params)).await
    }

    /// Search and replace edit of an uploaded image.
    pub async fn search_replace(
        &self,
        params: SearchReplaceParams,
    ) -> Result<Outcome, GatewayError> {
        self.execute(GenerationRequest::SearchReplace(params)).await
    }

    /// Image guided by an uploaded sketch.
    pub async fn sketch(&self, params: SketchParams) -> Result<Outcome, GatewayError> {
        self.execute(GenerationRequest::Sketch(params)).await
    }

    /// Polls once for a finished upscale.
    pub async fn upscale_fetch(
        &self,
        generation_id: impl Into<String>,
    ) -> Result<Outcome, GatewayError> {
        self.execute(GenerationRequest::UpscaleFetch {
            generation_id: generation_id.into(),
        })
        .await
    }

    /// Runs one request through the pipeline.
    #[instrument(skip_all, fields(kind = %request.kind()))]
    pub async fn execute(&self, request: GenerationRequest) -> Result<Outcome, GatewayError> {
        request.validate()?;
        let kind = request.kind();
        let stored_name = request.stored_name();
        let call = request.into_upstream_call()?;

        let response = self.send(call).await.map_err(|err| GatewayError::internal(kind, err))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| GatewayError::internal(kind, err))?;
        debug!("Upstream answered {} with {} bytes", status, body.len());

        match status {
            StatusCode::OK => {
                let file_name = stored_name.resolve(Utc::now());
                let stored = self
                    .store
                    .persist(&file_name, &body)
                    .await
                    .map_err(|err| GatewayError::internal(kind, err))?;
                info!("Stored {} result at {}", kind, stored.public_url);
                Ok(Outcome::Stored(stored))
            }
            StatusCode::ACCEPTED if kind == GenerationKind::UpscaleFetch => {
                info!("Upscale result not ready yet");
                Ok(Outcome::Pending)
            }
            _ => Err(GatewayError::Upstream {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
        }
    }

    async fn send(&self, call: UpstreamCall) -> anyhow::Result<reqwest::Response> {
        let url = self.config.api_base_url.join(&call.path)?;
        debug!("Calling upstream {}", url);
        let builder = match call.form {
            Some(form) => self.client.post(url).multipart(form),
            None => self.client.get(url),
        };
        let response = builder
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, "image/*")
            .send()
            .await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::testing::StubUpstream;

    fn image_count(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).expect("read image dir").count()
    }

    fn sketch_params(image: Option<ImageUpload>) -> SketchParams {
        SketchParams {
            prompt: "a medieval castle".to_string(),
            control_strength: ControlStrength::parse(Some("0.7")),
            output_format: OutputFormat::Png,
            image,
        }
    }

    #[tokio::test]
    async fn generate_stores_exactly_one_file() {
        let stub = StubUpstream::start(vec![(StatusCode::OK, b"fox-bytes".to_vec())]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let mut params = GenerateParams::new("a red fox");
        params.negative_prompt = Some("blurry".to_string());
        params.style_preset = Some(String::new());
        params.output_format = OutputFormat::Webp;
        let outcome = gateway.generate(params).await.expect("generate");

        let Outcome::Stored(stored) = outcome else {
            panic!("expected stored outcome");
        };
        assert!(stored.public_url.starts_with("/images/generated-"));
        assert!(stored.public_url.ends_with(".webp"));
        assert_eq!(std::fs::read(&stored.path).expect("read"), b"fox-bytes");
        assert_eq!(image_count(dir.path()), 1);

        let received = stub.received();
        assert_eq!(received.len(), 1);
        let request = &received[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/v2beta/stable-image/generate/core");
        assert_eq!(request.authorization.as_deref(), Some("Bearer test-key"));
        assert_eq!(request.accept.as_deref(), Some("image/*"));
        assert_eq!(request.fields.get("prompt").map(String::as_str), Some("a red fox"));
        assert_eq!(request.fields.get("negative_prompt").map(String::as_str), Some("blurry"));
        assert_eq!(request.fields.get("aspect_ratio").map(String::as_str), Some("1:1"));
        assert_eq!(request.fields.get("seed").map(String::as_str), Some("0"));
        assert_eq!(request.fields.get("output_format").map(String::as_str), Some("webp"));
        assert!(!request.fields.contains_key("style_preset"));
        assert!(request.file.is_none());
    }

    #[tokio::test]
    async fn identical_generates_make_two_files() {
        let stub = StubUpstream::start(vec![(StatusCode::OK, b"same".to_vec())]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let first = gateway
            .generate(GenerateParams::new("a red fox"))
            .await
            .expect("first");
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = gateway
            .generate(GenerateParams::new("a red fox"))
            .await
            .expect("second");

        assert_ne!(first, second);
        assert_eq!(image_count(dir.path()), 2);
    }

    #[tokio::test]
    async fn sketch_sends_image_and_strength() {
        let stub = StubUpstream::start(vec![(StatusCode::OK, b"castle".to_vec())]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let image = ImageUpload::new(b"sketch-bytes".to_vec(), "doodle.png");
        let outcome = gateway
            .sketch(sketch_params(Some(image)))
            .await
            .expect("sketch");
        let Outcome::Stored(stored) = outcome else {
            panic!("expected stored outcome");
        };
        assert!(stored.public_url.starts_with("/images/sketch-"));
        assert!(stored.public_url.ends_with(".png"));

        let received = stub.received();
        let request = &received[0];
        assert_eq!(request.path, "/v2beta/stable-image/control/sketch");
        assert_eq!(
            request.fields.get("control_strength").map(String::as_str),
            Some("0.7")
        );
        assert_eq!(request.fields.get("output_format").map(String::as_str), Some("png"));
        let (file_name, bytes) = request.file.clone().expect("image part");
        assert_eq!(file_name, "doodle.png");
        assert_eq!(bytes, b"sketch-bytes");
    }

    #[tokio::test]
    async fn search_replace_sends_both_prompts() {
        let stub = StubUpstream::start(vec![(StatusCode::OK, b"edited".to_vec())]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let outcome = gateway
            .search_replace(SearchReplaceParams {
                prompt: "a golden retriever".to_string(),
                search_prompt: "cat".to_string(),
                output_format: OutputFormat::Jpeg,
                image: Some(ImageUpload::new(b"photo".to_vec(), "photo.jpg")),
            })
            .await
            .expect("search replace");
        let Outcome::Stored(stored) = outcome else {
            panic!("expected stored outcome");
        };
        assert!(stored.public_url.starts_with("/images/search-replace-"));
        assert!(stored.public_url.ends_with(".jpg"));

        let received = stub.received();
        let request = &received[0];
        assert_eq!(request.path, "/v2beta/stable-image/edit/search-and-replace");
        assert_eq!(request.fields.get("search_prompt").map(String::as_str), Some("cat"));
        assert_eq!(request.fields.get("output_format").map(String::as_str), Some("jpeg"));
    }

    #[tokio::test]
    async fn missing_inputs_never_reach_upstream() {
        let stub = StubUpstream::start(vec![(StatusCode::OK, b"unused".to_vec())]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let err = gateway.sketch(sketch_params(None)).await.expect_err("no image");
        assert!(matches!(err, GatewayError::MissingImage));

        let err = gateway
            .search_replace(SearchReplaceParams {
                prompt: "a dog".to_string(),
                search_prompt: "cat".to_string(),
                output_format: OutputFormat::Webp,
                image: None,
            })
            .await
            .expect_err("no image");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = gateway.upscale_fetch("").await.expect_err("no id");
        assert!(matches!(err, GatewayError::MissingGenerationId));

        assert!(stub.received().is_empty());
        assert_eq!(image_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn upscale_pending_then_ready() {
        let stub = StubUpstream::start(vec![
            (StatusCode::ACCEPTED, b"{\"status\":\"in-progress\"}".to_vec()),
            (StatusCode::OK, b"big-image".to_vec()),
        ])
        .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let pending = gateway.upscale_fetch("abc123").await.expect("pending");
        assert_eq!(pending, Outcome::Pending);
        assert_eq!(image_count(dir.path()), 0);

        let ready = gateway.upscale_fetch("abc123").await.expect("ready");
        let Outcome::Stored(stored) = ready else {
            panic!("expected stored outcome");
        };
        assert_eq!(stored.public_url, "/images/upscaled-abc123.webp");
        assert_eq!(std::fs::read(&stored.path).expect("read"), b"big-image");

        let received = stub.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].method, "GET");
        assert_eq!(received[0].path, "/v2beta/results/abc123");
    }

    #[tokio::test]
    async fn upscale_same_id_overwrites() {
        let stub = StubUpstream::start(vec![
            (StatusCode::OK, b"first".to_vec()),
            (StatusCode::OK, b"second".to_vec()),
        ])
        .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let first = gateway.upscale_fetch("dup").await.expect("first");
        let second = gateway.upscale_fetch("dup").await.expect("second");
        assert_eq!(first, second);
        assert_eq!(image_count(dir.path()), 1);
        assert_eq!(
            std::fs::read(dir.path().join("upscaled-dup.webp")).expect("read"),
            b"second"
        );
    }

    #[tokio::test]
    async fn upstream_errors_pass_through() {
        let stub = StubUpstream::start(vec![(
            StatusCode::FORBIDDEN,
            b"{\"name\":\"content_moderation\"}".to_vec(),
        )])
        .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let err = gateway
            .generate(GenerateParams::new("something rude"))
            .await
            .expect_err("moderated");
        match err {
            GatewayError::Upstream { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "{\"name\":\"content_moderation\"}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(image_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn accepted_is_an_error_outside_upscale() {
        let stub = StubUpstream::start(vec![(StatusCode::ACCEPTED, b"queued".to_vec())]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(dir.path());

        let err = gateway
            .generate(GenerateParams::new("a red fox"))
            .await
            .expect_err("202 is not success");
        assert_eq!(err.status(), StatusCode::ACCEPTED);
        assert_eq!(err.client_message(), "queued");
        assert_eq!(image_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_internal() {
        let dir = tempfile::tempdir().expect("tempdir");
        // bind then drop so nothing is listening on the port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let url = url::Url::parse(&format!("http://{addr}/")).expect("url");
        let gateway = Gateway::new(
            GatewayConfig::new("test-key", url),
            ImageStore::new(dir.path()),
        );

        let err = gateway.upscale_fetch("abc").await.expect_err("connect fails");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.client_message(),
            "An error occurred while upscaling the image"
        );
    }

    #[tokio::test]
    async fn write_failure_is_internal() {
        let stub = StubUpstream::start(vec![(StatusCode::OK, b"bytes".to_vec())]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = stub.gateway(&dir.path().join("does-not-exist"));

        let err = gateway
            .generate(GenerateParams::new("a red fox"))
            .await
            .expect_err("write fails");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.client_message(),
            "An error occurred while generating the image"
        );
    }
}
