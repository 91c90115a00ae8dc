//! One handler per generation kind. They only turn request bodies into
//! [GenerationRequest](crate::gateway::GenerationRequest)s, the gateway does the rest.

use std::collections::HashMap;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use tracing::instrument;

use super::prelude::*;
use crate::gateway::{
    ControlStrength, GenerateParams, ImageUpload, OutputFormat, Outcome, SearchReplaceParams,
    SketchParams,
};

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateImageBody {
    #[serde(default)]
    prompt: String,
    negative_prompt: Option<String>,
    aspect_ratio: Option<String>,
    seed: Option<u32>,
    style_preset: Option<String>,
    output_format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpscaleImageBody {
    generation_id: Option<String>,
}

/// Text fields plus the optional `image` upload of a multipart form.
#[derive(Debug, Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    image: Option<ImageUpload>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, GatewayError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field.bytes().await?;
                // browsers send an empty part when no file was picked
                if !bytes.is_empty() {
                    form.image = Some(ImageUpload {
                        bytes,
                        file_name,
                        content_type,
                    });
                }
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn text(&self, name: &str) -> String {
        self.field(name).unwrap_or_default().to_string()
    }

    fn output_format(&self, default: OutputFormat) -> Result<OutputFormat, GatewayError> {
        OutputFormat::parse_or(self.field("output_format"), default)
    }
}

#[instrument(skip_all)]
pub(crate) async fn generate_image_handler(
    State(state): State<AppState>,
    body: Result<Json<GenerateImageBody>, JsonRejection>,
) -> Result<Outcome, GatewayError> {
    let Json(body) = body?;
    let mut params = GenerateParams::new(body.prompt);
    params.negative_prompt = body.negative_prompt;
    if let Some(aspect_ratio) = body.aspect_ratio.filter(|value| !value.trim().is_empty()) {
        params.aspect_ratio = aspect_ratio;
    }
    params.seed = body.seed.unwrap_or_default();
    params.style_preset = body.style_preset;
    params.output_format =
        OutputFormat::parse_or(body.output_format.as_deref(), OutputFormat::Png)?;

    state.gateway.generate(params).await
}

#[instrument(skip_all)]
pub(crate) async fn search_and_replace_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Outcome, GatewayError> {
    let form = UploadForm::read(multipart?).await?;
    let params = SearchReplaceParams {
        prompt: form.text("prompt"),
        search_prompt: form.text("search_prompt"),
        output_format: form.output_format(OutputFormat::Webp)?,
        image: form.image,
    };

    state.gateway.search_replace(params).await
}

#[instrument(skip_all)]
pub(crate) async fn sketch_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Outcome, GatewayError> {
    let form = UploadForm::read(multipart?).await?;
    let params = SketchParams {
        prompt: form.text("prompt"),
        control_strength: ControlStrength::parse(form.field("control_strength")),
        output_format: form.output_format(OutputFormat::Webp)?,
        image: form.image,
    };

    state.gateway.sketch(params).await
}

#[instrument(skip_all, fields(generation_id))]
pub(crate) async fn upscale_image_handler(
    State(state): State<AppState>,
    body: Result<Json<UpscaleImageBody>, JsonRejection>,
) -> Result<Outcome, GatewayError> {
    let Json(body) = body?;
    let generation_id = body.generation_id.unwrap_or_default();
    tracing::Span::current().record("generation_id", generation_id.as_str());

    state.gateway.upscale_fetch(generation_id).await
}
