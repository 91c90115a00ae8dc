//! Normalized generation requests and the per-kind pieces the pipeline needs:
//! validation, the upstream call, and how the stored file gets named.

use std::fmt;
use std::str::FromStr;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};

use crate::constants::{
    DEFAULT_ASPECT_RATIO, DEFAULT_CONTROL_STRENGTH, GENERATE_CORE_PATH, RESULTS_PATH,
    SEARCH_AND_REPLACE_PATH, SKETCH_PATH,
};
use crate::error::GatewayError;

/// The four supported image operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GenerationKind {
    /// Text to image.
    Generate,
    /// Replace an object found by a search prompt.
    SearchReplace,
    /// Image guided by a sketch.
    Sketch,
    /// Fetch a finished async (upscale) result by id.
    UpscaleFetch,
}

impl GenerationKind {
    /// Prefix of the stored file name.
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Generate => "generated",
            Self::SearchReplace => "search-replace",
            Self::Sketch => "sketch",
            Self::UpscaleFetch => "upscaled",
        }
    }

    /// What the caller sees when something unexpected goes wrong.
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Generate => "An error occurred while generating the image",
            Self::SearchReplace => "An error occurred during search and replace",
            Self::Sketch => "An error occurred during sketch processing",
            Self::UpscaleFetch => "An error occurred while upscaling the image",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Generate => "generate",
            Self::SearchReplace => "search-replace",
            Self::Sketch => "sketch",
            Self::UpscaleFetch => "upscale-fetch",
        };
        f.write_str(name)
    }
}

/// Image format requested from the upstream API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// `png`
    Png,
    /// `jpg`, sent upstream as `jpeg`
    Jpeg,
    /// `webp`
    Webp,
}

impl OutputFormat {
    /// Extension of the stored file.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    /// Value of the upstream `output_format` field.
    pub fn api_value(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    /// Parses an optional form value, where missing or blank means `default`.
    pub fn parse_or(value: Option<&str>, default: Self) -> Result<Self, GatewayError> {
        match value.map(str::trim) {
            None | Some("") => Ok(default),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            _ => Err(GatewayError::InvalidOutputFormat(s.to_string())),
        }
    }
}

/// How strongly a sketch constrains the output, always within `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlStrength(f32);

impl ControlStrength {
    /// Clamps into range. Non-finite values become the default.
    pub fn new(value: f32) -> Self {
        if value.is_finite() {
            Self(value.clamp(0.0, 1.0))
        } else {
            Self::default()
        }
    }

    /// Parses a raw form value. Anything that isn't a number silently becomes the default.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.trim().parse::<f32>().ok())
            .map(Self::new)
            .unwrap_or_default()
    }

    /// The strength as a float.
    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for ControlStrength {
    fn default() -> Self {
        Self(DEFAULT_CONTROL_STRENGTH)
    }
}

/// An uploaded input image.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    /// Raw file contents.
    pub bytes: Bytes,
    /// File name the client sent.
    pub file_name: String,
    /// Content type the client sent, if any.
    pub content_type: Option<String>,
}

impl ImageUpload {
    /// Upload without a content type.
    pub fn new(bytes: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: file_name.into(),
            content_type: None,
        }
    }

    fn into_part(self) -> Result<Part, GatewayError> {
        let part = Part::bytes(self.bytes.to_vec()).file_name(self.file_name);
        match self.content_type {
            Some(content_type) => part.mime_str(&content_type).map_err(|err| {
                GatewayError::BadRequest(format!("Invalid image content type: {err}"))
            }),
            None => Ok(part),
        }
    }
}

/// Parameters for [GenerationRequest::Generate].
#[derive(Clone, Debug)]
pub struct GenerateParams {
    /// What to draw.
    pub prompt: String,
    /// What not to draw, omitted upstream when blank.
    pub negative_prompt: Option<String>,
    /// eg `1:1`, `16:9`
    pub aspect_ratio: String,
    /// 0 lets the upstream pick a random seed.
    pub seed: u32,
    /// Omitted upstream when blank.
    pub style_preset: Option<String>,
    /// Defaults to png.
    pub output_format: OutputFormat,
}

impl GenerateParams {
    /// Params with every optional field at its default.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            seed: 0,
            style_preset: None,
            output_format: OutputFormat::Png,
        }
    }
}

/// Parameters for [GenerationRequest::SearchReplace].
#[derive(Clone, Debug)]
pub struct SearchReplaceParams {
    /// What to put in place of the found object.
    pub prompt: String,
    /// What to look for.
    pub search_prompt: String,
    /// Defaults to webp.
    pub output_format: OutputFormat,
    /// Required, the request is rejected without it.
    pub image: Option<ImageUpload>,
}

/// Parameters for [GenerationRequest::Sketch].
#[derive(Clone, Debug)]
pub struct SketchParams {
    /// What to draw.
    pub prompt: String,
    /// Defaults to 0.6.
    pub control_strength: ControlStrength,
    /// Defaults to webp.
    pub output_format: OutputFormat,
    /// Required, the request is rejected without it.
    pub image: Option<ImageUpload>,
}

/// One normalized request for the gateway.
#[derive(Clone, Debug)]
pub enum GenerationRequest {
    /// Text to image.
    Generate(GenerateParams),
    /// Search and replace edit.
    SearchReplace(SearchReplaceParams),
    /// Sketch control.
    Sketch(SketchParams),
    /// Fetch an async result.
    UpscaleFetch {
        /// Id returned by the upstream when the job was started.
        generation_id: String,
    },
}

impl GenerationRequest {
    /// Which operation this is.
    pub fn kind(&self) -> GenerationKind {
        match self {
            Self::Generate(_) => GenerationKind::Generate,
            Self::SearchReplace(_) => GenerationKind::SearchReplace,
            Self::Sketch(_) => GenerationKind::Sketch,
            Self::UpscaleFetch { .. } => GenerationKind::UpscaleFetch,
        }
    }

    /// Checks required inputs, this runs before anything goes over the network.
    pub fn validate(&self) -> Result<(), GatewayError> {
        match self {
            Self::Generate(_) => Ok(()),
            Self::SearchReplace(SearchReplaceParams { image, .. })
            | Self::Sketch(SketchParams { image, .. }) => match image {
                Some(image) if !image.bytes.is_empty() => Ok(()),
                _ => Err(GatewayError::MissingImage),
            },
            Self::UpscaleFetch { generation_id } => {
                if generation_id.is_empty() {
                    return Err(GatewayError::MissingGenerationId);
                }
                // the id ends up in both a URL path and a file name
                if !generation_id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    return Err(GatewayError::InvalidGenerationId);
                }
                Ok(())
            }
        }
    }

    pub(crate) fn stored_name(&self) -> StoredName {
        let kind = self.kind();
        match self {
            Self::Generate(params) => StoredName::timestamped(kind, params.output_format),
            Self::SearchReplace(params) => StoredName::timestamped(kind, params.output_format),
            Self::Sketch(params) => StoredName::timestamped(kind, params.output_format),
            Self::UpscaleFetch { generation_id } => StoredName::Fixed(format!(
                "{}-{}.{}",
                kind.file_prefix(),
                generation_id,
                OutputFormat::Webp.extension()
            )),
        }
    }

    pub(crate) fn into_upstream_call(self) -> Result<UpstreamCall, GatewayError> {
        match self {
            Self::Generate(params) => {
                let mut form = Form::new()
                    .text("prompt", params.prompt)
                    .text("aspect_ratio", params.aspect_ratio)
                    .text("seed", params.seed.to_string())
                    .text("output_format", params.output_format.api_value());
                if let Some(negative_prompt) = non_blank(params.negative_prompt) {
                    form = form.text("negative_prompt", negative_prompt);
                }
                if let Some(style_preset) = non_blank(params.style_preset) {
                    form = form.text("style_preset", style_preset);
                }
                Ok(UpstreamCall::post(GENERATE_CORE_PATH, form))
            }
            Self::SearchReplace(params) => {
                let image = params.image.ok_or(GatewayError::MissingImage)?;
                let form = Form::new()
                    .part("image", image.into_part()?)
                    .text("prompt", params.prompt)
                    .text("search_prompt", params.search_prompt)
                    .text("output_format", params.output_format.api_value());
                Ok(UpstreamCall::post(SEARCH_AND_REPLACE_PATH, form))
            }
            Self::Sketch(params) => {
                let image = params.image.ok_or(GatewayError::MissingImage)?;
                let form = Form::new()
                    .part("image", image.into_part()?)
                    .text("prompt", params.prompt)
                    .text(
                        "control_strength",
                        params.control_strength.value().to_string(),
                    )
                    .text("output_format", params.output_format.api_value());
                Ok(UpstreamCall::post(SKETCH_PATH, form))
            }
            Self::UpscaleFetch { generation_id } => Ok(UpstreamCall {
                path: format!("{RESULTS_PATH}{generation_id}"),
                form: None,
            }),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// The single outbound call a request turns into. A form means POST, otherwise GET.
pub(crate) struct UpstreamCall {
    pub(crate) path: String,
    pub(crate) form: Option<Form>,
}

impl UpstreamCall {
    fn post(path: &str, form: Form) -> Self {
        Self {
            path: path.to_string(),
            form: Some(form),
        }
    }
}

/// File name template for a successful result.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum StoredName {
    /// `<prefix>-<unix millis>.<ext>`, resolved when the result arrives.
    Timestamped {
        prefix: &'static str,
        extension: &'static str,
    },
    Fixed(String),
}

impl StoredName {
    fn timestamped(kind: GenerationKind, format: OutputFormat) -> Self {
        Self::Timestamped {
            prefix: kind.file_prefix(),
            extension: format.extension(),
        }
    }

    pub(crate) fn resolve(&self, now: DateTime<Utc>) -> String {
        match self {
            Self::Timestamped { prefix, extension } => {
                format!("{}-{}.{}", prefix, now.timestamp_millis(), extension)
            }
            Self::Fixed(name) => name.clone(),
        }
    }
}
