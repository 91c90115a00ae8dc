//! Shared constants for things
//!

/// Public URL prefix that stored images are served under
pub const PUBLIC_IMAGE_PREFIX: &str = "/images";

/// Largest multipart request body we accept, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default `control_strength` for sketch requests, also used when the input doesn't parse.
pub const DEFAULT_CONTROL_STRENGTH: f32 = 0.6;

/// Default aspect ratio for generate requests.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Upstream path for text-to-image generation.
pub const GENERATE_CORE_PATH: &str = "v2beta/stable-image/generate/core";

/// Upstream path for search-and-replace edits.
pub const SEARCH_AND_REPLACE_PATH: &str = "v2beta/stable-image/edit/search-and-replace";

/// Upstream path for sketch control.
pub const SKETCH_PATH: &str = "v2beta/stable-image/control/sketch";

/// Upstream path prefix for async results, the generation id is appended.
pub const RESULTS_PATH: &str = "v2beta/results/";

/// Message returned while an async result is still being generated.
pub const PENDING_MESSAGE: &str = "Generation in progress. Please try again later.";
