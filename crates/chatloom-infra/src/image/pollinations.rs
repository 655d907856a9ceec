//! Pollinations image generator.
//!
//! Pollinations renders an image for any prompt embedded in the URL path,
//! so "generating" an image means building that URL. The image itself is
//! fetched by whatever displays it.

use chatloom_core::image::ImageGenerator;
use chatloom_types::chat::GeneratedImage;
use chatloom_types::error::ImageError;
use reqwest::Url;

pub const DEFAULT_BASE_URL: &str = "https://image.pollinations.ai/prompt/";

/// Model tag recorded on every generated image.
pub const MODEL_TAG: &str = "Pollinations AI";

const PROMPT_SUFFIX: &str = ", professional, high quality, detailed, photorealistic";

#[derive(Debug, Clone)]
pub struct PollinationsImageGenerator {
    base_url: String,
}

impl PollinationsImageGenerator {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// URL rendering `prompt` with the quality suffix, percent-encoded as
    /// a single path segment.
    pub fn image_url(&self, prompt: &str) -> Result<String, ImageError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ImageError::Unavailable(format!("invalid base URL: {e}")))?;
        let enhanced = format!("{prompt}{PROMPT_SUFFIX}");
        url.path_segments_mut()
            .map_err(|_| ImageError::Unavailable("base URL cannot take a path".to_string()))?
            .pop_if_empty()
            .push(&enhanced);
        Ok(url.into())
    }
}

impl Default for PollinationsImageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageGenerator for PollinationsImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ImageError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ImageError::EmptyPrompt);
        }

        let url = self.image_url(prompt)?;
        tracing::debug!(%url, "image url built");

        Ok(GeneratedImage {
            url,
            prompt: prompt.to_string(),
            model: MODEL_TAG.to_string(),
        })
    }
}
