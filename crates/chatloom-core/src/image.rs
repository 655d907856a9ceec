//! Image-generation port.

use std::future::Future;

use chatloom_types::chat::GeneratedImage;
use chatloom_types::error::ImageError;

/// Turns a text prompt into a reference to a generated image.
///
/// Implementations live in chatloom-infra (e.g., `PollinationsImageGenerator`).
pub trait ImageGenerator: Send + Sync + 'static {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<GeneratedImage, ImageError>> + Send;
}
