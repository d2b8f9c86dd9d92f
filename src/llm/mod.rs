pub mod gemini;
pub mod media;

pub use gemini::{
    generate_image, GeminiImageConfig, ImageGenerationError, INVALID_CREDENTIAL_SIGNATURE,
};
