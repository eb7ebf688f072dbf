//! HyperReal Remote: the generation-service boundary.
//!
//! Everything that talks to the generative-image service lives here:
//!
//! - [`GenerationClient`]: the four fallible remote operations the pipeline
//!   sequences (sketch, synthesize, evaluate, caption)
//! - [`GeminiClient`]: HTTPS/JSON transport against a `generateContent` endpoint
//! - [`prompt`]: instruction composition for every operation
//! - [`RemoteCallError`]: the single error type all transports translate into
//! - [`fakes::ScriptedClient`]: deterministic in-memory client for tests
//!
//! ## Layer 0 - Remote boundary
//!
//! Focus: service-specific error translation stays on this side of the trait.

pub mod config;
pub mod error;
pub mod fakes;
pub mod gemini;
pub mod options;
pub mod payload;
pub mod prompt;

use async_trait::async_trait;

pub use config::GeminiConfig;
pub use error::{RemoteCallError, RemoteOperation};
pub use gemini::GeminiClient;
pub use options::{AspectRatio, GenerationOptions, ImageSize, StyleMode};
pub use payload::ImagePayload;
pub use prompt::{IdentityFocus, GLOBAL_NEGATIVE_PROMPT};

/// Result type for remote generation calls.
pub type Result<T> = std::result::Result<T, RemoteCallError>;

/// One identity reference handed to the synthesizer, already transformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityReference {
    /// Human-readable role of the image in the prompt's image map.
    pub label: String,
    pub payload: ImagePayload,
}

/// Everything the synthesizer needs for one candidate batch.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    /// Scene prompt describing the shot.
    pub prompt: String,
    /// Pose skeleton; when present it is sent before any reference.
    pub sketch: Option<ImagePayload>,
    /// Identity references in the order chosen by the reference selector.
    pub references: Vec<IdentityReference>,
    /// Which reference should dominate identity for this scene.
    pub identity_focus: IdentityFocus,
    pub options: GenerationOptions,
}

/// The remote generative-image service, as seen by the pipeline.
///
/// Each operation is independently fallible. Implementations own all
/// transport-specific error translation and must surface failures as
/// [`RemoteCallError`].
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Produce a faceless, high-contrast pose skeleton for `pose_text`.
    async fn generate_sketch(&self, pose_text: &str, aspect_ratio: AspectRatio)
        -> Result<ImagePayload>;

    /// Synthesize one or more candidate images. An empty batch is an error.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<ImagePayload>>;

    /// Score an image in `[0, 10]`. Unparseable verdicts score 0.
    async fn evaluate_quality(&self, image: &ImagePayload) -> Result<u8>;

    /// Describe an image as a training caption starting with `trigger_label`.
    ///
    /// May return an empty string; callers fall back to a local caption.
    async fn caption(&self, image: &ImagePayload, trigger_label: &str) -> Result<String>;
}
