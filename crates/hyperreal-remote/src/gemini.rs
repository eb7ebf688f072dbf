//! HTTPS transport for a `generateContent`-style generation service.
//!
//! Images travel as base64 `inlineData` parts. Every failure mode of the
//! service is folded into [`RemoteCallError`] here so the pipeline never sees
//! transport details.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeminiConfig;
use crate::error::{RemoteCallError, RemoteOperation};
use crate::options::{AspectRatio, ImageSize};
use crate::payload::ImagePayload;
use crate::prompt;
use crate::{GenerationClient, Result, SynthesisRequest};

const USER_AGENT: &str = concat!("hyperreal-remote/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfigWire>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: String) -> Self {
        Part {
            text: Some(text),
            inline_data: None,
        }
    }

    fn image(payload: &ImagePayload) -> Self {
        Part {
            text: None,
            inline_data: Some(InlineData {
                mime_type: payload.mime_type().to_string(),
                data: payload.to_base64(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfigWire {
    image_config: ImageConfigWire,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfigWire {
    aspect_ratio: AspectRatio,
    image_size: ImageSize,
}

#[derive(Debug, Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl GenerateResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    fn images(&self) -> Result<Vec<ImagePayload>> {
        self.first_parts()
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .filter(|d| !d.data.is_empty())
            .map(|d| ImagePayload::from_base64(d.mime_type.clone(), &d.data))
            .collect()
    }

    fn first_text(&self) -> String {
        self.first_parts()
            .iter()
            .find_map(|p| p.text.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Generation client backed by the `generateContent` HTTP API.
pub struct GeminiClient {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new client
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(GeminiClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env())
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn generate(
        &self,
        operation: RemoteOperation,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RemoteCallError::MissingApiKey)?;

        debug!(operation = %operation, model = %model, "Calling generation service");

        let response = self
            .http_client
            .post(self.config.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(operation = %operation, status = status.as_u16(), "Generation service error");

            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
                || message.contains("Requested entity was not found")
            {
                return Err(RemoteCallError::InvalidApiKey);
            }
            return Err(RemoteCallError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate_sketch(
        &self,
        pose_text: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<ImagePayload> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part::text(prompt::sketch_instruction(pose_text))],
            }],
            generation_config: Some(GenerationConfigWire {
                image_config: ImageConfigWire {
                    aspect_ratio,
                    image_size: ImageSize::OneK,
                },
            }),
        };

        let response = self
            .generate(RemoteOperation::Sketch, &self.config.image_model, &request)
            .await?;
        response
            .images()?
            .into_iter()
            .next()
            .ok_or(RemoteCallError::EmptyResult {
                operation: RemoteOperation::Sketch,
            })
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<ImagePayload>> {
        let mut parts = Vec::with_capacity(request.references.len() + 2);
        if let Some(sketch) = &request.sketch {
            parts.push(Part::image(sketch));
        }
        for reference in &request.references {
            parts.push(Part::image(&reference.payload));
        }
        parts.push(Part::text(prompt::synthesis_instruction(request)));

        let wire = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: Some(GenerationConfigWire {
                image_config: ImageConfigWire {
                    aspect_ratio: request.options.aspect_ratio,
                    image_size: request.options.image_size,
                },
            }),
        };

        let response = self
            .generate(RemoteOperation::Synthesize, &self.config.image_model, &wire)
            .await?;
        let images = response.images()?;
        if images.is_empty() {
            return Err(RemoteCallError::EmptyResult {
                operation: RemoteOperation::Synthesize,
            });
        }
        Ok(images)
    }

    async fn evaluate_quality(&self, image: &ImagePayload) -> Result<u8> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::image(image),
                    Part::text(prompt::JUDGE_INSTRUCTION.to_string()),
                ],
            }],
            generation_config: None,
        };

        let response = self
            .generate(RemoteOperation::Evaluate, &self.config.vision_model, &request)
            .await?;
        Ok(prompt::parse_score(&response.first_text()))
    }

    async fn caption(&self, image: &ImagePayload, trigger_label: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::image(image),
                    Part::text(prompt::caption_instruction(trigger_label)),
                ],
            }],
            generation_config: None,
        };

        let response = self
            .generate(RemoteOperation::Caption, &self.config.vision_model, &request)
            .await?;
        Ok(response.first_text())
    }
}
