//! Recognition client for a Gemini-style vision-language service.
//!
//! Sends every roster reference photo, labeled with name and id, followed
//! by the scene image and a fixed instruction. The service is asked for a
//! JSON object and its reply is validated field by field before it becomes
//! a [`RecognitionOutcome`].

use std::future::Future;
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{EncodedImage, Identity, RecognitionOutcome};

// --- Named constants ---
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const REFERENCE_DELIMITER: &str = "--- END OF REFERENCE PHOTOS ---";
const TARGET_HEADER: &str = "TARGET IMAGE TO ANALYZE:";
const REQUIRED_FIELDS: [&str; 2] = ["presentNames", "absentNames"];
const ERROR_BODY_EXCERPT: usize = 512;

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("recognition requires a non-empty roster")]
    EmptyRoster,
    #[error("no API key configured for the recognition service")]
    MissingCredential,
    #[error("request to recognition service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("recognition service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("recognition service returned an empty response")]
    EmptyResponse,
    #[error("malformed recognition response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("recognition response is not a JSON object")]
    NotAnObject,
    #[error("recognition response is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Anything that can judge which roster members appear in a scene.
///
/// The production implementation is [`GeminiClient`]; tests substitute
/// scripted fakes.
pub trait Recognizer: Send + Sync {
    fn determine_presence<'a>(
        &'a self,
        roster: &'a [Identity],
        scene: &'a EncodedImage,
    ) -> impl Future<Output = Result<RecognitionOutcome, RecognitionError>> + Send + 'a;
}

/// Connection settings for the recognition service.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// HTTP client for the `generateContent` endpoint.
///
/// Cheap to clone; the inner [`reqwest::Client`] is reference-counted.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, RecognitionError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            credential = config.api_key.is_some(),
            "recognition client ready"
        );
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn has_credential(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }

    async fn generate(
        &self,
        roster: &[Identity],
        scene: &EncodedImage,
    ) -> Result<RecognitionOutcome, RecognitionError> {
        if roster.is_empty() {
            return Err(RecognitionError::EmptyRoster);
        }
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(RecognitionError::MissingCredential)?;

        let request = build_request(roster, scene);
        tracing::info!(
            roster = roster.len(),
            scene_bytes = scene.len(),
            model = %self.config.model,
            "sending recognition request"
        );

        let resp = self
            .http
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(RecognitionError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let text = extract_candidate_text(&body)?;
        let outcome = parse_outcome(&text)?;
        tracing::info!(
            present = outcome.present_names.len(),
            absent = outcome.absent_names.len(),
            confidence = outcome.confidence.as_deref().unwrap_or("unspecified"),
            "recognition response parsed"
        );
        Ok(outcome)
    }
}

impl Recognizer for GeminiClient {
    fn determine_presence<'a>(
        &'a self,
        roster: &'a [Identity],
        scene: &'a EncodedImage,
    ) -> impl Future<Output = Result<RecognitionOutcome, RecognitionError>> + Send + 'a {
        self.generate(roster, scene)
    }
}

// ─── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub role: &'static str,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 (standard alphabet, padded) of the encoded image.
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: &'static str,
    pub response_schema: Value,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    fn image(image: &EncodedImage) -> Self {
        Part::Image {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
            },
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Build the ordered multi-part request for one determination.
///
/// Layout: (label, reference photo) per identity in roster order, the
/// delimiter, the target header, the scene image, then the instruction.
pub fn build_request(roster: &[Identity], scene: &EncodedImage) -> GenerateRequest {
    let mut parts = Vec::with_capacity(roster.len() * 2 + 4);

    for identity in roster {
        parts.push(Part::text(format!(
            "Reference Photo for Student Name: \"{}\" (ID: {})",
            identity.display_name, identity.id
        )));
        parts.push(Part::image(&identity.reference_image));
    }

    parts.push(Part::text(REFERENCE_DELIMITER));
    parts.push(Part::text(TARGET_HEADER));
    parts.push(Part::image(scene));
    parts.push(Part::text(instruction(roster.len())));

    GenerateRequest {
        contents: vec![Content { role: "user", parts }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: response_schema(),
        },
    }
}

fn instruction(roster_size: usize) -> String {
    format!(
        "You are an attendance officer.\n\
         1. Reference photos for {roster_size} enrolled students are provided above, \
         each preceded by its name and ID.\n\
         2. The last image is the target image (a classroom or CCTV capture).\n\
         3. Compare the faces in the target image against the reference photos.\n\
         4. Identify which enrolled students are present in the target image.\n\
         5. Return a JSON object with the exact names as given in the reference labels.\n\
         If a face in the target image closely matches a reference photo, \
         list that student in presentNames.\n\
         If a student from the reference list is not found, list them in absentNames."
    )
}

/// Response schema declared to the service.
pub fn response_schema() -> Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "presentNames": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Names of students found in the target image"
            },
            "absentNames": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": "Names of students not found in the target image"
            },
            "confidence": {
                "type": "STRING",
                "description": "High, Medium, or Low confidence in the overall analysis"
            },
            "reasoning": {
                "type": "STRING",
                "description": "Brief explanation of the finding"
            }
        },
        "required": REQUIRED_FIELDS
    })
}

/// Pull the generated text out of a `generateContent` envelope.
fn extract_candidate_text(body: &str) -> Result<String, RecognitionError> {
    if body.trim().is_empty() {
        return Err(RecognitionError::EmptyResponse);
    }
    let envelope: GenerateResponse = serde_json::from_str(body)?;
    let text: String = envelope
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(RecognitionError::EmptyResponse);
    }
    Ok(text)
}

/// Strictly parse the model's JSON answer.
///
/// The reply must be a JSON object carrying both required arrays; anything
/// else is rejected rather than coerced into a partial outcome.
pub fn parse_outcome(text: &str) -> Result<RecognitionOutcome, RecognitionError> {
    if text.trim().is_empty() {
        return Err(RecognitionError::EmptyResponse);
    }
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(RecognitionError::NotAnObject);
    };
    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(RecognitionError::MissingField(field));
        }
    }
    Ok(serde_json::from_value(value)?)
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
