//! The envelope carried between stages and the typed shapes it is decoded into.
//!
//! The orchestrator itself never looks inside a [`Payload`]. Adapters decode the
//! previous stage's response into a [`StagePayload`] for its capability, which
//! fails with a [`PayloadShapeError`] naming the offending field instead of a
//! bare key error somewhere deep in a JSON tree.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::service::Capability;

pub const JSON_CONTENT_TYPE: &str = "application/json";
const OCTET_STREAM: &str = "application/octet-stream";

/// Opaque data carried between stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Binary { content_type: String, bytes: Vec<u8> },
}

impl Payload {
    pub fn binary(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Payload::Binary {
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Builds a payload from a raw HTTP response body.
    ///
    /// JSON content types, and bodies without a content type that parse as JSON,
    /// become [`Payload::Json`]. Everything else is kept as binary.
    pub fn from_response(content_type: Option<&str>, body: Vec<u8>) -> Self {
        let looks_json = match content_type {
            Some(ct) => ct.contains("json"),
            None => true,
        };
        if looks_json {
            if let Ok(value) = serde_json::from_slice::<Value>(&body) {
                return Payload::Json(value);
            }
        }
        Payload::Binary {
            content_type: content_type.unwrap_or(OCTET_STREAM).to_string(),
            bytes: body,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Binary { .. } => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Payload::Binary { .. })
    }

    pub fn content_type(&self) -> &str {
        match self {
            Payload::Json(_) => JSON_CONTENT_TYPE,
            Payload::Binary { content_type, .. } => content_type,
        }
    }

    /// Serialized request body.
    pub fn to_body(&self) -> Vec<u8> {
        match self {
            Payload::Json(value) => value.to_string().into_bytes(),
            Payload::Binary { bytes, .. } => bytes.clone(),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// A payload did not have the shape a stage expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, {reason} at '{path}'")]
pub struct PayloadShapeError {
    pub expected: &'static str,
    pub path: String,
    pub reason: String,
}

impl PayloadShapeError {
    pub fn missing(expected: &'static str, path: impl Into<String>) -> Self {
        Self {
            expected,
            path: path.into(),
            reason: "field is missing".to_string(),
        }
    }

    pub fn invalid(
        expected: &'static str,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            expected,
            path: path.into(),
            reason: reason.into(),
        }
    }

    fn not_json(expected: &'static str) -> Self {
        Self::invalid(expected, "$", "payload is binary")
    }
}

/// `{text, language}`, the plain document shape most services accept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDoc {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl TextDoc {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn from_payload(payload: &Payload) -> Result<Self, PayloadShapeError> {
        let value = payload
            .as_json()
            .ok_or_else(|| PayloadShapeError::not_json("text document"))?;
        let text = str_at(value, "/text", "text document")?;
        let language = value
            .get("language")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            text: text.to_string(),
            language,
        })
    }

    pub fn to_payload(&self) -> Payload {
        Payload::Json(serde_json::json!(self))
    }
}

/// Synthesized audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speech {
    pub audio: Vec<u8>,
    pub format: String,
    pub sample_rate: Option<u32>,
}

/// The known payload shapes, one family per capability.
#[derive(Debug, Clone, PartialEq)]
pub enum StagePayload {
    Text(TextDoc),
    Embedding { embedding: Vec<f32>, dimensions: usize },
    Completion { content: String },
    Translation { translated_text: String },
    Examples { examples: String },
    Speech(Speech),
}

impl StagePayload {
    /// Decodes a response produced by a service of the given capability.
    pub fn decode(capability: &Capability, payload: &Payload) -> Result<Self, PayloadShapeError> {
        match capability {
            Capability::Llm => decode_llm(payload),
            Capability::Embedding => decode_embedding(payload),
            Capability::Tts => decode_speech(payload),
            Capability::Other(_) => TextDoc::from_payload(payload).map(StagePayload::Text),
        }
    }

    /// The textual content of the payload, if it carries any.
    pub fn text(&self) -> Option<&str> {
        match self {
            StagePayload::Text(doc) => Some(&doc.text),
            StagePayload::Completion { content } => Some(content),
            StagePayload::Translation { translated_text } => Some(translated_text),
            StagePayload::Examples { examples } => Some(examples),
            StagePayload::Embedding { .. } | StagePayload::Speech(_) => None,
        }
    }
}

fn decode_llm(payload: &Payload) -> Result<StagePayload, PayloadShapeError> {
    const EXPECTED: &str = "language model response";
    let value = payload
        .as_json()
        .ok_or_else(|| PayloadShapeError::not_json(EXPECTED))?;

    if value.get("choices").is_some() {
        let content = str_at(value, "/choices/0/message/content", EXPECTED)?;
        return Ok(StagePayload::Completion {
            content: content.to_string(),
        });
    }
    if value.get("translated_text").is_some() {
        let text = str_at(value, "/translated_text", EXPECTED)?;
        return Ok(StagePayload::Translation {
            translated_text: text.to_string(),
        });
    }
    if value.get("examples").is_some() {
        let examples = str_at(value, "/examples", EXPECTED)?;
        return Ok(StagePayload::Examples {
            examples: examples.to_string(),
        });
    }
    Err(PayloadShapeError::missing(EXPECTED, "choices[0].message.content"))
}

fn decode_embedding(payload: &Payload) -> Result<StagePayload, PayloadShapeError> {
    const EXPECTED: &str = "embedding response";
    let value = payload
        .as_json()
        .ok_or_else(|| PayloadShapeError::not_json(EXPECTED))?;

    // Plain `{embedding: [...]}` or OpenAI-style `{data: [{embedding: [...]}]}`
    let (pointer, raw) = if let Some(raw) = value.get("embedding") {
        ("/embedding", raw)
    } else if let Some(raw) = value.pointer("/data/0/embedding") {
        ("/data/0/embedding", raw)
    } else {
        return Err(PayloadShapeError::missing(EXPECTED, "embedding"));
    };

    let items = raw.as_array().ok_or_else(|| {
        PayloadShapeError::invalid(EXPECTED, display_path(pointer), "not an array")
    })?;
    let embedding = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_f64().map(|f| f as f32).ok_or_else(|| {
                PayloadShapeError::invalid(
                    EXPECTED,
                    format!("{}[{}]", display_path(pointer), i),
                    "not a number",
                )
            })
        })
        .collect::<Result<Vec<f32>, _>>()?;

    let dimensions = value
        .get("dimensions")
        .and_then(Value::as_u64)
        .map(|d| d as usize)
        .unwrap_or(embedding.len());

    Ok(StagePayload::Embedding {
        embedding,
        dimensions,
    })
}

fn decode_speech(payload: &Payload) -> Result<StagePayload, PayloadShapeError> {
    const EXPECTED: &str = "speech response";
    match payload {
        Payload::Binary {
            content_type,
            bytes,
        } => Ok(StagePayload::Speech(Speech {
            audio: bytes.clone(),
            format: format_from_content_type(content_type),
            sample_rate: None,
        })),
        Payload::Json(value) => {
            let encoded = str_at(value, "/audio_data", EXPECTED)?;
            let audio = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| PayloadShapeError::invalid(EXPECTED, "audio_data", e.to_string()))?;
            let format = value
                .get("format")
                .and_then(Value::as_str)
                .unwrap_or("mp3")
                .to_string();
            let sample_rate = value
                .get("sample_rate")
                .and_then(Value::as_u64)
                .map(|r| r as u32);
            Ok(StagePayload::Speech(Speech {
                audio,
                format,
                sample_rate,
            }))
        }
    }
}

fn format_from_content_type(content_type: &str) -> String {
    let subtype = content_type
        .split(';')
        .next()
        .and_then(|mime| mime.split('/').nth(1))
        .unwrap_or("octet-stream")
        .trim();
    match subtype {
        "mpeg" => "mp3".to_string(),
        "x-wav" | "wave" => "wav".to_string(),
        other => other.to_string(),
    }
}

fn str_at<'a>(
    value: &'a Value,
    pointer: &str,
    expected: &'static str,
) -> Result<&'a str, PayloadShapeError> {
    match value.pointer(pointer) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(PayloadShapeError::invalid(
            expected,
            display_path(pointer),
            "not a string",
        )),
        None => Err(PayloadShapeError::missing(expected, display_path(pointer))),
    }
}

/// `/choices/0/message/content` -> `choices[0].message.content`
fn display_path(pointer: &str) -> String {
    let mut out = String::new();
    for segment in pointer.trim_start_matches('/').split('/') {
        if segment.chars().all(|c| c.is_ascii_digit()) && !segment.is_empty() {
            out.push_str(&format!("[{}]", segment));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
        }
    }
    out
}
