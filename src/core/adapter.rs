//! Adapters turn one stage's response into the next stage's request body.
//!
//! Custom adapters are registered per edge on the
//! [`Orchestrator`](crate::core::executor::Orchestrator). Edges without one fall
//! back to a [`DefaultAdapter`] chosen from the capabilities on both ends.

use serde_json::{Value, json};

use crate::core::payload::{Payload, PayloadShapeError, StagePayload, TextDoc};
use crate::core::service::{Capability, ServiceDescriptor};

/// Everything an adapter may look at when building a stage request.
pub struct AdapterInput<'a> {
    /// The payload the client started the pipeline with.
    pub request: &'a Payload,
    /// The previous stage's response, or the client payload for the entry stage.
    pub previous: &'a Payload,
    /// The stage that produced `previous`, `None` for the entry stage.
    pub source: Option<&'a ServiceDescriptor>,
    /// The stage about to be called.
    pub target: &'a ServiceDescriptor,
    /// Language code the pipeline produces output in.
    pub language: &'a str,
}

/// A pure mapping from the data available at a stage boundary to a request body.
pub trait Adapter: Send + Sync {
    fn adapt(&self, input: &AdapterInput<'_>) -> Result<Payload, PayloadShapeError>;
}

impl<F> Adapter for F
where
    F: Fn(&AdapterInput<'_>) -> Result<Payload, PayloadShapeError> + Send + Sync,
{
    fn adapt(&self, input: &AdapterInput<'_>) -> Result<Payload, PayloadShapeError> {
        self(input)
    }
}

/// Built-in adapters for the capability pairs this crate knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAdapter {
    /// Client text into an embedding request.
    EmbedText,
    /// Client text into a translation chat request.
    TranslateText,
    /// Client text, or the previous stage's text, into a `{text, language}` synthesis request.
    Synthesize,
    /// Validates the embedding, then asks the language model to translate the client text.
    EmbeddingToTranslation,
    /// Forwards the previous payload untouched.
    Passthrough,
}

impl DefaultAdapter {
    pub fn for_edge(source: Option<&Capability>, target: &Capability) -> Self {
        match (source, target) {
            (None, Capability::Embedding) => DefaultAdapter::EmbedText,
            (None, Capability::Llm) => DefaultAdapter::TranslateText,
            (None, Capability::Tts) => DefaultAdapter::Synthesize,
            (Some(Capability::Embedding), Capability::Llm) => {
                DefaultAdapter::EmbeddingToTranslation
            }
            (Some(Capability::Llm), Capability::Tts)
            | (Some(Capability::Other(_)), Capability::Tts) => DefaultAdapter::Synthesize,
            _ => DefaultAdapter::Passthrough,
        }
    }
}

impl Adapter for DefaultAdapter {
    fn adapt(&self, input: &AdapterInput<'_>) -> Result<Payload, PayloadShapeError> {
        match self {
            DefaultAdapter::EmbedText => {
                let doc = TextDoc::from_payload(input.request)?;
                Ok(Payload::Json(json!({ "input": doc.text, "text": doc.text })))
            }
            DefaultAdapter::TranslateText => {
                // Callers that already speak the chat protocol are left alone.
                if let Some(Value::Object(map)) = input.request.as_json() {
                    if map.contains_key("messages") {
                        return Ok(input.request.clone());
                    }
                }
                let doc = TextDoc::from_payload(input.request)?;
                Ok(Payload::Json(translation_request(&doc.text, input.language)))
            }
            DefaultAdapter::Synthesize => {
                let text = match input.source {
                    None => TextDoc::from_payload(input.previous)?.text,
                    Some(source) => StagePayload::decode(&source.capability, input.previous)?
                        .text()
                        .map(str::to_string)
                        .ok_or_else(|| {
                            PayloadShapeError::invalid(
                                "text-bearing response",
                                "$",
                                format!("{} output carries no text", source.capability),
                            )
                        })?,
                };
                Ok(TextDoc::new(text).with_language(input.language).to_payload())
            }
            DefaultAdapter::EmbeddingToTranslation => {
                StagePayload::decode(&Capability::Embedding, input.previous)?;
                let doc = TextDoc::from_payload(input.request)?;
                Ok(Payload::Json(translation_request(&doc.text, input.language)))
            }
            DefaultAdapter::Passthrough => Ok(input.previous.clone()),
        }
    }
}

/// An OpenAI-style chat completion request body.
pub fn chat_request(system: &str, user: &str, temperature: f64) -> Value {
    json!({
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ],
        "temperature": temperature,
    })
}

/// Chat request asking for a translation of `text` into `language`.
pub fn translation_request(text: &str, language: &str) -> Value {
    let name = language_name(language);
    chat_request(
        &format!("You are a {} language translation assistant.", name),
        &format!("Translate the following to {}: {}", name, text),
        0.3,
    )
}

/// Human-readable name for the language codes used in prompts.
pub fn language_name(code: &str) -> &str {
    match code {
        "de" => "German",
        "en" => "English",
        "fr" => "French",
        "es" => "Spanish",
        "it" => "Italian",
        other => other,
    }
}
