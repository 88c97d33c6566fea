//! Language-learning operations on top of the default three-service setup.
//!
//! Each call goes to exactly one service, except [`LanguageLearningService::learn`]
//! which runs the whole `semantic_search -> language_model -> speech_synthesis`
//! pipeline.

use serde_json::json;
use std::time::Duration;

use crate::config::{LANGUAGE_MODEL, OrchestratorConfig, SEMANTIC_SEARCH, SPEECH_SYNTHESIS};
use crate::core::adapter::{chat_request, language_name, translation_request};
use crate::core::executor::Orchestrator;
use crate::core::health::{DEFAULT_HEALTH_TIMEOUT, HealthAggregator, HealthReport};
use crate::core::payload::{Payload, PayloadShapeError, Speech, StagePayload, TextDoc};
use crate::core::service::Capability;
use crate::error::{OrchestratorError, Result};

const EXAMPLES_TEMPERATURE: f64 = 0.7;

pub struct LanguageLearningService {
    orchestrator: Orchestrator,
    health_timeout: Duration,
    language_model: String,
    semantic_search: String,
    speech_synthesis: String,
}

impl LanguageLearningService {
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let orchestrator = config.build_orchestrator()?;
        Ok(Self {
            orchestrator,
            health_timeout: config.health_timeout,
            language_model: config.language_model.name.clone(),
            semantic_search: config.embedding.name.clone(),
            speech_synthesis: config.speech.name.clone(),
        })
    }

    /// Wraps an orchestrator that registers the services under their default names.
    pub fn from_orchestrator(orchestrator: Orchestrator) -> Result<Self> {
        for name in [LANGUAGE_MODEL, SEMANTIC_SEARCH, SPEECH_SYNTHESIS] {
            orchestrator.registry().get(name)?;
        }
        Ok(Self {
            orchestrator,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            language_model: LANGUAGE_MODEL.to_string(),
            semantic_search: SEMANTIC_SEARCH.to_string(),
            speech_synthesis: SPEECH_SYNTHESIS.to_string(),
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    fn language(&self) -> &str {
        language_name(self.orchestrator.language())
    }

    /// Translates `text` into the target language.
    pub async fn translate(&self, text: &str) -> Result<String> {
        let body = Payload::Json(translation_request(text, self.orchestrator.language()));
        self.complete(body).await
    }

    /// Three example sentences using `concept`.
    pub async fn examples(&self, concept: &str) -> Result<String> {
        let language = self.language();
        let body = Payload::Json(chat_request(
            &format!("You are a {} language teaching assistant.", language),
            &format!(
                "Give me 3 example sentences using the {} concept: {}",
                language, concept
            ),
            EXAMPLES_TEMPERATURE,
        ));
        self.complete(body).await
    }

    /// Synthesizes `text` as speech in the target language.
    pub async fn pronounce(&self, text: &str) -> Result<Speech> {
        let body = TextDoc::new(text)
            .with_language(self.orchestrator.language())
            .to_payload();
        let response = self
            .orchestrator
            .call_stage(&self.speech_synthesis, &body)
            .await?;
        speech(&self.speech_synthesis, &response)
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = Payload::Json(json!({ "input": text, "text": text }));
        let response = self
            .orchestrator
            .call_stage(&self.semantic_search, &body)
            .await?;
        match decode(&self.semantic_search, &Capability::Embedding, &response)? {
            StagePayload::Embedding { embedding, .. } => Ok(embedding),
            _ => Err(shape(
                &self.semantic_search,
                PayloadShapeError::missing("embedding response", "embedding"),
            )),
        }
    }

    /// Embeds, translates and synthesizes `text` in one pipeline run.
    pub async fn learn(&self, text: &str) -> Result<Speech> {
        let response = self
            .orchestrator
            .execute(&self.semantic_search, TextDoc::new(text).to_payload())
            .await?;
        speech(&self.speech_synthesis, &response)
    }

    pub async fn health(&self) -> HealthReport {
        HealthAggregator::new(self.orchestrator.registry())
            .with_timeout(self.health_timeout)
            .check_all()
            .await
    }

    async fn complete(&self, body: Payload) -> Result<String> {
        let response = self
            .orchestrator
            .call_stage(&self.language_model, &body)
            .await?;
        match decode(&self.language_model, &Capability::Llm, &response)? {
            StagePayload::Completion { content } => Ok(content),
            StagePayload::Translation { translated_text } => Ok(translated_text),
            StagePayload::Examples { examples } => Ok(examples),
            _ => Err(shape(
                &self.language_model,
                PayloadShapeError::missing("language model response", "choices[0].message.content"),
            )),
        }
    }
}

fn decode(stage: &str, capability: &Capability, payload: &Payload) -> Result<StagePayload> {
    StagePayload::decode(capability, payload).map_err(|e| shape(stage, e))
}

fn speech(stage: &str, payload: &Payload) -> Result<Speech> {
    match decode(stage, &Capability::Tts, payload)? {
        StagePayload::Speech(speech) => Ok(speech),
        _ => Err(shape(
            stage,
            PayloadShapeError::missing("speech response", "audio_data"),
        )),
    }
}

fn shape(stage: &str, source: PayloadShapeError) -> OrchestratorError {
    OrchestratorError::PayloadShape {
        stage: stage.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::ServiceRegistry;
    use crate::core::transport::{Transport, TransportError, TransportResponse};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    /// Answers by host and keeps every JSON request body.
    #[derive(Default)]
    struct Recorder {
        bodies: Mutex<Vec<(String, Value)>>,
    }

    impl Recorder {
        fn sent_to(&self, host: &str) -> Vec<Value> {
            self.bodies
                .lock()
                .unwrap()
                .iter()
                .filter(|(h, _)| h == host)
                .map(|(_, body)| body.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn post(
            &self,
            url: &str,
            body: &Payload,
            _timeout: Duration,
        ) -> std::result::Result<TransportResponse, TransportError> {
            let host = url
                .trim_start_matches("http://")
                .split(':')
                .next()
                .unwrap_or_default()
                .to_string();
            let json = body.as_json().cloned().unwrap_or(Value::Null);
            self.bodies.lock().unwrap().push((host.clone(), json));

            let (content_type, body) = match host.as_str() {
                "llm-service" => (
                    "application/json",
                    json!({"choices": [{"message": {"content": "Hallo Welt"}}]})
                        .to_string()
                        .into_bytes(),
                ),
                "embedding-service" => (
                    "application/json",
                    json!({"embedding": [0.5, 0.25], "dimensions": 2})
                        .to_string()
                        .into_bytes(),
                ),
                _ => ("audio/mpeg", vec![9, 9, 9]),
            };
            Ok(TransportResponse {
                status: 200,
                content_type: Some(content_type.to_string()),
                body,
            })
        }

        async fn get(
            &self,
            _url: &str,
            _timeout: Duration,
        ) -> std::result::Result<TransportResponse, TransportError> {
            Ok(TransportResponse {
                status: 200,
                content_type: None,
                body: Vec::new(),
            })
        }
    }

    fn service(recorder: Arc<Recorder>) -> LanguageLearningService {
        let orchestrator = OrchestratorConfig::default()
            .build_orchestrator_with_transport(recorder)
            .unwrap();
        LanguageLearningService::from_orchestrator(orchestrator).unwrap()
    }

    #[tokio::test]
    async fn test_translate_prompt() {
        let recorder = Arc::new(Recorder::default());
        let learning = service(recorder.clone());

        assert_eq!(learning.translate("Hello world").await.unwrap(), "Hallo Welt");
        let sent = recorder.sent_to("llm-service");
        assert_eq!(
            sent[0]["messages"][1]["content"],
            "Translate the following to German: Hello world"
        );
        assert_eq!(sent[0]["temperature"], 0.3);
    }

    #[tokio::test]
    async fn test_examples_prompt() {
        let recorder = Arc::new(Recorder::default());
        let learning = service(recorder.clone());

        learning.examples("Dativ").await.unwrap();
        let sent = recorder.sent_to("llm-service");
        assert_eq!(
            sent[0]["messages"][0]["content"],
            "You are a German language teaching assistant."
        );
        assert_eq!(
            sent[0]["messages"][1]["content"],
            "Give me 3 example sentences using the German concept: Dativ"
        );
        assert_eq!(sent[0]["temperature"], 0.7);
    }

    #[tokio::test]
    async fn test_pronounce_and_embed() {
        let recorder = Arc::new(Recorder::default());
        let learning = service(recorder.clone());

        let speech = learning.pronounce("Guten Tag").await.unwrap();
        assert_eq!(speech.audio, vec![9, 9, 9]);
        assert_eq!(speech.format, "mp3");
        assert_eq!(
            recorder.sent_to("tts-service")[0],
            json!({"text": "Guten Tag", "language": "de"})
        );

        assert_eq!(learning.embed("Tag").await.unwrap(), vec![0.5, 0.25]);
    }

    #[tokio::test]
    async fn test_learn_runs_full_pipeline() {
        let recorder = Arc::new(Recorder::default());
        let learning = service(recorder.clone());

        let speech = learning.learn("Hello world").await.unwrap();
        assert_eq!(speech.audio, vec![9, 9, 9]);
        assert_eq!(
            recorder.sent_to("tts-service")[0],
            json!({"text": "Hallo Welt", "language": "de"})
        );
        assert!(learning.health().await.all_healthy());
    }

    #[test]
    fn test_from_orchestrator_requires_default_services() {
        let orchestrator = Orchestrator::with_registry(ServiceRegistry::new());
        assert!(matches!(
            LanguageLearningService::from_orchestrator(orchestrator),
            Err(OrchestratorError::UnknownService(_))
        ));
    }
}
