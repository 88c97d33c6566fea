//! Process-wide configuration, read once at startup.
//!
//! Nothing in request handling reads the environment: build an
//! [`OrchestratorConfig`] when the process starts and hand it to
//! [`OrchestratorConfig::build_orchestrator`].

use std::sync::Arc;
use std::time::Duration;

use crate::core::executor::{DEFAULT_LANGUAGE, DEFAULT_STAGE_TIMEOUT, Orchestrator};
use crate::core::health::{DEFAULT_HEALTH_TIMEOUT, HealthAggregator};
use crate::core::registry::ServiceRegistry;
use crate::core::service::{Capability, ServiceAddress, ServiceDescriptor};
use crate::core::transport::{HttpTransport, Transport};
use crate::error::{ConfigError, Result};

pub const LANGUAGE_MODEL: &str = "language_model";
pub const SEMANTIC_SEARCH: &str = "semantic_search";
pub const SPEECH_SYNTHESIS: &str = "speech_synthesis";

/// Connection details for one downstream service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub name: String,
    pub capability: Capability,
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub health_path: String,
}

impl ServiceConfig {
    fn new(name: &str, capability: Capability, host: &str, port: u16, endpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            capability,
            host: host.to_string(),
            port,
            endpoint: endpoint.to_string(),
            health_path: "/health".to_string(),
        }
    }

    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor::new(
            self.name.clone(),
            self.capability.clone(),
            ServiceAddress::new(self.host.clone(), self.port, self.endpoint.clone())
                .with_health_path(self.health_path.clone()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub language_model: ServiceConfig,
    pub embedding: ServiceConfig,
    pub speech: ServiceConfig,
    pub stage_timeout: Duration,
    pub health_timeout: Duration,
    pub target_language: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            language_model: ServiceConfig::new(
                LANGUAGE_MODEL,
                Capability::Llm,
                "llm-service",
                9000,
                "/v1/chat/completions",
            ),
            embedding: ServiceConfig::new(
                SEMANTIC_SEARCH,
                Capability::Embedding,
                "embedding-service",
                6000,
                "/v1/embeddings",
            ),
            speech: ServiceConfig::new(
                SPEECH_SYNTHESIS,
                Capability::Tts,
                "tts-service",
                7000,
                "/v1/tts",
            ),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            target_language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Environment variable names for one service.
struct ServiceVars {
    host: &'static str,
    port: &'static str,
    endpoint: &'static str,
}

const LLM_VARS: ServiceVars = ServiceVars {
    host: "LLM_SERVICE_HOST",
    port: "LLM_SERVICE_PORT",
    endpoint: "LLM_SERVICE_ENDPOINT",
};
const EMBEDDING_VARS: ServiceVars = ServiceVars {
    host: "EMBEDDING_SERVICE_HOST",
    port: "EMBEDDING_SERVICE_PORT",
    endpoint: "EMBEDDING_SERVICE_ENDPOINT",
};
const TTS_VARS: ServiceVars = ServiceVars {
    host: "TTS_SERVICE_HOST",
    port: "TTS_SERVICE_PORT",
    endpoint: "TTS_SERVICE_ENDPOINT",
};

impl OrchestratorConfig {
    /// Reads the process environment, falling back to the documented defaults.
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads a `.env` file into the environment (if one exists), then reads it.
    pub fn from_dotenv() -> std::result::Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::debug!("Loaded environment from {}", path.display()),
            Err(e) => log::debug!("No .env file loaded: {}", e),
        }
        Self::from_env()
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        apply_service(&lookup, &LLM_VARS, &mut config.language_model)?;
        apply_service(&lookup, &EMBEDDING_VARS, &mut config.embedding)?;
        apply_service(&lookup, &TTS_VARS, &mut config.speech)?;

        if let Some(ms) = parse_var::<u64, _>(&lookup, "STAGE_TIMEOUT_MS")? {
            config.stage_timeout = positive_millis("STAGE_TIMEOUT_MS", ms)?;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "HEALTH_TIMEOUT_MS")? {
            config.health_timeout = positive_millis("HEALTH_TIMEOUT_MS", ms)?;
        }
        if let Some(language) = non_empty(&lookup, "TARGET_LANGUAGE")? {
            config.target_language = language;
        }
        Ok(config)
    }

    /// Services in the order they are registered.
    pub fn services(&self) -> [&ServiceConfig; 3] {
        [&self.language_model, &self.embedding, &self.speech]
    }

    /// Registers every service and the default flow
    /// `semantic_search -> language_model -> speech_synthesis`.
    pub fn build_orchestrator(&self) -> Result<Orchestrator> {
        self.build_orchestrator_with_transport(Arc::new(HttpTransport::new()))
    }

    pub fn build_orchestrator_with_transport(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<Orchestrator> {
        let mut orchestrator = Orchestrator::with_registry(ServiceRegistry::with_transport(transport))
            .with_stage_timeout(self.stage_timeout)
            .with_language(self.target_language.clone());
        for service in self.services() {
            orchestrator.register(service.descriptor())?;
        }
        orchestrator.flow_to(&self.embedding.name, &self.language_model.name)?;
        orchestrator.flow_to(&self.language_model.name, &self.speech.name)?;
        orchestrator.validate(&self.embedding.name).log_summary();
        Ok(orchestrator)
    }

    /// A health aggregator over `registry` using the configured health timeout.
    pub fn health_aggregator<'a>(&self, registry: &'a ServiceRegistry) -> HealthAggregator<'a> {
        HealthAggregator::new(registry).with_timeout(self.health_timeout)
    }
}

fn apply_service<F>(
    lookup: &F,
    vars: &ServiceVars,
    service: &mut ServiceConfig,
) -> std::result::Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = non_empty(lookup, vars.host)? {
        service.host = host;
    }
    if let Some(port) = parse_var::<u16, _>(lookup, vars.port)? {
        service.port = port;
    }
    if let Some(endpoint) = non_empty(lookup, vars.endpoint)? {
        service.endpoint = endpoint;
    }
    Ok(())
}

fn non_empty<F>(lookup: &F, key: &'static str) -> std::result::Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Err(ConfigError::MissingField { field: key }),
        Some(value) => Ok(Some(value.trim().to_string())),
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> std::result::Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, key)? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: key,
                reason: format!("'{}': {}", raw, e),
            }),
    }
}

fn positive_millis(key: &'static str, ms: u64) -> std::result::Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: key,
            reason: "timeout must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(
            config.language_model.descriptor().address.url(),
            "http://llm-service:9000/v1/chat/completions"
        );
        assert_eq!(config.embedding.port, 6000);
        assert_eq!(config.speech.host, "tts-service");
        assert_eq!(config.target_language, "de");
    }

    #[test]
    fn test_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("LLM_SERVICE_HOST", "localhost"),
            ("LLM_SERVICE_PORT", "8000"),
            ("TTS_SERVICE_ENDPOINT", "/synthesize"),
            ("STAGE_TIMEOUT_MS", "1500"),
            ("TARGET_LANGUAGE", "fr"),
        ]))
        .unwrap();

        assert_eq!(config.language_model.host, "localhost");
        assert_eq!(config.language_model.port, 8000);
        assert_eq!(config.speech.endpoint, "/synthesize");
        assert_eq!(config.stage_timeout, Duration::from_millis(1500));
        assert_eq!(config.target_language, "fr");
    }

    #[test]
    fn test_invalid_port() {
        let err = OrchestratorConfig::from_lookup(lookup(&[("EMBEDDING_SERVICE_PORT", "sixty")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "EMBEDDING_SERVICE_PORT", .. }
        ));
    }

    #[test]
    fn test_empty_value_is_missing() {
        let err = OrchestratorConfig::from_lookup(lookup(&[("LLM_SERVICE_HOST", "  ")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field: "LLM_SERVICE_HOST" }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = OrchestratorConfig::from_lookup(lookup(&[("HEALTH_TIMEOUT_MS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "HEALTH_TIMEOUT_MS", .. }));
    }

    #[test]
    fn test_build_orchestrator_wires_default_flow() {
        let orchestrator = OrchestratorConfig::default().build_orchestrator().unwrap();
        assert_eq!(
            orchestrator.pipeline(SEMANTIC_SEARCH).unwrap(),
            vec![SEMANTIC_SEARCH, LANGUAGE_MODEL, SPEECH_SYNTHESIS]
        );
        let names: Vec<&str> = orchestrator
            .registry()
            .list()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec![LANGUAGE_MODEL, SEMANTIC_SEARCH, SPEECH_SYNTHESIS]);
        assert!(orchestrator.validate(SEMANTIC_SEARCH).is_safe());
    }
}
