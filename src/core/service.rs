use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of work a remote service performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Llm,
    Embedding,
    Tts,
    /// Any capability this crate has no built-in payload shapes for.
    Other(String),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Llm => write!(f, "llm"),
            Capability::Embedding => write!(f, "embedding"),
            Capability::Tts => write!(f, "tts"),
            Capability::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Where a service lives: host, port and the capability endpoint path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub host: String,
    pub port: u16,
    pub endpoint: String,
    pub health_path: String,
}

impl ServiceAddress {
    pub fn new(host: impl Into<String>, port: u16, endpoint: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            endpoint: normalize_path(endpoint.into()),
            health_path: "/health".to_string(),
        }
    }

    /// Overrides the health endpoint path (default `/health`).
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = normalize_path(path.into());
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Full URL of the capability endpoint.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url(), self.endpoint)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url(), self.health_path)
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

/// Immutable description of one remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub capability: Capability,
    pub address: ServiceAddress,
    /// Always true in this deployment, there are no in-process services.
    pub remote: bool,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, capability: Capability, address: ServiceAddress) -> Self {
        Self {
            name: name.into(),
            capability,
            address,
            remote: true,
        }
    }
}
