use futures::stream::{FuturesOrdered, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::core::registry::{ServiceClient, ServiceRegistry};

pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The health endpoint answered 2xx.
    Healthy,
    /// The service answered, but not with 2xx.
    Unhealthy,
    /// Connecting failed or the check timed out.
    Unreachable,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Composite health of every registered service, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    entries: Vec<(String, HealthStatus)>,
}

impl HealthReport {
    pub fn get(&self, service: &str) -> Option<HealthStatus> {
        self.entries
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, status)| *status)
    }

    pub fn entries(&self) -> &[(String, HealthStatus)] {
        &self.entries
    }

    /// True iff every service is healthy.
    pub fn all_healthy(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, status)| *status == HealthStatus::Healthy)
    }

    /// Services that are not healthy, with their status.
    pub fn unhealthy(&self) -> Vec<(&str, HealthStatus)> {
        self.entries
            .iter()
            .filter(|(_, status)| *status != HealthStatus::Healthy)
            .map(|(name, status)| (name.as_str(), *status))
            .collect()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, status) in &self.entries {
            writeln!(f, "{}: {}", name, status)?;
        }
        Ok(())
    }
}

/// Polls the health endpoint of every service in a registry.
///
/// Advisory only: nothing here gates pipeline execution.
pub struct HealthAggregator<'a> {
    registry: &'a ServiceRegistry,
    timeout: Duration,
}

impl<'a> HealthAggregator<'a> {
    pub fn new(registry: &'a ServiceRegistry) -> Self {
        Self {
            registry,
            timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks all services concurrently, each bounded by the health timeout.
    pub async fn check_all(&self) -> HealthReport {
        let checks: FuturesOrdered<_> = self
            .registry
            .clients()
            .map(|client| async move { (client.name().to_string(), self.check(client).await) })
            .collect();
        HealthReport {
            entries: checks.collect().await,
        }
    }

    pub async fn all_healthy(&self) -> bool {
        self.check_all().await.all_healthy()
    }

    async fn check(&self, client: &ServiceClient) -> HealthStatus {
        match tokio::time::timeout(self.timeout, client.health(self.timeout)).await {
            Ok(Ok(response)) if response.is_success() => HealthStatus::Healthy,
            Ok(Ok(response)) => {
                log::warn!(
                    "Service '{}' health check returned HTTP {}",
                    client.name(),
                    response.status
                );
                HealthStatus::Unhealthy
            }
            Ok(Err(err)) => {
                log::warn!("Service '{}' is unreachable: {}", client.name(), err);
                HealthStatus::Unreachable
            }
            Err(_) => {
                log::warn!(
                    "Service '{}' health check timed out after {} ms",
                    client.name(),
                    self.timeout.as_millis()
                );
                HealthStatus::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::payload::Payload;
    use crate::core::service::{Capability, ServiceAddress, ServiceDescriptor};
    use crate::core::transport::{Transport, TransportError, TransportResponse};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Health answers keyed by host: a status code, or `None` for a refused connection.
    struct FixedHealth(Vec<(&'static str, Option<u16>)>);

    #[async_trait]
    impl Transport for FixedHealth {
        async fn post(
            &self,
            _url: &str,
            _body: &Payload,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            Err(TransportError::Other("unused".into()))
        }

        async fn get(
            &self,
            url: &str,
            _timeout: Duration,
        ) -> Result<TransportResponse, TransportError> {
            let answer = self
                .0
                .iter()
                .find(|(host, _)| url.contains(&format!("//{}:", host)))
                .and_then(|(_, status)| *status);
            match answer {
                Some(status) => Ok(TransportResponse {
                    status,
                    content_type: Some("application/json".into()),
                    body: br#"{"status":"healthy"}"#.to_vec(),
                }),
                None => Err(TransportError::Connect("connection refused".into())),
            }
        }
    }

    fn registry(transport: FixedHealth) -> ServiceRegistry {
        let mut registry = ServiceRegistry::with_transport(Arc::new(transport));
        for (name, capability) in [
            ("llm", Capability::Llm),
            ("embedding", Capability::Embedding),
            ("tts", Capability::Tts),
        ] {
            registry
                .register(ServiceDescriptor::new(
                    name,
                    capability,
                    ServiceAddress::new(name, 80, "/run"),
                ))
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let registry = registry(FixedHealth(vec![
            ("llm", Some(200)),
            ("embedding", Some(200)),
            ("tts", Some(204)),
        ]));
        let aggregator = HealthAggregator::new(&registry);
        let report = aggregator.check_all().await;
        assert!(report.all_healthy());
        assert!(aggregator.all_healthy().await);
        assert_eq!(report.to_string(), "llm: healthy\nembedding: healthy\ntts: healthy\n");
    }

    #[tokio::test]
    async fn test_classification() {
        let registry = registry(FixedHealth(vec![
            ("llm", Some(200)),
            ("embedding", Some(503)),
            ("tts", None),
        ]));
        let report = HealthAggregator::new(&registry).check_all().await;

        assert_eq!(report.get("llm"), Some(HealthStatus::Healthy));
        assert_eq!(report.get("embedding"), Some(HealthStatus::Unhealthy));
        assert_eq!(report.get("tts"), Some(HealthStatus::Unreachable));
        assert!(!report.all_healthy());
        assert_eq!(
            report.unhealthy(),
            vec![
                ("embedding", HealthStatus::Unhealthy),
                ("tts", HealthStatus::Unreachable)
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let registry = ServiceRegistry::new();
        assert!(HealthAggregator::new(&registry).all_healthy().await);
    }
}
