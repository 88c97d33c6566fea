use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::core::payload::Payload;
use crate::core::service::ServiceDescriptor;
use crate::core::transport::{HttpTransport, Transport, TransportError, TransportResponse};
use crate::error::{OrchestratorError, Result};

/// Live handle to one registered service.
///
/// Cheap to clone: the descriptor is shared and the transport (and with it the
/// connection pool) is shared by every service in the registry.
#[derive(Clone)]
pub struct ServiceClient {
    descriptor: Arc<ServiceDescriptor>,
    transport: Arc<dyn Transport>,
}

impl ServiceClient {
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// POSTs a payload to the service's capability endpoint.
    pub async fn call(
        &self,
        payload: &Payload,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.transport
            .post(&self.descriptor.address.url(), payload, timeout)
            .await
    }

    /// GETs the service's health endpoint.
    pub async fn health(
        &self,
        timeout: Duration,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.transport
            .get(&self.descriptor.address.health_url(), timeout)
            .await
    }
}

/// Name-indexed, insertion-ordered set of services.
///
/// Written only during setup; afterwards it is shared read-only between requests.
pub struct ServiceRegistry {
    entries: Vec<ServiceClient>,
    index: HashMap<String, usize>,
    transport: Arc<dyn Transport>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    /// A registry whose services are reached over HTTP with one pooled client.
    pub fn new() -> Self {
        Self::with_transport(Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            transport,
        }
    }

    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(OrchestratorError::DuplicateService(descriptor.name));
        }

        log::debug!(
            "Registering service '{}' ({}) at {}",
            descriptor.name,
            descriptor.capability,
            descriptor.address.url()
        );
        self.index
            .insert(descriptor.name.clone(), self.entries.len());
        self.entries.push(ServiceClient {
            descriptor: Arc::new(descriptor),
            transport: Arc::clone(&self.transport),
        });
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn add(mut self, descriptor: ServiceDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&ServiceDescriptor> {
        self.client(name).map(ServiceClient::descriptor)
    }

    pub fn client(&self, name: &str) -> Result<&ServiceClient> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| OrchestratorError::UnknownService(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in registration order.
    pub fn list(&self) -> Vec<&ServiceDescriptor> {
        self.entries.iter().map(ServiceClient::descriptor).collect()
    }

    pub fn clients(&self) -> impl Iterator<Item = &ServiceClient> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
