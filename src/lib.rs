//! # Linguaflow
//!
//! Orchestration of remote AI services (a language model, an embedding service
//! and a speech synthesizer) into linear request pipelines.
//!
//! ## Features
//!
//! - **Service Registry**: Name-indexed descriptors with one shared HTTP connection pool
//! - **Flow Graph**: Directed "output feeds input" edges, cycles rejected at declaration
//! - **Fail-Fast Execution**: Stages run in topological order, the first failure aborts
//! - **Typed Adapters**: Every stage boundary maps one payload shape onto the next
//! - **Health Aggregation**: Concurrent, bounded health polling of every service
//! - **Optional Learning Facade**: Translation, examples and pronunciation (feature-gated)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linguaflow::prelude::*;
//!
//! # async fn run() -> linguaflow::Result<()> {
//! let config = OrchestratorConfig::from_env()?;
//! let orchestrator = config.build_orchestrator()?;
//!
//! let audio = orchestrator
//!     .execute("semantic_search", TextDoc::new("Good morning").to_payload())
//!     .await?;
//! println!("{} bytes of {}", audio.to_body().len(), audio.content_type());
//!
//! let report = config.health_aggregator(orchestrator.registry()).check_all().await;
//! print!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`core`]: Registry, flow graph, executor, adapters and health checks
//! - [`config`]: Startup configuration from the environment
//! - [`error`]: The error taxonomy shared by every operation
//! - [`prelude`]: Commonly used types and traits (import with `use linguaflow::prelude::*`)

// ============================================================================
// Core Modules
// ============================================================================

pub mod config;
pub mod core;
pub mod error;

// ============================================================================
// Public Re-exports - Granular Imports
// ============================================================================

pub use config::{OrchestratorConfig, ServiceConfig};
pub use error::{ConfigError, OrchestratorError, Result};

// Services and registry
pub use crate::core::registry::{ServiceClient, ServiceRegistry};
pub use crate::core::service::{Capability, ServiceAddress, ServiceDescriptor};

// Graph and execution
pub use crate::core::executor::{ExecutionState, Orchestrator};
pub use crate::core::graph::FlowGraph;
pub use crate::core::validation::{ValidationIssue, ValidationResult};

// Payloads and adapters
pub use crate::core::adapter::{Adapter, AdapterInput, DefaultAdapter};
pub use crate::core::payload::{Payload, PayloadShapeError, Speech, StagePayload, TextDoc};

// Transport, health and telemetry
pub use crate::core::health::{HealthAggregator, HealthReport, HealthStatus};
pub use crate::core::telemetry::{MemoryTelemetry, StageOutcome, StageTrace, Telemetry};
pub use crate::core::transport::{HttpTransport, Transport, TransportError, TransportResponse};

// ============================================================================
// Prelude Module - Convenient Bulk Imports
// ============================================================================

/// Everything needed to configure and run pipelines.
///
/// # Example
/// ```rust
/// use linguaflow::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        Adapter,
        AdapterInput,
        Capability,
        // Health
        HealthAggregator,
        HealthReport,
        HealthStatus,
        // Execution
        Orchestrator,
        // Configuration
        OrchestratorConfig,
        OrchestratorError,
        // Payloads
        Payload,
        PayloadShapeError,
        // Services
        ServiceAddress,
        ServiceDescriptor,
        ServiceRegistry,
        TextDoc,
    };

    #[cfg(feature = "learning")]
    pub use super::LanguageLearningService;
}

// ============================================================================
// Learning Feature
// ============================================================================

#[cfg(feature = "learning")]
pub mod learning;

#[cfg(feature = "learning")]
pub use learning::LanguageLearningService;

// ============================================================================
// Re-export commonly used external types for convenience
// ============================================================================

pub use serde_json::Value as JsonValue;
pub use tokio_util::sync::CancellationToken;

// ============================================================================
// Library Metadata
// ============================================================================

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of this crate.
pub const NAME: &str = env!("CARGO_PKG_NAME");
