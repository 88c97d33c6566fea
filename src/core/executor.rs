use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::adapter::{Adapter, AdapterInput, DefaultAdapter};
use crate::core::graph::FlowGraph;
use crate::core::payload::{Payload, PayloadShapeError};
use crate::core::registry::ServiceRegistry;
use crate::core::service::{Capability, ServiceDescriptor};
use crate::core::telemetry::{StageOutcome, StageTrace, Telemetry};
use crate::core::transport::{TransportError, TransportResponse};
use crate::core::validation::ValidationResult;
use crate::error::{OrchestratorError, Result};

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LANGUAGE: &str = "de";

/// Where a single pipeline execution currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Calling { stage: String },
    Done { stage: String },
    Complete,
    Failed { stage: String },
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "PENDING"),
            ExecutionState::Calling { stage } => write!(f, "CALLING({})", stage),
            ExecutionState::Done { stage } => write!(f, "DONE({})", stage),
            ExecutionState::Complete => write!(f, "COMPLETE"),
            ExecutionState::Failed { stage } => write!(f, "FAILED({})", stage),
        }
    }
}

/// Per-request bookkeeping. Lives on the stack of one `execute` call.
struct Execution {
    id: Uuid,
    state: ExecutionState,
}

impl Execution {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ExecutionState::Pending,
        }
    }

    fn transition(&mut self, next: ExecutionState) {
        log::debug!("[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    fn fail(&mut self, stage: &str, error: OrchestratorError) -> OrchestratorError {
        self.transition(ExecutionState::Failed {
            stage: stage.to_string(),
        });
        log::warn!("[{}] pipeline aborted: {}", self.id, error);
        error
    }
}

/// Owns the registry and the flow graph, and runs pipelines over them.
///
/// Everything is configured up front through the builder methods; `execute`
/// only reads, so one orchestrator can serve any number of concurrent requests.
pub struct Orchestrator {
    registry: ServiceRegistry,
    graph: FlowGraph,
    adapters: HashMap<(String, String), Arc<dyn Adapter>>,
    entry_adapters: HashMap<String, Arc<dyn Adapter>>,
    stage_timeout: Duration,
    language: String,
    telemetry: Option<Arc<dyn Telemetry>>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_registry(ServiceRegistry::new())
    }

    /// Starts from an already populated registry. Every service becomes a node.
    pub fn with_registry(registry: ServiceRegistry) -> Self {
        let mut graph = FlowGraph::new();
        for descriptor in registry.list() {
            graph.add_node(descriptor.name.clone());
        }
        Self {
            registry,
            graph,
            adapters: HashMap::new(),
            entry_adapters: HashMap::new(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            language: DEFAULT_LANGUAGE.to_string(),
            telemetry: None,
        }
    }

    /// Permits stages with several successors in the graph. Such pipelines can be
    /// inspected but not executed.
    pub fn allow_branching(mut self) -> Self {
        self.graph = std::mem::take(&mut self.graph).allow_branching();
        self
    }

    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        self.registry.register(descriptor)?;
        self.graph.add_node(name);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn add(mut self, descriptor: ServiceDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Declares that `from`'s output feeds `to`'s input.
    pub fn flow_to(&mut self, from: &str, to: &str) -> Result<()> {
        self.graph.add_edge(from, to)
    }

    /// Builder-style [`flow_to`](Self::flow_to).
    pub fn flow(mut self, from: &str, to: &str) -> Result<Self> {
        self.flow_to(from, to)?;
        Ok(self)
    }

    /// Sets the adapter used on the `from -> to` boundary.
    pub fn with_adapter(
        mut self,
        from: &str,
        to: &str,
        adapter: impl Adapter + 'static,
    ) -> Result<Self> {
        self.registry.get(from)?;
        self.registry.get(to)?;
        if self
            .adapters
            .insert((from.to_string(), to.to_string()), Arc::new(adapter))
            .is_some()
        {
            log::warn!("Adapter for {} -> {} was replaced.", from, to);
        }
        Ok(self)
    }

    /// Sets the adapter that maps the client payload into `entry`'s request.
    pub fn with_entry_adapter(mut self, entry: &str, adapter: impl Adapter + 'static) -> Result<Self> {
        self.registry.get(entry)?;
        self.entry_adapters
            .insert(entry.to_string(), Arc::new(adapter));
        Ok(self)
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// The stages `execute(entry, ..)` would call, in order.
    pub fn pipeline(&self, entry: &str) -> Result<Vec<String>> {
        self.graph.chain(entry)
    }

    /// Checks the wiring of the pipeline starting at `entry` without calling anything.
    pub fn validate(&self, entry: &str) -> ValidationResult {
        let mut result = ValidationResult::new();
        let stages = match self.pipeline(entry) {
            Ok(stages) => stages,
            Err(e) => {
                result.add_error(format!("Pipeline '{}' cannot run: {}", entry, e));
                return result;
            }
        };

        let mut source: Option<&ServiceDescriptor> = None;
        for (i, stage) in stages.iter().enumerate() {
            let target = match self.registry.get(stage) {
                Ok(target) => target,
                Err(e) => {
                    result.add_error(e.to_string());
                    return result;
                }
            };

            let custom = match source {
                None => self.entry_adapters.contains_key(stage),
                Some(s) => self
                    .adapters
                    .contains_key(&(s.name.clone(), stage.clone())),
            };
            let fallback =
                DefaultAdapter::for_edge(source.map(|s| &s.capability), &target.capability);
            if !custom && fallback == DefaultAdapter::Passthrough {
                match source {
                    None => result.add_warning(format!(
                        "Stage '{}' receives the client payload unchanged.",
                        stage
                    )),
                    Some(s) => result.add_warning(format!(
                        "Edge {} -> {} has no adapter, {} output is forwarded as {} input unchanged.",
                        s.name, stage, s.capability, target.capability
                    )),
                }
            }

            if target.capability == Capability::Tts && i + 1 < stages.len() {
                result.add_warning(format!(
                    "Stage '{}' produces audio but is followed by '{}'.",
                    stage,
                    stages[i + 1]
                ));
            }
            source = Some(target);
        }
        result
    }

    /// Runs the pipeline starting at `entry` and returns the last stage's response.
    pub async fn execute(&self, entry: &str, payload: Payload) -> Result<Payload> {
        self.execute_with_cancellation(entry, payload, &CancellationToken::new())
            .await
    }

    /// Like [`execute`](Self::execute), aborting as soon as `cancel` fires.
    ///
    /// The in-flight call is dropped and no further stage runs. Stages that
    /// already completed are not undone.
    pub async fn execute_with_cancellation(
        &self,
        entry: &str,
        request: Payload,
        cancel: &CancellationToken,
    ) -> Result<Payload> {
        let stages = self.graph.chain(entry)?;
        let mut execution = Execution::new();
        log::info!(
            "[{}] executing pipeline '{}': {}",
            execution.id,
            entry,
            stages.join(" -> ")
        );

        let mut previous = request.clone();
        let mut source: Option<&ServiceDescriptor> = None;

        for stage in &stages {
            let client = self.registry.client(stage)?;
            let target = client.descriptor();

            if cancel.is_cancelled() {
                let err = OrchestratorError::Cancelled {
                    stage: stage.clone(),
                };
                return Err(execution.fail(stage, err));
            }

            let body = self
                .adapt(&AdapterInput {
                    request: &request,
                    previous: &previous,
                    source,
                    target,
                    language: &self.language,
                })
                .map_err(|e| {
                    execution.fail(
                        stage,
                        OrchestratorError::PayloadShape {
                            stage: stage.clone(),
                            source: e,
                        },
                    )
                })?;

            execution.transition(ExecutionState::Calling {
                stage: stage.clone(),
            });
            let started_at = Utc::now();
            let clock = Instant::now();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = tokio::time::timeout(self.stage_timeout, client.call(&body, self.stage_timeout)) => Some(res),
            };

            let response = match outcome {
                None => {
                    self.record(&execution, target, started_at, clock, StageOutcome::Cancelled);
                    let err = OrchestratorError::Cancelled {
                        stage: stage.clone(),
                    };
                    return Err(execution.fail(stage, err));
                }
                Some(res) => match self.classify(stage, res) {
                    Ok(response) => response,
                    Err(err) => {
                        self.record_failure(&execution, target, started_at, clock, &err);
                        return Err(execution.fail(stage, err));
                    }
                },
            };

            self.record(
                &execution,
                target,
                started_at,
                clock,
                StageOutcome::Completed {
                    status: response.status,
                },
            );
            execution.transition(ExecutionState::Done {
                stage: stage.clone(),
            });
            previous = response.into_payload();
            source = Some(target);
        }

        execution.transition(ExecutionState::Complete);
        log::info!("[{}] pipeline '{}' complete", execution.id, entry);
        if let Some(telemetry) = &self.telemetry {
            telemetry.flush();
        }
        Ok(previous)
    }

    /// Calls a single registered service outside any pipeline.
    ///
    /// Same timeout and error classification as a pipeline stage.
    pub async fn call_stage(&self, stage: &str, body: &Payload) -> Result<Payload> {
        let client = self.registry.client(stage)?;
        let res = tokio::time::timeout(self.stage_timeout, client.call(body, self.stage_timeout)).await;
        self.classify(stage, res).map(TransportResponse::into_payload)
    }

    /// Maps the raw outcome of one bounded call onto the error taxonomy.
    fn classify(
        &self,
        stage: &str,
        res: std::result::Result<
            std::result::Result<TransportResponse, TransportError>,
            tokio::time::error::Elapsed,
        >,
    ) -> Result<TransportResponse> {
        match res {
            Err(_) | Ok(Err(TransportError::Timeout)) => Err(OrchestratorError::StageFailure {
                stage: stage.to_string(),
                status: None,
                body: format!("stage timed out after {} ms", self.stage_timeout.as_millis()),
            }),
            Ok(Err(TransportError::Connect(reason))) => Err(OrchestratorError::UnreachableService {
                stage: stage.to_string(),
                reason,
            }),
            Ok(Err(TransportError::Other(reason))) => Err(OrchestratorError::StageFailure {
                stage: stage.to_string(),
                status: None,
                body: reason,
            }),
            Ok(Ok(response)) if !response.is_success() => Err(OrchestratorError::StageFailure {
                stage: stage.to_string(),
                status: Some(response.status),
                body: response.body_text(),
            }),
            Ok(Ok(response)) => Ok(response),
        }
    }

    fn adapt(&self, input: &AdapterInput<'_>) -> std::result::Result<Payload, PayloadShapeError> {
        let custom = match input.source {
            None => self.entry_adapters.get(&input.target.name),
            Some(source) => self
                .adapters
                .get(&(source.name.clone(), input.target.name.clone())),
        };
        match custom {
            Some(adapter) => adapter.adapt(input),
            None => DefaultAdapter::for_edge(
                input.source.map(|s| &s.capability),
                &input.target.capability,
            )
            .adapt(input),
        }
    }

    fn record(
        &self,
        execution: &Execution,
        stage: &ServiceDescriptor,
        started_at: DateTime<Utc>,
        clock: Instant,
        outcome: StageOutcome,
    ) {
        if let Some(telemetry) = &self.telemetry {
            telemetry.record(StageTrace {
                execution_id: execution.id,
                stage: stage.name.clone(),
                capability: stage.capability.clone(),
                started_at,
                elapsed_ms: clock.elapsed().as_millis() as u64,
                outcome,
            });
        }
    }

    fn record_failure(
        &self,
        execution: &Execution,
        stage: &ServiceDescriptor,
        started_at: DateTime<Utc>,
        clock: Instant,
        error: &OrchestratorError,
    ) {
        let status = match error {
            OrchestratorError::StageFailure { status, .. } => *status,
            _ => None,
        };
        self.record(
            execution,
            stage,
            started_at,
            clock,
            StageOutcome::Failed {
                status,
                reason: error.to_string(),
            },
        );
    }
}
