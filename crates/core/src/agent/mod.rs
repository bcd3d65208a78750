//! Pipeline execution.
//!
//! The [`PipelineAgent`] launches every component a pipeline depends on,
//! checks their versions, then runs the steps strictly in order, feeding
//! each step's output into the next step's inputs.

pub mod dependency;
pub mod error;
pub mod launcher;

use std::collections::{BTreeMap, HashMap};

use async_stream::try_stream;
use crux_protocol::{Envelope, Payload, PipelineDefinition, PipelineError, Step};
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};

use crate::component::ComponentHandle;
use crate::transport::ChannelOptions;

pub use dependency::check_version;
pub use error::AgentError;
pub use launcher::ComponentLauncher;

/// The outcome of one successfully executed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub index: usize,
    pub step: Step,

    /// The component's reply, exactly as received.
    pub result: Envelope,
}

/// Runs pipeline definitions against components started by `L`.
pub struct PipelineAgent<L: ComponentLauncher> {
    launcher: L,
    options: ChannelOptions,
    components: HashMap<String, ComponentHandle>,
}

impl<L: ComponentLauncher> PipelineAgent<L> {
    pub fn new(launcher: L, options: ChannelOptions) -> Self {
        Self {
            launcher,
            options,
            components: HashMap::new(),
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn launcher_mut(&mut self) -> &mut L {
        &mut self.launcher
    }

    pub fn into_launcher(self) -> L {
        self.launcher
    }

    /// Launch and connect to every component of `definition`.
    ///
    /// Components from a previous run are forgotten first.
    ///
    /// # Errors
    ///
    /// Returns `Launch` or `Handle` if a component cannot be started or
    /// reached, and `UnmetDependency` if its version does not satisfy the
    /// declared constraint.
    pub async fn load_components(&mut self, definition: &PipelineDefinition) -> Result<(), AgentError> {
        self.components.clear();

        for (name, dependency) in &definition.components {
            let address = self
                .launcher
                .launch(&dependency.src)
                .await
                .map_err(|e| AgentError::Launch {
                    component: name.clone(),
                    reason: format!("{:#}", e),
                })?;
            debug!(component = %name, address = %address, "Component launched");

            let handle = ComponentHandle::connect(address, self.options)
                .await
                .map_err(|source| AgentError::Handle {
                    component: name.clone(),
                    source,
                })?;
            check_version(name, handle.version(), &dependency.version)?;

            info!(
                component = %name,
                version = %handle.version(),
                address = %handle.address(),
                "Component ready"
            );
            self.components.insert(name.clone(), handle);
        }

        Ok(())
    }

    /// Run `definition`, yielding one result per completed step.
    ///
    /// Nothing happens until the stream is polled. Components are loaded on
    /// the first poll; each later poll runs exactly one step. The stream ends
    /// after the last step or right after the first error.
    pub fn run<'a>(
        &'a mut self,
        definition: &'a PipelineDefinition,
    ) -> impl Stream<Item = Result<StepResult, AgentError>> + 'a {
        try_stream! {
            definition.validate()?;
            self.load_components(definition).await?;

            let mut inputs = Payload::empty_mapping();
            for (index, step) in definition.pipeline.iter().enumerate() {
                let handle = self
                    .components
                    .get_mut(&step.component)
                    .ok_or_else(|| PipelineError::ComponentNotLoaded(step.component.clone()))?;

                info!(index, component = %step.component, "Executing step");
                let result = handle
                    .execute(step.parameters_payload(), std::mem::take(&mut inputs))
                    .await
                    .map_err(|source| AgentError::Handle {
                        component: step.component.clone(),
                        source,
                    })?;

                let result = check_reply(index, step, result)?;
                let output = result.payload.clone().unwrap_or(Payload::Null);
                inputs = match &step.remap {
                    Some(remap) => remap_output(output, remap),
                    None => output,
                };

                yield StepResult {
                    index,
                    step: step.clone(),
                    result,
                };
            }

            info!(steps = definition.pipeline.len(), "Pipeline complete");
        }
    }

    /// Ask every connected component to shut down, then forget them.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn release(&mut self) {
        for (name, mut handle) in self.components.drain() {
            if let Err(e) = handle.shutdown().await {
                warn!(component = %name, error = %e, "Shutdown request failed");
            }
        }
    }
}

/// Rename keys of a step's output according to `remap` (old -> new).
///
/// Keys without a rule pass through. Non-mapping outputs pass through
/// untouched.
pub fn remap_output(output: Payload, remap: &BTreeMap<String, String>) -> Payload {
    match output {
        Payload::Mapping(map) => Payload::Mapping(
            map.into_iter()
                .map(|(key, value)| match remap.get(&key) {
                    Some(renamed) => (renamed.clone(), value),
                    None => (key, value),
                })
                .collect(),
        ),
        other => other,
    }
}

/// Turn a failure reply into `BrokenPipeline`.
fn check_reply(index: usize, step: &Step, reply: Envelope) -> Result<Envelope, AgentError> {
    if reply.success {
        return Ok(reply);
    }

    let message = failure_message(&reply);
    error!(index, component = %step.component, message = %message, "Step failed");
    Err(AgentError::BrokenPipeline {
        index,
        component: step.component.clone(),
        message,
    })
}

fn failure_message(reply: &Envelope) -> String {
    match &reply.payload {
        Some(Payload::String(message)) => message.clone(),
        Some(Payload::Null) | None => "component reported failure".to_string(),
        Some(other) => other.to_json().to_string(),
    }
}
