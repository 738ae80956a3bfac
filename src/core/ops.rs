//! Operation dispatch: walk a resolved target set in dependency order, gate
//! each target on its capability, and drive the runtime client.
//!
//! The dispatcher is a pure sequencing layer. It performs no retries and no
//! state mutation of its own; each unit (node or instance) is processed to
//! completion before the next begins, and a failed client call is recorded
//! and skipped past rather than aborting the run.

use std::fmt;

use tracing::{error, info, warn};

use super::instances::InstanceFilter;
use super::node::{Action, Node};
use super::registry::NodeRegistry;
use super::resolver::Target;
use crate::runtime::{ClientError, RuntimeClient};

/// An operation verb, as named on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Build,
    Pull,
    Create,
    Start,
    Stop,
    Pause,
    Unpause,
    Remove,
    Run,
    Commit,
    Scale,
    Clean,
    Destroy,
    Attach,
    Status,
}

impl Verb {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Pull => "pull",
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Remove => "rm",
            Self::Run => "run",
            Self::Commit => "commit",
            Self::Scale => "scale",
            Self::Clean => "clean",
            Self::Destroy => "destroy",
            Self::Attach => "attach",
            Self::Status => "status",
        }
    }

    /// The capability a node must have for this verb. `None` means ungated.
    /// Verbs absent from the capability table are gated by the lifecycle
    /// family they belong to: container-running verbs require `start`,
    /// container-existence verbs require `create`.
    fn required_action(&self) -> Option<Action> {
        match self {
            Self::Build => Some(Action::Build),
            Self::Pull => Some(Action::Pull),
            Self::Destroy => Some(Action::Destroy),
            Self::Create | Self::Remove | Self::Clean => Some(Action::Create),
            Self::Start | Self::Stop | Self::Pause | Self::Unpause | Self::Attach => {
                Some(Action::Start)
            }
            Self::Scale => Some(Action::Start),
            Self::Run => Some(Action::Run),
            Self::Commit => Some(Action::Commit),
            Self::Status => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Options threaded through to individual verbs.
#[derive(Debug, Clone, Default)]
pub struct OpOptions {
    pub force: bool,
    /// Stop grace period override in seconds; defaults to the node's own.
    pub timeout: Option<u32>,
    /// Command override for create/run.
    pub command: Option<Vec<String>>,
    /// Image tag for commit; defaults to the node's image.
    pub tag: Option<String>,
    /// Commit message.
    pub message: Option<String>,
    /// Desired instance count for scale.
    pub count: Option<usize>,
    /// Caller-supplied id for a temporary run instance.
    pub instance_id: Option<String>,
}

/// What one operation run did. Partial failure is expected in multi-node
/// operations; the operation still "ran" when `failed > 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpSummary {
    pub visited: u32,
    pub skipped: u32,
    pub failed: u32,
}

enum VerbOutcome {
    Done { failures: u32 },
    Skipped,
}

/// Sequences one verb over a sorted target set.
pub struct Dispatcher<'a> {
    registry: &'a NodeRegistry,
    client: &'a dyn RuntimeClient,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a NodeRegistry, client: &'a dyn RuntimeClient) -> Self {
        Self { registry, client }
    }

    /// Walk the targets in their given (already sorted) order.
    pub fn execute(&self, verb: Verb, targets: &[Target], opts: &OpOptions) -> OpSummary {
        let mut summary = OpSummary::default();

        for target in targets {
            let Some(node) = self.registry.get(&target.name) else {
                continue;
            };

            if let Some(action) = verb.required_action() {
                if !node.can(action) {
                    info!(
                        node = %node.name,
                        verb = %verb,
                        "action not permitted for node kind, skipping"
                    );
                    summary.skipped += 1;
                    continue;
                }
            }

            match self.run_verb(verb, node, target, opts) {
                VerbOutcome::Skipped => summary.skipped += 1,
                VerbOutcome::Done { failures } => {
                    summary.visited += 1;
                    summary.failed += failures;
                }
            }
        }

        summary
    }

    fn run_verb(&self, verb: Verb, node: &Node, target: &Target, opts: &OpOptions) -> VerbOutcome {
        let failures = match verb {
            Verb::Build => self.node_call(node, verb, self.client.build(node, opts.force)),
            Verb::Pull => self.node_call(node, verb, self.client.pull(node, opts.force)),
            Verb::Destroy => {
                self.node_call(node, verb, self.client.destroy_image(node, opts.force))
            }
            Verb::Status => return self.status(node, target),
            Verb::Create => self.each_instance(node, &target.filter, verb, |container| {
                self.client
                    .create(node, container, opts.command.as_deref(), opts.force)
            }),
            Verb::Start => self.each_instance(node, &target.filter, verb, |container| {
                self.client.start(container, opts.force)
            }),
            Verb::Stop => {
                let timeout = opts.timeout.unwrap_or(node.runtime.stop_timeout);
                self.each_instance(node, &target.filter, verb, |container| {
                    self.client.stop(container, opts.force, timeout)
                })
            }
            Verb::Pause => self.each_instance(node, &target.filter, verb, |container| {
                self.client.pause(container)
            }),
            Verb::Unpause => self.each_instance(node, &target.filter, verb, |container| {
                self.client.unpause(container)
            }),
            Verb::Remove => self.each_instance(node, &target.filter, verb, |container| {
                self.client.remove(container, opts.force)
            }),
            Verb::Clean => {
                // clean acts on every instance regardless of default-ness
                let mut all = target.filter.clone();
                all.use_all();
                self.each_instance(node, &all, verb, |container| {
                    if self.client.has_container(container) {
                        self.client.remove(container, true)
                    } else {
                        Ok(())
                    }
                })
            }
            Verb::Commit => {
                let tag = opts.tag.as_deref().unwrap_or(&node.runtime.image);
                let message = opts.message.as_deref().unwrap_or("");
                self.each_instance(node, &target.filter, verb, |container| {
                    self.client.commit(container, tag, message)
                })
            }
            Verb::Attach => self.each_instance(node, &target.filter, verb, |container| {
                self.client.attach(container, opts.force)
            }),
            Verb::Run => return self.run_command(node, target, opts),
            Verb::Scale => return self.scale(node, opts),
        };
        VerbOutcome::Done { failures }
    }

    /// Run a node's command. A Temporary strategy mints a transient
    /// instance whose container is removed after the run; any other
    /// strategy runs across the selected instances.
    fn run_command(&self, node: &Node, target: &Target, opts: &OpOptions) -> VerbOutcome {
        match node.strategy.create_temporary(opts.instance_id.as_deref()) {
            Some(instance) => {
                let container = self.registry.machine_name(&node.name, &instance.id);
                let mut failures = 0;
                if let Err(e) = self.client.run(node, &container, opts.command.as_deref()) {
                    error!(node = %node.name, instance = %instance.id, error = %e, "run failed");
                    failures += 1;
                }
                if let Err(e) = self.client.remove(&container, true) {
                    error!(
                        node = %node.name,
                        instance = %instance.id,
                        error = %e,
                        "failed to remove transient container"
                    );
                    failures += 1;
                }
                VerbOutcome::Done { failures }
            }
            None => VerbOutcome::Done {
                failures: self.each_instance(node, &target.filter, Verb::Run, |container| {
                    self.client.run(node, container, opts.command.as_deref())
                }),
            },
        }
    }

    /// Count-based scale-up/down. Activation state lives in the container
    /// runtime: slots below the desired count are created and started, slots
    /// at or above it are stopped if running. The strategy itself is never
    /// mutated.
    fn scale(&self, node: &Node, opts: &OpOptions) -> VerbOutcome {
        let Some(count) = opts.count else {
            warn!(node = %node.name, "scale requires a count, skipping");
            return VerbOutcome::Skipped;
        };
        let maximum = match node.strategy {
            super::instances::InstanceStrategy::Scaled { maximum, .. } => maximum,
            _ => {
                info!(node = %node.name, "node does not use a scaled strategy, skipping");
                return VerbOutcome::Skipped;
            }
        };
        let count = if count > maximum {
            warn!(
                node = %node.name,
                count,
                maximum,
                "requested count exceeds maximum, clamping"
            );
            maximum
        } else {
            count
        };

        let mut failures = 0;
        for (idx, instance) in node.strategy.instances_order().iter().enumerate() {
            let container = self.registry.machine_name(&node.name, &instance.id);
            if idx < count {
                if !self.client.has_container(&container) {
                    if let Err(e) = self.client.create(node, &container, None, false) {
                        error!(node = %node.name, instance = %instance.id, error = %e, "create failed");
                        failures += 1;
                        continue;
                    }
                }
                if !self.client.is_running(&container) {
                    if let Err(e) = self.client.start(&container, false) {
                        error!(node = %node.name, instance = %instance.id, error = %e, "start failed");
                        failures += 1;
                    }
                }
            } else if self.client.is_running(&container) {
                if let Err(e) = self.client.stop(&container, false, node.runtime.stop_timeout) {
                    error!(node = %node.name, instance = %instance.id, error = %e, "stop failed");
                    failures += 1;
                }
            }
        }
        VerbOutcome::Done { failures }
    }

    fn status(&self, node: &Node, target: &Target) -> VerbOutcome {
        let image_state = if self.client.has_image(node) {
            "present"
        } else {
            "missing"
        };
        println!(
            "{} ({}) image {} [{}]",
            node.name, node.kind, node.runtime.image, image_state
        );
        for instance in target.filter.select(&node.strategy) {
            let container = self.registry.machine_name(&node.name, &instance.id);
            let state = if self.client.is_running(&container) {
                "running"
            } else if self.client.has_container(&container) {
                "stopped"
            } else {
                "absent"
            };
            println!("  {} [{}]", container, state);
        }
        VerbOutcome::Done { failures: 0 }
    }

    fn node_call(&self, node: &Node, verb: Verb, result: Result<(), ClientError>) -> u32 {
        match result {
            Ok(()) => 0,
            Err(e) => {
                error!(node = %node.name, verb = %verb, error = %e, "client call failed");
                1
            }
        }
    }

    fn each_instance<F>(&self, node: &Node, filter: &InstanceFilter, verb: Verb, mut call: F) -> u32
    where
        F: FnMut(&str) -> Result<(), ClientError>,
    {
        let mut failures = 0;
        for instance in filter.select(&node.strategy) {
            let container = self.registry.machine_name(&node.name, &instance.id);
            if let Err(e) = call(&container) {
                error!(
                    node = %node.name,
                    instance = %instance.id,
                    verb = %verb,
                    error = %e,
                    "client call failed"
                );
                failures += 1;
            }
        }
        failures
    }
}
