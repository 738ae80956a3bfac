//! CLI subcommands — one per lifecycle verb, plus validate.
//!
//! Targets are positional identifiers in the resolution grammar:
//! `$all`, `%<kind>`, `[@]<name>[:<filter>...]`. No targets means `$all`.

use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::config;
use crate::core::ops::{Dispatcher, OpOptions, Verb};
use crate::core::registry::NodeRegistry;
use crate::core::resolver;
use crate::runtime::docker::DockerClient;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate stevedore.yaml without touching the container engine
    Validate {
        /// Path to stevedore.yaml
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,
    },

    /// Show image and container state for targets
    Status {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        /// Target identifiers
        targets: Vec<String>,
    },

    /// Build images for buildable targets
    Build {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Rebuild without cache
        #[arg(long)]
        force: bool,
    },

    /// Pull images for buildable targets
    Pull {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Pull even if the image is present
        #[arg(long)]
        force: bool,
    },

    /// Create containers for targets
    Create {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Recreate existing containers
        #[arg(long)]
        force: bool,

        /// Override the configured command
        #[arg(long = "cmd", value_name = "CMD", num_args = 1..)]
        command: Vec<String>,
    },

    /// Start containers for targets
    Start {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        #[arg(long)]
        force: bool,
    },

    /// Stop containers for targets
    Stop {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Kill instead of a graceful stop
        #[arg(long)]
        force: bool,

        /// Grace period in seconds (default: per-node stop_timeout)
        #[arg(short, long)]
        timeout: Option<u32>,
    },

    /// Pause running containers
    Pause {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,
    },

    /// Unpause paused containers
    Unpause {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,
    },

    /// Remove containers for targets
    Rm {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Remove running containers too
        #[arg(long)]
        force: bool,
    },

    /// Run a command node (mints a transient instance)
    Run {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Override the configured command
        #[arg(long = "cmd", value_name = "CMD", num_args = 1..)]
        command: Vec<String>,

        /// Use this instance id instead of a generated one
        #[arg(long)]
        instance: Option<String>,
    },

    /// Commit containers to an image
    Commit {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Image tag (default: the node's image)
        #[arg(long)]
        tag: Option<String>,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Scale a node's instances up or down to a count
    Scale {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        /// Desired number of active instances
        #[arg(short = 'n', long)]
        count: usize,
    },

    /// Remove every container of the targets, default or not
    Clean {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,
    },

    /// Remove images for buildable targets
    Destroy {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        #[arg(long)]
        force: bool,
    },

    /// Attach to a running container
    Attach {
        #[arg(short, long, default_value = "stevedore.yaml")]
        file: PathBuf,

        targets: Vec<String>,

        #[arg(long)]
        force: bool,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Status { file, targets } => {
            run_op(&file, &targets, Verb::Status, OpOptions::default())
        }
        Commands::Build {
            file,
            targets,
            force,
        } => run_op(&file, &targets, Verb::Build, with_force(force)),
        Commands::Pull {
            file,
            targets,
            force,
        } => run_op(&file, &targets, Verb::Pull, with_force(force)),
        Commands::Create {
            file,
            targets,
            force,
            command,
        } => run_op(
            &file,
            &targets,
            Verb::Create,
            OpOptions {
                force,
                command: non_empty(command),
                ..OpOptions::default()
            },
        ),
        Commands::Start {
            file,
            targets,
            force,
        } => run_op(&file, &targets, Verb::Start, with_force(force)),
        Commands::Stop {
            file,
            targets,
            force,
            timeout,
        } => run_op(
            &file,
            &targets,
            Verb::Stop,
            OpOptions {
                force,
                timeout,
                ..OpOptions::default()
            },
        ),
        Commands::Pause { file, targets } => {
            run_op(&file, &targets, Verb::Pause, OpOptions::default())
        }
        Commands::Unpause { file, targets } => {
            run_op(&file, &targets, Verb::Unpause, OpOptions::default())
        }
        Commands::Rm {
            file,
            targets,
            force,
        } => run_op(&file, &targets, Verb::Remove, with_force(force)),
        Commands::Run {
            file,
            targets,
            command,
            instance,
        } => run_op(
            &file,
            &targets,
            Verb::Run,
            OpOptions {
                command: non_empty(command),
                instance_id: instance,
                ..OpOptions::default()
            },
        ),
        Commands::Commit {
            file,
            targets,
            tag,
            message,
        } => run_op(
            &file,
            &targets,
            Verb::Commit,
            OpOptions {
                tag,
                message,
                ..OpOptions::default()
            },
        ),
        Commands::Scale {
            file,
            targets,
            count,
        } => run_op(
            &file,
            &targets,
            Verb::Scale,
            OpOptions {
                count: Some(count),
                ..OpOptions::default()
            },
        ),
        Commands::Clean { file, targets } => {
            run_op(&file, &targets, Verb::Clean, OpOptions::default())
        }
        Commands::Destroy {
            file,
            targets,
            force,
        } => run_op(&file, &targets, Verb::Destroy, with_force(force)),
        Commands::Attach {
            file,
            targets,
            force,
        } => run_op(&file, &targets, Verb::Attach, with_force(force)),
    }
}

fn with_force(force: bool) -> OpOptions {
    OpOptions {
        force,
        ..OpOptions::default()
    }
}

fn non_empty(command: Vec<String>) -> Option<Vec<String>> {
    if command.is_empty() {
        None
    } else {
        Some(command)
    }
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = config::parse_config_file(file).map_err(|e| e.to_string())?;
    let errors = config::validate_config(&config);

    if errors.is_empty() {
        println!(
            "OK: {} ({} node{})",
            config.project,
            config.nodes.len(),
            if config.nodes.len() == 1 { "" } else { "s" }
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate the project file, then build the registry.
fn load_registry(file: &Path) -> Result<NodeRegistry, String> {
    let config = config::parse_config_file(file).map_err(|e| e.to_string())?;
    let errors = config::validate_config(&config);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }
    NodeRegistry::from_config(&config).map_err(|e| e.to_string())
}

fn run_op(file: &Path, targets: &[String], verb: Verb, opts: OpOptions) -> Result<(), String> {
    let registry = load_registry(file)?;
    let client = DockerClient::new();
    let resolved = resolver::resolve(&registry, targets);
    let dispatcher = Dispatcher::new(&registry, &client);
    let summary = dispatcher.execute(verb, &resolved, &opts);

    println!(
        "{}: {} node(s) processed, {} skipped, {} step(s) failed",
        verb.name(),
        summary.visited,
        summary.skipped,
        summary.failed
    );
    Ok(())
}
