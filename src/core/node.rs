//! Node: a named container blueprint with a kind, a capability predicate,
//! and an owned instance strategy.
//!
//! A node's kind fixes its legal lifecycle actions. Buildability is
//! orthogonal to kind: configuring a build path makes build/pull/destroy
//! available on any kind, and a Build node is buildable by definition. The
//! capability check is pure data — it never consults runtime state.

use super::instances::InstanceStrategy;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node kind — fixes a node's legal lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Build,
    Volume,
    Service,
    Command,
}

impl Kind {
    /// Case-insensitive parse, used by `%<kind>` target identifiers.
    pub fn parse(s: &str) -> Option<Kind> {
        match s.to_ascii_lowercase().as_str() {
            "build" => Some(Kind::Build),
            "volume" => Some(Kind::Volume),
            "service" => Some(Kind::Service),
            "command" => Some(Kind::Command),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Volume => write!(f, "volume"),
            Self::Service => write!(f, "service"),
            Self::Command => write!(f, "command"),
        }
    }
}

/// Lifecycle action gated by the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Build,
    Pull,
    Create,
    Start,
    Run,
    Commit,
    Destroy,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "build"),
            Self::Pull => write!(f, "pull"),
            Self::Create => write!(f, "create"),
            Self::Start => write!(f, "start"),
            Self::Run => write!(f, "run"),
            Self::Commit => write!(f, "commit"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// A link to another node's container, with an optional alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub node: String,
    pub alias: Option<String>,
}

impl Link {
    /// Parse `"node"` or `"node:alias"`.
    pub fn parse(raw: &str) -> Link {
        match raw.split_once(':') {
            Some((node, alias)) => Link {
                node: node.to_string(),
                alias: Some(alias.to_string()),
            },
            None => Link {
                node: raw.to_string(),
                alias: None,
            },
        }
    }

    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.node)
    }
}

/// Runtime configuration passed through to the container client.
///
/// `link_refs` and `volumes_from_refs` carry container names, pre-resolved
/// by the registry from sibling strategies; the raw node names live on the
/// owning [`Node`] and feed the dependency graph.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSpec {
    pub image: String,
    pub build_path: Option<String>,
    pub command: Vec<String>,
    pub env: IndexMap<String, String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    /// (container, alias) pairs for `--link`.
    pub link_refs: Vec<(String, String)>,
    /// Container names for `--volumes-from`.
    pub volumes_from_refs: Vec<String>,
    /// Grace period in seconds handed to the client on stop.
    pub stop_timeout: u32,
}

/// A named container blueprint.
#[derive(Debug)]
pub struct Node {
    pub name: String,
    pub kind: Kind,
    buildable: bool,
    pub strategy: InstanceStrategy,
    /// Explicit dependency declarations.
    pub requires: Vec<String>,
    /// Linked sibling nodes (implicit dependencies).
    pub links: Vec<Link>,
    /// Siblings whose volumes this node shares (implicit dependencies).
    pub volumes_from: Vec<String>,
    pub runtime: RuntimeSpec,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        kind: Kind,
        strategy: InstanceStrategy,
        requires: Vec<String>,
        links: Vec<Link>,
        volumes_from: Vec<String>,
        runtime: RuntimeSpec,
    ) -> Node {
        let buildable = kind == Kind::Build || runtime.build_path.is_some();
        Node {
            name: name.into(),
            kind,
            buildable,
            strategy,
            requires,
            links,
            volumes_from,
            runtime,
        }
    }

    pub fn buildable(&self) -> bool {
        self.buildable
    }

    /// Whether `action` is legal for this node. Pure function of kind plus
    /// build-path presence, resolved once at construction.
    pub fn can(&self, action: Action) -> bool {
        match action {
            Action::Build | Action::Pull | Action::Destroy => self.buildable,
            Action::Create => matches!(self.kind, Kind::Volume | Kind::Service),
            Action::Start => self.kind == Kind::Service,
            Action::Run => self.kind == Kind::Command,
            Action::Commit => matches!(self.kind, Kind::Volume | Kind::Service | Kind::Command),
        }
    }

    /// Manual plus implicit dependencies (link targets, volume sources) in
    /// first-mention order, deduplicated.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !deps.iter().any(|d| d == name) {
                deps.push(name.to_string());
            }
        };
        for dep in &self.requires {
            push(dep);
        }
        for link in &self.links {
            push(&link.node);
        }
        for source in &self.volumes_from {
            push(source);
        }
        deps
    }
}
