//! Node registry: the insertion-ordered collection of nodes for one project.
//!
//! Built once from the parsed config, prepared once after every node exists,
//! then read-only for the remainder of the run.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::warn;

use super::graph::DependencyGraph;
use super::instances::{machine_name, InstanceStrategy};
use super::node::{Link, Node, RuntimeSpec};
use crate::config::{Config, InstanceSpec, NodeDef};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },
    #[error("node '{node}': {reason}")]
    InvalidNode { node: String, reason: String },
}

/// All nodes of one project, keyed by unique name, in declaration order.
#[derive(Debug)]
pub struct NodeRegistry {
    project: String,
    nodes: IndexMap<String, Node>,
}

impl NodeRegistry {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            nodes: IndexMap::new(),
        }
    }

    /// Build a registry from a validated config and prepare it.
    pub fn from_config(config: &Config) -> Result<NodeRegistry, RegistryError> {
        let mut registry = NodeRegistry::new(&config.project);
        for (name, def) in &config.nodes {
            let node = build_node(&config.project, name, def, &config.nodes)?;
            registry.insert(node)?;
        }
        registry.prepare()?;
        Ok(registry)
    }

    /// Register a node. Names are unique; duplicates are load-time errors.
    pub fn insert(&mut self, node: Node) -> Result<(), RegistryError> {
        if self.nodes.contains_key(&node.name) {
            return Err(RegistryError::DuplicateNode(node.name));
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Resolve cross-node references, once, after all nodes exist. A node
    /// cannot validate a dependency on a sibling that was not yet registered
    /// at its own insertion time, so the check lives here.
    pub fn prepare(&self) -> Result<(), RegistryError> {
        for node in self.nodes.values() {
            for dep in node.dependencies() {
                if !self.nodes.contains_key(&dep) {
                    return Err(RegistryError::UnknownDependency {
                        node: node.name.clone(),
                        dependency: dep,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// External container name for one of this project's instances.
    pub fn machine_name(&self, node: &str, instance_id: &str) -> String {
        machine_name(&self.project, node, instance_id)
    }

    /// Union of manual and implicit dependency edges, dep -> dependent.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for name in self.nodes.keys() {
            graph.add_node(name);
        }
        for node in self.nodes.values() {
            for dep in node.dependencies() {
                graph.add_edge(&dep, &node.name);
            }
        }
        graph
    }
}

/// Construct one node from its definition. Container references for links
/// and volumes_from resolve to the sibling's first default instance; the
/// sibling's declaration is enough to compute that without touching the
/// runtime.
fn build_node(
    project: &str,
    name: &str,
    def: &NodeDef,
    siblings: &IndexMap<String, NodeDef>,
) -> Result<Node, RegistryError> {
    let spec = def
        .instance_spec()
        .map_err(|reason| RegistryError::InvalidNode {
            node: name.to_string(),
            reason,
        })?;
    let strategy = strategy_from_spec(&spec);

    let links: Vec<Link> = def.links.iter().map(|raw| Link::parse(raw)).collect();

    let mut link_refs = Vec::new();
    for link in &links {
        match default_instance_id(siblings, &link.node) {
            Some(id) => link_refs.push((
                machine_name(project, &link.node, &id),
                link.alias().to_string(),
            )),
            None => warn!(
                node = name,
                target = %link.node,
                "link target has no default instance, dropping link"
            ),
        }
    }

    let mut volumes_from_refs = Vec::new();
    for source in &def.volumes_from {
        match default_instance_id(siblings, source) {
            Some(id) => volumes_from_refs.push(machine_name(project, source, &id)),
            None => warn!(
                node = name,
                source = %source,
                "volume source has no default instance, dropping reference"
            ),
        }
    }

    let runtime = RuntimeSpec {
        image: def
            .image
            .clone()
            .unwrap_or_else(|| format!("{}/{}", project, name)),
        build_path: def.build.clone(),
        command: def.command.clone(),
        env: def.env.clone(),
        ports: def.ports.clone(),
        volumes: def.volumes.clone(),
        link_refs,
        volumes_from_refs,
        stop_timeout: def.stop_timeout,
    };

    Ok(Node::new(
        name,
        def.kind,
        strategy,
        def.requires.clone(),
        links,
        def.volumes_from.clone(),
        runtime,
    ))
}

fn strategy_from_spec(spec: &InstanceSpec) -> InstanceStrategy {
    match spec {
        InstanceSpec::Single => InstanceStrategy::single(),
        InstanceSpec::Fixed(names) => InstanceStrategy::fixed(names.clone()),
        InstanceSpec::Scaled { initial, maximum } => {
            InstanceStrategy::scaled(*initial, *maximum)
        }
        InstanceSpec::Temporary => InstanceStrategy::temporary(),
    }
}

/// First default instance id of a declared node, from its definition alone.
fn default_instance_id(nodes: &IndexMap<String, NodeDef>, name: &str) -> Option<String> {
    let def = nodes.get(name)?;
    match def.instance_spec().ok()? {
        InstanceSpec::Single => Some(super::instances::SINGLE_ID.to_string()),
        InstanceSpec::Fixed(names) => names.first().cloned(),
        InstanceSpec::Scaled { initial, .. } => (initial > 0).then(|| "0".to_string()),
        InstanceSpec::Temporary => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::core::node::{Action, Kind};

    fn registry_from(yaml: &str) -> NodeRegistry {
        let config = parse_config(yaml).unwrap();
        NodeRegistry::from_config(&config).unwrap()
    }

    const BASIC: &str = r#"
project: myapp
nodes:
  data:
    kind: volume
    image: busybox
  db:
    kind: service
    image: postgres:16
    volumes_from: [data]
  web:
    kind: service
    build: ./web
    instances: scaled 2 4
    requires: [db]
    links: ["db:database"]
  migrate:
    kind: command
    image: myapp/tools
    instances: temporary
    requires: [db]
"#;

    #[test]
    fn test_from_config_declaration_order() {
        let registry = registry_from(BASIC);
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["data", "db", "web", "migrate"]);
        assert_eq!(registry.project(), "myapp");
    }

    #[test]
    fn test_default_image_convention() {
        let yaml = r#"
project: p
nodes:
  web: { kind: service }
"#;
        let registry = registry_from(yaml);
        assert_eq!(registry.get("web").unwrap().runtime.image, "p/web");
    }

    #[test]
    fn test_build_path_makes_buildable() {
        let registry = registry_from(BASIC);
        assert!(registry.get("web").unwrap().can(Action::Build));
        assert!(!registry.get("db").unwrap().can(Action::Build));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut registry = NodeRegistry::new("p");
        let node = || {
            Node::new(
                "twin",
                Kind::Service,
                InstanceStrategy::single(),
                vec![],
                vec![],
                vec![],
                RuntimeSpec::default(),
            )
        };
        registry.insert(node()).unwrap();
        let err = registry.insert(node()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateNode(name) if name == "twin"));
    }

    #[test]
    fn test_prepare_rejects_unknown_dependency() {
        let mut registry = NodeRegistry::new("p");
        registry
            .insert(Node::new(
                "web",
                Kind::Service,
                InstanceStrategy::single(),
                vec!["ghost".into()],
                vec![],
                vec![],
                RuntimeSpec::default(),
            ))
            .unwrap();
        let err = registry.prepare().unwrap_err();
        assert!(
            matches!(err, RegistryError::UnknownDependency { dependency, .. } if dependency == "ghost")
        );
    }

    #[test]
    fn test_dependency_graph_union_of_manual_and_implicit() {
        let registry = registry_from(BASIC);
        let result = registry.dependency_graph().sort();
        assert!(result.cycle.is_empty());
        let pos = |n: &str| result.order.iter().position(|o| o == n).unwrap();
        // volumes_from: data before db; requires+links: db before web and migrate
        assert!(pos("data") < pos("db"));
        assert!(pos("db") < pos("web"));
        assert!(pos("db") < pos("migrate"));
    }

    #[test]
    fn test_link_refs_resolve_to_default_instance_container() {
        let registry = registry_from(BASIC);
        let web = registry.get("web").unwrap();
        assert_eq!(
            web.runtime.link_refs,
            vec![("myapp_db_single".to_string(), "database".to_string())]
        );
        let db = registry.get("db").unwrap();
        assert_eq!(db.runtime.volumes_from_refs, vec!["myapp_data_single"]);
    }

    #[test]
    fn test_link_to_temporary_node_dropped() {
        let yaml = r#"
project: p
nodes:
  job:
    kind: command
    instances: temporary
  web:
    kind: service
    links: [job]
"#;
        let registry = registry_from(yaml);
        let web = registry.get("web").unwrap();
        assert!(web.runtime.link_refs.is_empty());
        // the dependency edge still exists even though the link ref is gone
        let result = registry.dependency_graph().sort();
        assert_eq!(result.order, vec!["job", "web"]);
    }

    #[test]
    fn test_machine_name_uses_project() {
        let registry = registry_from(BASIC);
        assert_eq!(registry.machine_name("web", "0"), "myapp_web_0");
    }

    #[test]
    fn test_invalid_instance_spec_surfaces() {
        let yaml = r#"
project: p
nodes:
  web:
    kind: service
    instances: scaled 9 3
"#;
        let config = parse_config(yaml).unwrap();
        let err = NodeRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidNode { .. }));
    }
}
