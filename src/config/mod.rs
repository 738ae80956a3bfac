//! stevedore.yaml parsing and validation.
//!
//! Parses the project file and validates structural constraints before the
//! engine sees a single node:
//! - instance specs must match `single | fixed <names...> | scaled <i> <m> | temporary`
//! - requires / links / volumes_from must reference declared nodes
//! - no self-dependencies, no duplicate fixed instance names

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::node::Kind;

/// Root configuration — the declared development environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project name; prefixes every container name.
    pub project: String,

    /// Node declarations (order-preserving — declaration order breaks ties
    /// in the execution order).
    #[serde(default)]
    pub nodes: IndexMap<String, NodeDef>,
}

/// A single node declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub kind: Kind,

    /// Image name; defaults to `<project>/<node>` when omitted.
    #[serde(default)]
    pub image: Option<String>,

    /// Build context path; presence makes the node buildable.
    #[serde(default)]
    pub build: Option<String>,

    /// Instance spec: `single | fixed <names...> | scaled <initial> <maximum> | temporary`.
    #[serde(default)]
    pub instances: Option<String>,

    /// Explicit dependencies on other nodes.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Links to other nodes (`name` or `name:alias`); implicit dependencies.
    #[serde(default)]
    pub links: Vec<String>,

    /// Nodes whose volumes this node shares; implicit dependencies.
    #[serde(default)]
    pub volumes_from: Vec<String>,

    /// Default command for create/run.
    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub env: IndexMap<String, String>,

    #[serde(default)]
    pub ports: Vec<String>,

    #[serde(default)]
    pub volumes: Vec<String>,

    /// Grace period in seconds passed through to the client on stop.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u32,
}

fn default_stop_timeout() -> u32 {
    10
}

impl NodeDef {
    /// Parse this definition's instance spec (default: `single`).
    pub fn instance_spec(&self) -> Result<InstanceSpec, String> {
        match self.instances.as_deref() {
            None => Ok(InstanceSpec::Single),
            Some(raw) => InstanceSpec::parse(raw),
        }
    }
}

/// Parsed instance spec from the `instances` grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceSpec {
    Single,
    Fixed(Vec<String>),
    Scaled { initial: usize, maximum: usize },
    Temporary,
}

impl InstanceSpec {
    /// Parse `single | fixed <names...> | scaled <initial> <maximum> | temporary`.
    pub fn parse(raw: &str) -> Result<InstanceSpec, String> {
        let mut words = raw.split_whitespace();
        let head = words.next().unwrap_or("");
        match head {
            "single" => match words.next() {
                None => Ok(InstanceSpec::Single),
                Some(extra) => Err(format!("single takes no arguments, got '{}'", extra)),
            },
            "temporary" => match words.next() {
                None => Ok(InstanceSpec::Temporary),
                Some(extra) => Err(format!("temporary takes no arguments, got '{}'", extra)),
            },
            "fixed" => {
                let names: Vec<String> = words.map(String::from).collect();
                if names.is_empty() {
                    return Err("fixed needs at least one instance name".to_string());
                }
                Ok(InstanceSpec::Fixed(names))
            }
            "scaled" => {
                let initial = parse_count(words.next(), "initial")?;
                let maximum = parse_count(words.next(), "maximum")?;
                if let Some(extra) = words.next() {
                    return Err(format!("scaled takes two arguments, got '{}'", extra));
                }
                if initial > maximum {
                    return Err(format!(
                        "scaled initial ({}) exceeds maximum ({})",
                        initial, maximum
                    ));
                }
                Ok(InstanceSpec::Scaled { initial, maximum })
            }
            "" => Err("empty instance spec".to_string()),
            other => Err(format!("unknown instance spec '{}'", other)),
        }
    }
}

fn parse_count(word: Option<&str>, what: &str) -> Result<usize, String> {
    let word = word.ok_or_else(|| format!("scaled is missing its {} count", what))?;
    word.parse::<usize>()
        .map_err(|_| format!("scaled {} count '{}' is not a number", what, word))
}

/// Load-time failure reading or parsing the project file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a stevedore.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_config(&content)
}

/// Parse a stevedore.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    Ok(serde_yaml_ng::from_str(yaml)?)
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &Config) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if config.project.is_empty() {
        push("project must not be empty".to_string());
    }

    for (name, def) in &config.nodes {
        if let Err(e) = def.instance_spec() {
            push(format!("node '{}': {}", name, e));
        }
        if let Ok(InstanceSpec::Fixed(names)) = def.instance_spec() {
            for (i, inst) in names.iter().enumerate() {
                if names[..i].contains(inst) {
                    push(format!(
                        "node '{}': duplicate fixed instance name '{}'",
                        name, inst
                    ));
                }
            }
        }

        let references = def
            .requires
            .iter()
            .map(|r| ("requires", r.as_str()))
            .chain(def.links.iter().map(|l| {
                ("links", l.split_once(':').map(|(n, _)| n).unwrap_or(l))
            }))
            .chain(def.volumes_from.iter().map(|v| ("volumes_from", v.as_str())));

        for (field, referenced) in references {
            if referenced == name {
                push(format!("node '{}' {} itself", name, field));
            } else if !config.nodes.contains_key(referenced) {
                push(format!(
                    "node '{}' {} unknown node '{}'",
                    name, field, referenced
                ));
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let yaml = r#"
project: myapp
nodes:
  db:
    kind: service
    image: postgres:16
  web:
    kind: service
    build: ./web
    instances: scaled 2 4
    requires: [db]
    links: ["db:database"]
    ports: ["8080:80"]
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.project, "myapp");
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes["db"].kind, Kind::Service);
        assert_eq!(config.nodes["web"].build.as_deref(), Some("./web"));
        let errors = validate_config(&config);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_parse_unknown_kind_rejected() {
        let yaml = r#"
project: myapp
nodes:
  x:
    kind: widget
"#;
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn test_node_declaration_order_preserved() {
        let yaml = r#"
project: p
nodes:
  zeta: { kind: service }
  alpha: { kind: service }
  mid: { kind: volume }
"#;
        let config = parse_config(yaml).unwrap();
        let names: Vec<_> = config.nodes.keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_instance_spec_grammar() {
        assert_eq!(InstanceSpec::parse("single").unwrap(), InstanceSpec::Single);
        assert_eq!(
            InstanceSpec::parse("temporary").unwrap(),
            InstanceSpec::Temporary
        );
        assert_eq!(
            InstanceSpec::parse("fixed a b").unwrap(),
            InstanceSpec::Fixed(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            InstanceSpec::parse("scaled 2 4").unwrap(),
            InstanceSpec::Scaled {
                initial: 2,
                maximum: 4
            }
        );
    }

    #[test]
    fn test_instance_spec_malformed() {
        assert!(InstanceSpec::parse("").is_err());
        assert!(InstanceSpec::parse("elastic").is_err());
        assert!(InstanceSpec::parse("fixed").is_err());
        assert!(InstanceSpec::parse("scaled 2").is_err());
        assert!(InstanceSpec::parse("scaled two four").is_err());
        assert!(InstanceSpec::parse("scaled 2 4 6").is_err());
        assert!(InstanceSpec::parse("single extra").is_err());
    }

    #[test]
    fn test_instance_spec_scaled_bounds() {
        assert!(InstanceSpec::parse("scaled 5 4").is_err());
        assert_eq!(
            InstanceSpec::parse("scaled 0 3").unwrap(),
            InstanceSpec::Scaled {
                initial: 0,
                maximum: 3
            }
        );
        assert_eq!(
            InstanceSpec::parse("scaled 4 4").unwrap(),
            InstanceSpec::Scaled {
                initial: 4,
                maximum: 4
            }
        );
    }

    #[test]
    fn test_instances_default_is_single() {
        let yaml = r#"
project: p
nodes:
  db: { kind: service }
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(
            config.nodes["db"].instance_spec().unwrap(),
            InstanceSpec::Single
        );
    }

    #[test]
    fn test_validate_unknown_references() {
        let yaml = r#"
project: p
nodes:
  web:
    kind: service
    requires: [ghost]
    links: ["phantom:db"]
    volumes_from: [shade]
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.message.contains("ghost")));
        assert!(errors.iter().any(|e| e.message.contains("phantom")));
        assert!(errors.iter().any(|e| e.message.contains("shade")));
    }

    #[test]
    fn test_validate_self_dependency() {
        let yaml = r#"
project: p
nodes:
  web:
    kind: service
    requires: [web]
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("itself")));
    }

    #[test]
    fn test_validate_malformed_instance_spec() {
        let yaml = r#"
project: p
nodes:
  web:
    kind: service
    instances: scaled 9 3
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("exceeds maximum")));
    }

    #[test]
    fn test_validate_duplicate_fixed_names() {
        let yaml = r#"
project: p
nodes:
  workers:
    kind: service
    instances: fixed a b a
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
    }

    #[test]
    fn test_validate_empty_project_name() {
        let yaml = r#"
project: ""
nodes: {}
"#;
        let config = parse_config(yaml).unwrap();
        let errors = validate_config(&config);
        assert!(errors.iter().any(|e| e.message.contains("project")));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stevedore.yaml");
        std::fs::write(
            &path,
            r#"
project: file-test
nodes: {}
"#,
        )
        .unwrap();
        let config = parse_config_file(&path).unwrap();
        assert_eq!(config.project, "file-test");
    }

    #[test]
    fn test_parse_missing_file() {
        let result = parse_config_file(Path::new("/nonexistent/stevedore.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(parse_config("not: [valid: yaml: {{").is_err());
    }
}
