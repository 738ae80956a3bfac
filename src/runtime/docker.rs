//! Container engine client backed by the `docker` binary.
//!
//! Every call shells out to `docker` and blocks until it returns. Lookup
//! results (image and container listings) are cached per run and invalidated
//! after any mutating call; the engine itself stays the authoritative source
//! of truth across operation boundaries.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::process::Command;

use tracing::debug;

use super::{ClientError, RuntimeClient};
use crate::core::node::Node;

/// Per-run cache of engine lookups.
#[derive(Debug, Default)]
struct RuntimeCache {
    /// `repo:tag` entries from `docker images`.
    images: RefCell<Option<HashSet<String>>>,
    /// container name -> running, from `docker ps -a`.
    containers: RefCell<Option<HashMap<String, bool>>>,
}

impl RuntimeCache {
    fn invalidate(&self) {
        *self.images.borrow_mut() = None;
        *self.containers.borrow_mut() = None;
    }
}

pub struct DockerClient {
    binary: String,
    cache: RuntimeCache,
}

impl DockerClient {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cache: RuntimeCache::default(),
        }
    }

    /// Run `docker <args>`, capturing output. Non-zero exit is an error.
    fn exec(&self, args: &[String]) -> Result<String, ClientError> {
        debug!(command = %format!("{} {}", self.binary, args.join(" ")), "exec");
        let output = Command::new(&self.binary).args(args).output()?;
        if !output.status.success() {
            return Err(ClientError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a mutating command and drop cached lookups.
    fn exec_mutating(&self, args: &[String]) -> Result<(), ClientError> {
        let result = self.exec(args);
        self.cache.invalidate();
        result.map(|_| ())
    }

    fn images(&self) -> HashSet<String> {
        if let Some(images) = self.cache.images.borrow().as_ref() {
            return images.clone();
        }
        let listed = self
            .exec(&args(&["images", "--format", "{{.Repository}}:{{.Tag}}"]))
            .map(|out| out.lines().map(str::to_string).collect::<HashSet<_>>())
            .unwrap_or_default();
        *self.cache.images.borrow_mut() = Some(listed.clone());
        listed
    }

    fn containers(&self) -> HashMap<String, bool> {
        if let Some(containers) = self.cache.containers.borrow().as_ref() {
            return containers.clone();
        }
        let listed = self
            .exec(&args(&["ps", "-a", "--format", "{{.Names}}\t{{.State}}"]))
            .map(|out| {
                out.lines()
                    .filter_map(|line| {
                        let (name, state) = line.split_once('\t')?;
                        Some((name.to_string(), state == "running"))
                    })
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();
        *self.cache.containers.borrow_mut() = Some(listed.clone());
        listed
    }

    fn create_args(
        &self,
        node: &Node,
        container: &str,
        cmd_override: Option<&[String]>,
    ) -> Vec<String> {
        let mut cmd = args(&["create", "--name", container]);
        for (link_container, alias) in &node.runtime.link_refs {
            cmd.push("--link".to_string());
            cmd.push(format!("{}:{}", link_container, alias));
        }
        for source in &node.runtime.volumes_from_refs {
            cmd.push("--volumes-from".to_string());
            cmd.push(source.clone());
        }
        for volume in &node.runtime.volumes {
            cmd.push("-v".to_string());
            cmd.push(volume.clone());
        }
        for port in &node.runtime.ports {
            cmd.push("-p".to_string());
            cmd.push(port.clone());
        }
        for (key, value) in &node.runtime.env {
            cmd.push("-e".to_string());
            cmd.push(format!("{}={}", key, value));
        }
        cmd.push(node.runtime.image.clone());
        let command = cmd_override.unwrap_or(&node.runtime.command);
        cmd.extend(command.iter().cloned());
        cmd
    }
}

impl Default for DockerClient {
    fn default() -> Self {
        Self::new()
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl RuntimeClient for DockerClient {
    fn has_image(&self, node: &Node) -> bool {
        let image = &node.runtime.image;
        let images = self.images();
        if image.contains(':') {
            images.contains(image)
        } else {
            images.contains(&format!("{}:latest", image))
                || images.iter().any(|i| {
                    i.split_once(':')
                        .map(|(repo, _)| repo == image.as_str())
                        .unwrap_or(false)
                })
        }
    }

    fn build(&self, node: &Node, force: bool) -> Result<(), ClientError> {
        let path = node.runtime.build_path.as_deref().unwrap_or(".");
        let mut cmd = args(&["build", "-t", &node.runtime.image]);
        if force {
            cmd.push("--no-cache".to_string());
        }
        cmd.push(path.to_string());
        self.exec_mutating(&cmd)
    }

    fn pull(&self, node: &Node, force: bool) -> Result<(), ClientError> {
        if !force && self.has_image(node) {
            return Ok(());
        }
        self.exec_mutating(&args(&["pull", &node.runtime.image]))
    }

    fn destroy_image(&self, node: &Node, force: bool) -> Result<(), ClientError> {
        let mut cmd = args(&["rmi"]);
        if force {
            cmd.push("-f".to_string());
        }
        cmd.push(node.runtime.image.clone());
        self.exec_mutating(&cmd)
    }

    fn info(&self, node: &Node) -> Result<String, ClientError> {
        let out = self.exec(&args(&["image", "inspect", &node.runtime.image]))?;
        let parsed: serde_json::Value = serde_json::from_str(&out)
            .map_err(|e| ClientError::Malformed(format!("inspect output: {}", e)))?;
        let entry = parsed
            .get(0)
            .ok_or_else(|| ClientError::Malformed("empty inspect output".to_string()))?;
        let id = entry.get("Id").and_then(|v| v.as_str()).unwrap_or("?");
        let created = entry.get("Created").and_then(|v| v.as_str()).unwrap_or("?");
        Ok(format!(
            "{}: id {} created {}",
            node.runtime.image, id, created
        ))
    }

    fn has_container(&self, container: &str) -> bool {
        self.containers().contains_key(container)
    }

    fn is_running(&self, container: &str) -> bool {
        self.containers().get(container).copied().unwrap_or(false)
    }

    fn create(
        &self,
        node: &Node,
        container: &str,
        cmd_override: Option<&[String]>,
        force: bool,
    ) -> Result<(), ClientError> {
        if self.has_container(container) {
            if !force {
                return Ok(());
            }
            self.remove(container, true)?;
        }
        self.exec_mutating(&self.create_args(node, container, cmd_override))
    }

    fn start(&self, container: &str, _force: bool) -> Result<(), ClientError> {
        if self.is_running(container) {
            return Ok(());
        }
        self.exec_mutating(&args(&["start", container]))
    }

    fn stop(&self, container: &str, force: bool, timeout: u32) -> Result<(), ClientError> {
        if force {
            return self.exec_mutating(&args(&["kill", container]));
        }
        self.exec_mutating(&args(&["stop", "-t", &timeout.to_string(), container]))
    }

    fn pause(&self, container: &str) -> Result<(), ClientError> {
        self.exec_mutating(&args(&["pause", container]))
    }

    fn unpause(&self, container: &str) -> Result<(), ClientError> {
        self.exec_mutating(&args(&["unpause", container]))
    }

    fn remove(&self, container: &str, force: bool) -> Result<(), ClientError> {
        let mut cmd = args(&["rm"]);
        if force {
            cmd.push("-f".to_string());
        }
        cmd.push(container.to_string());
        self.exec_mutating(&cmd)
    }

    fn commit(&self, container: &str, tag: &str, message: &str) -> Result<(), ClientError> {
        let mut cmd = args(&["commit"]);
        if !message.is_empty() {
            cmd.push("-m".to_string());
            cmd.push(message.to_string());
        }
        cmd.push(container.to_string());
        cmd.push(tag.to_string());
        self.exec_mutating(&cmd)
    }

    fn run(
        &self,
        node: &Node,
        container: &str,
        cmd_override: Option<&[String]>,
    ) -> Result<(), ClientError> {
        let mut cmd = self.create_args(node, container, cmd_override);
        // same argument shape as create, different verb
        cmd[0] = "run".to_string();
        self.exec_mutating(&cmd)
    }

    fn attach(&self, container: &str, _force: bool) -> Result<(), ClientError> {
        self.exec_mutating(&args(&["attach", container]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instances::InstanceStrategy;
    use crate::core::node::{Kind, RuntimeSpec};

    fn node_with(runtime: RuntimeSpec) -> Node {
        Node::new(
            "web",
            Kind::Service,
            InstanceStrategy::single(),
            vec![],
            vec![],
            vec![],
            runtime,
        )
    }

    #[test]
    fn test_create_args_full_shape() {
        let client = DockerClient::new();
        let node = node_with(RuntimeSpec {
            image: "myapp/web".into(),
            command: vec!["serve".into()],
            env: [("RAILS_ENV".to_string(), "development".to_string())]
                .into_iter()
                .collect(),
            ports: vec!["8080:80".into()],
            volumes: vec!["/src:/app".into()],
            link_refs: vec![("myapp_db_single".into(), "database".into())],
            volumes_from_refs: vec!["myapp_data_single".into()],
            ..RuntimeSpec::default()
        });

        let cmd = client.create_args(&node, "myapp_web_single", None);
        assert_eq!(
            cmd,
            vec![
                "create",
                "--name",
                "myapp_web_single",
                "--link",
                "myapp_db_single:database",
                "--volumes-from",
                "myapp_data_single",
                "-v",
                "/src:/app",
                "-p",
                "8080:80",
                "-e",
                "RAILS_ENV=development",
                "myapp/web",
                "serve",
            ]
        );
    }

    #[test]
    fn test_create_args_command_override() {
        let client = DockerClient::new();
        let node = node_with(RuntimeSpec {
            image: "img".into(),
            command: vec!["default".into()],
            ..RuntimeSpec::default()
        });
        let over = vec!["echo".to_string(), "hi".to_string()];
        let cmd = client.create_args(&node, "c", Some(&over));
        assert_eq!(cmd[cmd.len() - 2..], ["echo".to_string(), "hi".to_string()]);
        assert!(!cmd.contains(&"default".to_string()));
    }

    #[test]
    fn test_exec_missing_binary_is_spawn_error() {
        let client = DockerClient::with_binary("definitely-not-a-docker-binary");
        let err = client.exec(&args(&["version"])).unwrap_err();
        assert!(matches!(err, ClientError::Spawn(_)));
    }

    #[test]
    fn test_exec_nonzero_exit_is_command_failure() {
        // `false` exists everywhere and exits 1 with no output
        let client = DockerClient::with_binary("false");
        let err = client.exec(&args(&["anything"])).unwrap_err();
        match err {
            ClientError::CommandFailed { status, .. } => assert_eq!(status, 1),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_lookup_failure_degrades_to_empty() {
        // listing commands fail -> no images, no containers, no panic
        let client = DockerClient::with_binary("false");
        let node = node_with(RuntimeSpec {
            image: "ghost".into(),
            ..RuntimeSpec::default()
        });
        assert!(!client.has_image(&node));
        assert!(!client.has_container("ghost_c"));
        assert!(!client.is_running("ghost_c"));
    }

    #[test]
    fn test_cache_invalidation_clears_lookups() {
        let client = DockerClient::with_binary("false");
        let _ = client.containers();
        assert!(client.cache.containers.borrow().is_some());
        client.cache.invalidate();
        assert!(client.cache.containers.borrow().is_none());
        assert!(client.cache.images.borrow().is_none());
    }

    #[test]
    fn test_has_image_matches_untagged_repository() {
        let client = DockerClient::new();
        *client.cache.images.borrow_mut() =
            Some(["myapp/web:latest".to_string()].into_iter().collect());
        let tagged = node_with(RuntimeSpec {
            image: "myapp/web:latest".into(),
            ..RuntimeSpec::default()
        });
        let untagged = node_with(RuntimeSpec {
            image: "myapp/web".into(),
            ..RuntimeSpec::default()
        });
        let missing = node_with(RuntimeSpec {
            image: "myapp/api".into(),
            ..RuntimeSpec::default()
        });
        assert!(client.has_image(&tagged));
        assert!(client.has_image(&untagged));
        assert!(!client.has_image(&missing));
    }
}
