//! Container runtime boundary — the client the engine drives.
//!
//! All methods are blocking and return success/failure; the engine treats
//! any failure as non-fatal to the overall operation and continues with the
//! next target or instance.

pub mod docker;

use thiserror::Error;

use crate::core::node::Node;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to invoke container engine: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("unexpected engine output: {0}")]
    Malformed(String),
}

/// Lifecycle calls against the container engine. Node-level methods act on
/// images; instance-level methods act on one container, addressed by its
/// machine name.
pub trait RuntimeClient {
    // -- Node-level --
    fn has_image(&self, node: &Node) -> bool;
    fn build(&self, node: &Node, force: bool) -> Result<(), ClientError>;
    fn pull(&self, node: &Node, force: bool) -> Result<(), ClientError>;
    fn destroy_image(&self, node: &Node, force: bool) -> Result<(), ClientError>;
    fn info(&self, node: &Node) -> Result<String, ClientError>;

    // -- Instance-level --
    fn has_container(&self, container: &str) -> bool;
    fn is_running(&self, container: &str) -> bool;
    fn create(
        &self,
        node: &Node,
        container: &str,
        cmd_override: Option<&[String]>,
        force: bool,
    ) -> Result<(), ClientError>;
    fn start(&self, container: &str, force: bool) -> Result<(), ClientError>;
    fn stop(&self, container: &str, force: bool, timeout: u32) -> Result<(), ClientError>;
    fn pause(&self, container: &str) -> Result<(), ClientError>;
    fn unpause(&self, container: &str) -> Result<(), ClientError>;
    fn remove(&self, container: &str, force: bool) -> Result<(), ClientError>;
    fn commit(&self, container: &str, tag: &str, message: &str) -> Result<(), ClientError>;
    fn run(
        &self,
        node: &Node,
        container: &str,
        cmd_override: Option<&[String]>,
    ) -> Result<(), ClientError>;
    fn attach(&self, container: &str, force: bool) -> Result<(), ClientError>;
}
