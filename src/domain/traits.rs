use super::{ContainerConfig, ContainerInfo, ExecOutput};
use crate::error::Result;
use std::fmt::Debug;
use std::time::Duration;

/// Trait for container engine operations
pub trait ContainerEngine: Send + Sync + Debug {
    /// Pull an image from its registry
    fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container and return its id. Must not pull implicitly:
    /// a missing image is reported as `FixtureError::ImageNotFound`.
    fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    /// Inspect a container
    fn inspect_container(&self, id: &str) -> Result<ContainerInfo>;

    /// Start a created container
    fn start_container(&self, id: &str) -> Result<()>;

    /// Run a command inside a container with stdout and stderr attached
    fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput>;

    /// Kill a running container
    fn kill_container(&self, id: &str) -> Result<()>;

    /// Remove a container
    fn remove_container(&self, id: &str) -> Result<()>;

    /// Release the connection; later calls fail with `FixtureError::Closed`
    fn close(&self) -> Result<()>;
}

/// Blocking pause between start and init steps.
pub trait Delay: Send + Sync + Debug {
    fn pause(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
