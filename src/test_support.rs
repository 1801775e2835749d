use crate::domain::{ContainerConfig, ContainerEngine, ContainerInfo, Delay, ExecOutput, PortSpec};
use crate::error::{FixtureError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

const FIRST_RANDOM_PORT: u16 = 49152;

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub config: ContainerConfig,
    pub running: bool,
    pub ports: BTreeMap<PortSpec, Vec<u16>>,
}

/// In-memory engine that records every call as `"<op>:<arg>"`.
#[derive(Debug)]
pub struct MockEngine {
    containers: RwLock<HashMap<String, MockContainer>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
    missing_images: RwLock<HashSet<String>>,
    pull_restores_images: AtomicBool,
    exec_exit_code: RwLock<i32>,
    closed: AtomicBool,
    next_id: AtomicUsize,
    next_port: AtomicU16,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(None),
            missing_images: RwLock::new(HashSet::new()),
            pull_restores_images: AtomicBool::new(true),
            exec_exit_code: RwLock::new(0),
            closed: AtomicBool::new(false),
            next_id: AtomicUsize::new(1),
            next_port: AtomicU16::new(FIRST_RANDOM_PORT),
        }
    }

    /// Makes every operation named `operation` fail with an engine error.
    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn clear_fail_on(&self) {
        *self.fail_on.write().unwrap() = None;
    }

    /// `create` reports the image as absent until it is pulled.
    pub fn set_missing_image(&self, image: &str) {
        self.missing_images.write().unwrap().insert(image.to_string());
    }

    /// When false, pulls succeed but the image stays missing.
    pub fn set_pull_restores_images(&self, restores: bool) {
        self.pull_restores_images.store(restores, Ordering::SeqCst);
    }

    pub fn set_exec_exit_code(&self, code: i32) {
        *self.exec_exit_code.write().unwrap() = code;
    }

    /// Drops a container behind the manager's back.
    pub fn forget_container(&self, id: &str) {
        self.containers.write().unwrap().remove(id);
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.write().unwrap().clear();
    }

    pub fn container(&self, id: &str) -> Option<MockContainer> {
        self.containers.read().unwrap().get(id).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.containers.read().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.is_closed() {
            return Err(FixtureError::Closed);
        }
        if let Some(ref fail_on) = *self.fail_on.read().unwrap() {
            if fail_on == operation {
                return Err(FixtureError::engine(
                    operation,
                    format!("Mock failure on: {operation}"),
                ));
            }
        }
        Ok(())
    }

    fn known(&self, id: &str) -> Result<()> {
        if self.containers.read().unwrap().contains_key(id) {
            Ok(())
        } else {
            Err(FixtureError::ContainerNotFound { id: id.to_string() })
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerEngine for MockEngine {
    fn pull_image(&self, image: &str) -> Result<()> {
        self.record_command(&format!("pull:{image}"));
        self.check("pull")?;

        if self.pull_restores_images.load(Ordering::SeqCst) {
            self.missing_images.write().unwrap().remove(image);
        }
        Ok(())
    }

    fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        self.record_command(&format!("create:{}", config.image));
        self.check("create")?;

        if self.missing_images.read().unwrap().contains(&config.image) {
            return Err(FixtureError::ImageNotFound {
                image: config.image.clone(),
            });
        }

        let id = format!("container-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.write().unwrap().insert(
            id.clone(),
            MockContainer {
                id: id.clone(),
                config: config.clone(),
                running: false,
                ports: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerInfo> {
        self.record_command(&format!("inspect:{id}"));
        self.check("inspect")?;
        self.known(id)?;

        let containers = self.containers.read().unwrap();
        let container = &containers[id];
        let status = if container.running { "running" } else { "created" };
        Ok(ContainerInfo {
            id: id.to_string(),
            name: id.to_string(),
            image: container.config.image.clone(),
            status: status.to_string(),
            ports: container.ports.clone(),
        })
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("start:{id}"));
        self.check("start")?;
        self.known(id)?;

        let mut containers = self.containers.write().unwrap();
        let Some(container) = containers.get_mut(id) else {
            return Err(FixtureError::ContainerNotFound { id: id.to_string() });
        };
        container.running = true;
        for (port, binding) in &container.config.port_bindings {
            let host_port = binding
                .host_port
                .unwrap_or_else(|| self.next_port.fetch_add(1, Ordering::SeqCst));
            container.ports.insert(*port, vec![host_port]);
        }
        Ok(())
    }

    fn exec(&self, id: &str, cmd: &[String]) -> Result<ExecOutput> {
        self.record_command(&format!("exec:{id}:{}", cmd.join(" ")));
        self.check("exec")?;
        self.known(id)?;

        Ok(ExecOutput {
            exit_code: Some(*self.exec_exit_code.read().unwrap()),
            stdout: format!("{}\n", cmd.join(" ")),
            stderr: String::new(),
        })
    }

    fn kill_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("kill:{id}"));
        self.check("kill")?;
        self.known(id)?;

        if let Some(container) = self.containers.write().unwrap().get_mut(id) {
            container.running = false;
        }
        Ok(())
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("remove:{id}"));
        self.check("remove")?;
        self.known(id)?;

        self.containers.write().unwrap().remove(id);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.record_command("close");
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(FixtureError::Closed);
        }
        Ok(())
    }
}

/// Delay that records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.lock().unwrap().clone()
    }
}

impl Delay for RecordingDelay {
    fn pause(&self, duration: Duration) {
        self.pauses.lock().unwrap().push(duration);
    }
}
