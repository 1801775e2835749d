use super::PortSpec;
use std::collections::BTreeMap;

pub const ANY_HOST_IP: &str = "0.0.0.0";

/// Host side of a port binding. `host_port: None` lets the engine pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostBinding {
    pub host_ip: String,
    pub host_port: Option<u16>,
}

impl HostBinding {
    pub fn fixed(port: u16) -> Self {
        Self {
            host_ip: ANY_HOST_IP.to_string(),
            host_port: Some(port),
        }
    }

    pub fn random() -> Self {
        Self {
            host_ip: ANY_HOST_IP.to_string(),
            host_port: None,
        }
    }
}

pub type PortBindings = BTreeMap<PortSpec, HostBinding>;

/// Everything the engine needs to create one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub image: String,
    pub exposed_ports: Vec<PortSpec>,
    pub port_bindings: PortBindings,
    pub cmd: Vec<String>,
}

/// Subset of inspect output the fixtures care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    /// Bindings the engine actually resolved
    pub ports: BTreeMap<PortSpec, Vec<u16>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A container created by the fixture manager and not yet torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    pub id: String,
    pub image: String,
    pub ports: BTreeMap<PortSpec, Vec<u16>>,
}

impl RunningContainer {
    pub fn host_port(&self, container_port: PortSpec) -> Option<u16> {
        self.ports
            .get(&container_port)
            .and_then(|ports| ports.first().copied())
    }
}
