pub mod connection;
mod container;
pub mod image;
pub mod traits;

pub use connection::{
    ConnectionConfig, ConnectionMode, ExplicitConnection, RegistryAuth, TlsMaterial,
};
pub use container::{
    ANY_HOST_IP, ContainerConfig, ContainerInfo, ExecOutput, HostBinding, PortBindings,
    RunningContainer,
};
pub use image::{ImageSpec, ImageSpecGroup, InitCommand, PortSpec, Protocol};
pub use traits::{ContainerEngine, Delay, ThreadSleep};
