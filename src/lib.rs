pub mod cli;
pub mod domain;
pub mod error;
pub mod infra;
pub mod logging;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{
    ConnectionConfig, ContainerEngine, ImageSpec, ImageSpecGroup, InitCommand, PortSpec,
    RunningContainer,
};
pub use error::{FixtureError, Result};
pub use infra::{ConnectionBuilder, DockerCliAdapter, FixtureConfig, load_fixture_config};
pub use services::{FixtureGuard, FixtureLifecycle, FixtureManager, LifecycleMode};
