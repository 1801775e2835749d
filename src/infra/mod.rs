pub mod config;
pub mod connection_builder;
pub mod docker_adapter;

pub use config::{FixtureConfig, load_fixture_config};
pub use connection_builder::ConnectionBuilder;
pub use docker_adapter::DockerCliAdapter;
