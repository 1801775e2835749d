mod fixture_manager;
mod lifecycle;

pub use fixture_manager::{FixtureManager, IMPLICIT_TLS_PORT, MAX_PULL_RETRIES, port_bindings};
pub use lifecycle::{FixtureGuard, FixtureLifecycle, LifecycleMode};
