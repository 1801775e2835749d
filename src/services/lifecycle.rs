use crate::error::Result;
use crate::infra::{ConnectionBuilder, FixtureConfig};
use crate::services::FixtureManager;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// When containers are started relative to the tests that use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleMode {
    /// Fresh containers around every test
    #[default]
    PerTest,
    /// One set of containers shared by the whole group
    SingleInstance,
}

/// Calls the fixture manager at the points a test harness exposes:
/// before/after the group and before/after each test.
#[derive(Debug)]
pub struct FixtureLifecycle {
    manager: FixtureManager,
    mode: LifecycleMode,
    pull_on_start: bool,
    finished: AtomicBool,
}

impl FixtureLifecycle {
    pub fn new(manager: FixtureManager, mode: LifecycleMode) -> Self {
        Self {
            manager,
            mode,
            pull_on_start: false,
            finished: AtomicBool::new(false),
        }
    }

    pub fn with_pull_on_start(mut self, pull: bool) -> Self {
        self.pull_on_start = pull;
        self
    }

    /// Validates the images, connects to the engine and wires the manager.
    pub fn from_config(config: &FixtureConfig) -> Result<Self> {
        let images = config.image_group()?;
        let engine = ConnectionBuilder::new(config.connection.clone()).build()?;
        let manager = FixtureManager::new(Arc::new(engine), images);

        let mode = if config.single_instance {
            LifecycleMode::SingleInstance
        } else {
            LifecycleMode::PerTest
        };

        Ok(Self::new(manager, mode).with_pull_on_start(config.pull_on_start))
    }

    pub fn manager(&self) -> &FixtureManager {
        &self.manager
    }

    pub fn mode(&self) -> LifecycleMode {
        self.mode
    }

    pub fn before_all(&self) -> Result<()> {
        if self.pull_on_start {
            self.manager.pull_images()?;
        }

        if self.mode == LifecycleMode::SingleInstance {
            self.manager.start_containers()?;
        }
        Ok(())
    }

    pub fn before_each(&self) -> Result<()> {
        if self.mode == LifecycleMode::PerTest {
            self.manager.start_containers()?;
        }
        Ok(())
    }

    pub fn after_each(&self) -> Result<()> {
        if self.mode == LifecycleMode::PerTest {
            self.manager.clear_after_test()?;
        }
        Ok(())
    }

    /// Clears whatever is left and closes the engine. Runs once; later
    /// calls are no-ops. The engine is closed even when cleanup fails.
    pub fn after_all(&self) -> Result<()> {
        if self.finished.swap(true, Ordering::SeqCst) {
            debug!("Ciclo de fixtures já encerrado");
            return Ok(());
        }

        let cleared = self.manager.clear_after_test();
        if let Err(e) = self.manager.close() {
            warn!("  Falha ao encerrar conexão: {}", e);
        }
        info!(" Fixtures encerradas");
        cleared
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Runs one test between `before_each` and `after_each`.
    ///
    /// Teardown always runs, even if the test panics; the panic is resumed
    /// afterwards. Teardown errors are logged and never replace the test's
    /// own outcome.
    pub fn run_test<T, F>(&self, test: F) -> Result<T>
    where
        F: FnOnce(&FixtureManager) -> T,
    {
        if let Err(e) = self.before_each() {
            self.teardown_after_each();
            return Err(e);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| test(&self.manager)));
        self.teardown_after_each();

        match outcome {
            Ok(value) => Ok(value),
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Runs `before_all` and hands back a guard that finishes the cycle on drop.
    pub fn start(self) -> Result<FixtureGuard> {
        let guard = FixtureGuard { lifecycle: self };
        guard.lifecycle.before_all()?;
        Ok(guard)
    }

    fn teardown_after_each(&self) {
        let result = match self.mode {
            LifecycleMode::PerTest => self.manager.clear_after_test(),
            LifecycleMode::SingleInstance => Ok(()),
        };
        if let Err(e) = result {
            warn!("  Limpeza após o teste falhou: {}", e);
        }
    }
}

/// Keeps fixtures alive for its scope and tears them down when dropped.
///
/// If `before_all` fails inside [`FixtureLifecycle::start`], the guard is
/// dropped on the way out, so partially started containers are still removed.
#[derive(Debug)]
pub struct FixtureGuard {
    lifecycle: FixtureLifecycle,
}

impl FixtureGuard {
    pub fn lifecycle(&self) -> &FixtureLifecycle {
        &self.lifecycle
    }

    pub fn manager(&self) -> &FixtureManager {
        self.lifecycle.manager()
    }

    pub fn run_test<T, F>(&self, test: F) -> Result<T>
    where
        F: FnOnce(&FixtureManager) -> T,
    {
        self.lifecycle.run_test(test)
    }

    /// Finishes the cycle now and reports cleanup errors.
    pub fn finish(self) -> Result<()> {
        self.lifecycle.after_all()
    }
}

impl Drop for FixtureGuard {
    fn drop(&mut self) {
        if self.lifecycle.is_finished() {
            return;
        }
        if let Err(e) = self.lifecycle.after_all() {
            warn!("  Falha ao encerrar fixtures: {}", e);
        }
    }
}
