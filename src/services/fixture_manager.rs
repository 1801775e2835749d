use crate::domain::{
    ContainerConfig, ContainerEngine, Delay, HostBinding, ImageSpec, ImageSpecGroup, PortBindings,
    PortSpec, RunningContainer, ThreadSleep,
};
use crate::error::{CleanupFailure, FixtureError, Result};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Container port that always gets a published host port.
pub const IMPLICIT_TLS_PORT: PortSpec = PortSpec::tcp(443);

/// Pull-and-retry cycles allowed when an image is missing locally.
pub const MAX_PULL_RETRIES: u32 = 1;

/// Owns pull, start, init and cleanup for one group of fixture images.
pub struct FixtureManager {
    engine: Arc<dyn ContainerEngine>,
    delay: Arc<dyn Delay>,
    images: ImageSpecGroup,
    containers: RwLock<Vec<RunningContainer>>,
}

impl FixtureManager {
    pub fn new(engine: Arc<dyn ContainerEngine>, images: ImageSpecGroup) -> Self {
        Self {
            engine,
            delay: Arc::new(ThreadSleep),
            images,
            containers: RwLock::new(Vec::new()),
        }
    }

    /// Replaces the blocking sleep used for init delays.
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn images(&self) -> &ImageSpecGroup {
        &self.images
    }

    pub fn pull_images(&self) -> Result<()> {
        info!(" Baixando imagens para o teste de integração...");

        for image in &self.images {
            info!(" Baixando {}...", image.name);
            self.engine.pull_image(&image.name)?;
            debug!("Imagem {} baixada", image.name);
        }

        info!(" Imagens prontas");
        Ok(())
    }

    /// Creates, starts and initializes one container per image, in order.
    ///
    /// A missing image triggers a single pull of the whole group followed by
    /// a fresh attempt; containers from the failed attempt are torn down
    /// first. A second miss is returned as [`FixtureError::ImageUnavailable`].
    pub fn start_containers(&self) -> Result<()> {
        info!(" Iniciando containers...");
        let mut pulls = 0;

        loop {
            let mut created = Vec::new();

            match self.start_all(&mut created) {
                Ok(()) => {
                    info!(" {} container(s) prontos", created.len());
                    return Ok(());
                }
                Err(FixtureError::ImageNotFound { image }) => {
                    self.rollback(&created);

                    if pulls >= MAX_PULL_RETRIES {
                        error!(" Imagem {} continua ausente após o pull", image);
                        return Err(FixtureError::ImageUnavailable {
                            image,
                            retries: pulls,
                        });
                    }

                    info!(
                        " Imagem {} não encontrada localmente, baixando do registry...",
                        image
                    );
                    self.pull_images()?;
                    pulls += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Kills and removes every tracked container, continuing past failures.
    ///
    /// The tracked set is drained before any engine call, so concurrent
    /// callers never tear the same container down twice.
    pub fn clear_after_test(&self) -> Result<()> {
        let drained = std::mem::take(&mut *self.tracked());
        if drained.is_empty() {
            return Ok(());
        }

        info!(" Encerrando {} container(s)...", drained.len());
        let failures: Vec<CleanupFailure> = drained
            .iter()
            .filter_map(|container| self.teardown(&container.id))
            .collect();

        if failures.is_empty() {
            info!(" Containers removidos");
            Ok(())
        } else {
            Err(FixtureError::Cleanup { failures })
        }
    }

    /// Releases the engine connection.
    pub fn close(&self) -> Result<()> {
        debug!("Encerrando conexão com o engine");
        self.engine.close()
    }

    pub fn running_containers(&self) -> Vec<RunningContainer> {
        self.snapshot().clone()
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.snapshot().iter().map(|c| c.id.clone()).collect()
    }

    /// Host port published for `container_port` of the first container
    /// started from `image`.
    pub fn host_port(&self, image: &str, container_port: PortSpec) -> Option<u16> {
        self.snapshot()
            .iter()
            .find(|c| c.image == image)
            .and_then(|c| c.host_port(container_port))
    }

    fn snapshot(&self) -> RwLockReadGuard<'_, Vec<RunningContainer>> {
        self.containers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracked(&self) -> RwLockWriteGuard<'_, Vec<RunningContainer>> {
        self.containers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn start_all(&self, created: &mut Vec<String>) -> Result<()> {
        for image in &self.images {
            info!(" Iniciando container de {}...", image.name);
            self.start_one(image, created)?;
            debug!("Container de {} iniciado", image.name);
        }
        Ok(())
    }

    fn start_one(&self, spec: &ImageSpec, created: &mut Vec<String>) -> Result<()> {
        let config = container_config(spec);
        let id = self.engine.create_container(&config)?;

        // Tracked from creation on, so a failed start is still cleaned up.
        self.tracked().push(RunningContainer {
            id: id.clone(),
            image: spec.name.clone(),
            ports: Default::default(),
        });
        created.push(id.clone());

        self.engine.start_container(&id)?;

        let info = self.engine.inspect_container(&id)?;
        debug!("Container {} iniciado: {:?}", id, info);
        if let Some(container) = self.tracked().iter_mut().find(|c| c.id == id) {
            container.ports = info.ports;
        }

        self.delay.pause(spec.init_delay());
        self.initialize(&id, spec)
    }

    fn initialize(&self, id: &str, spec: &ImageSpec) -> Result<()> {
        let total = spec.init_cmds.len();

        for (step, init) in spec.init_cmds.iter().enumerate() {
            info!(" Inicializando {} ({}/{}): {:?}", id, step + 1, total, init.cmd);

            let output = self.engine.exec(id, &init.cmd)?;
            debug!("stdout: {}", output.stdout.trim_end());
            debug!("stderr: {}", output.stderr.trim_end());
            if !output.success() {
                warn!(
                    "  Comando de inicialização em {} terminou com código {:?}",
                    id, output.exit_code
                );
            }

            self.delay.pause(spec.init_delay());
        }

        Ok(())
    }

    fn rollback(&self, created: &[String]) {
        if created.is_empty() {
            return;
        }

        self.tracked().retain(|c| !created.contains(&c.id));
        for id in created {
            if let Some(failure) = self.teardown(id) {
                warn!(
                    "  Falha ao desfazer container {}: {}",
                    failure.container_id, failure.reason
                );
            }
        }
    }

    /// Kill then remove. Returns the failure when the container may have leaked.
    fn teardown(&self, id: &str) -> Option<CleanupFailure> {
        debug!("Matando e removendo container {}", id);

        if let Err(e) = self.engine.kill_container(id) {
            warn!("  Falha ao matar {}: {}", id, e);
        }

        match self.engine.remove_container(id) {
            Ok(()) => {
                debug!("Container {} removido", id);
                None
            }
            Err(FixtureError::ContainerNotFound { .. }) => {
                debug!("Container {} já não existia", id);
                None
            }
            Err(e) => {
                error!("  Falha ao remover {}: {}", id, e);
                Some(CleanupFailure {
                    container_id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for FixtureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixtureManager")
            .field("engine", &self.engine)
            .field("images", &self.images)
            .field("containers", &self.container_ids())
            .finish()
    }
}

/// Fixed `0.0.0.0:<port>` binding per declared port, plus a random host
/// port for 443/tcp unless 443/tcp was declared.
pub fn port_bindings(spec: &ImageSpec) -> PortBindings {
    let mut bindings: PortBindings = spec
        .ports
        .iter()
        .map(|port| (*port, HostBinding::fixed(port.port)))
        .collect();

    bindings
        .entry(IMPLICIT_TLS_PORT)
        .or_insert_with(HostBinding::random);

    bindings
}

fn container_config(spec: &ImageSpec) -> ContainerConfig {
    let mut exposed_ports: Vec<PortSpec> = Vec::with_capacity(spec.ports.len());
    for port in &spec.ports {
        if !exposed_ports.contains(port) {
            exposed_ports.push(*port);
        }
    }

    ContainerConfig {
        image: spec.name.clone(),
        exposed_ports,
        port_bindings: port_bindings(spec),
        cmd: spec.config_cmds.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InitCommand, Protocol};
    use crate::test_support::{MockEngine, RecordingDelay};
    use std::time::Duration;

    fn manager_for(images: Vec<ImageSpec>) -> (FixtureManager, Arc<MockEngine>, Arc<RecordingDelay>) {
        let engine = Arc::new(MockEngine::new());
        let delay = Arc::new(RecordingDelay::new());
        let manager = FixtureManager::new(engine.clone(), ImageSpecGroup::new(images).unwrap())
            .with_delay(delay.clone());
        (manager, engine, delay)
    }

    #[test]
    fn test_port_bindings_add_random_tls_port() {
        let spec = ImageSpec::new("svc:1.0").with_ports(["8080", "9090"]).unwrap();
        let bindings = port_bindings(&spec);

        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[&PortSpec::tcp(8080)], HostBinding::fixed(8080));
        assert_eq!(bindings[&PortSpec::tcp(9090)], HostBinding::fixed(9090));
        assert_eq!(bindings[&IMPLICIT_TLS_PORT], HostBinding::random());
    }

    #[test]
    fn test_declared_443_keeps_fixed_binding() {
        let spec = ImageSpec::new("svc:1.0").with_ports(["443", "8080"]).unwrap();
        let bindings = port_bindings(&spec);

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[&IMPLICIT_TLS_PORT], HostBinding::fixed(443));
    }

    #[test]
    fn test_udp_443_does_not_replace_tcp_binding() {
        let spec = ImageSpec::new("svc:1.0").with_ports(["443/udp"]).unwrap();
        let bindings = port_bindings(&spec);

        let udp = PortSpec {
            port: 443,
            protocol: Protocol::Udp,
        };
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[&udp], HostBinding::fixed(443));
        assert_eq!(bindings[&IMPLICIT_TLS_PORT], HostBinding::random());
    }

    #[test]
    fn test_port_bindings_without_declared_ports() {
        let bindings = port_bindings(&ImageSpec::new("svc:1.0"));
        assert_eq!(bindings.len(), 1);
        assert!(bindings.contains_key(&IMPLICIT_TLS_PORT));
    }

    #[test]
    fn test_duplicate_ports_are_exposed_once() {
        let spec = ImageSpec::new("svc:1.0")
            .with_ports(["8080", "8080/tcp"])
            .unwrap();
        let config = container_config(&spec);

        assert_eq!(config.exposed_ports, vec![PortSpec::tcp(8080)]);
        assert_eq!(config.port_bindings.len(), 2);
    }

    #[test]
    fn test_start_containers_tracks_one_per_image() {
        let (manager, engine, _) = manager_for(vec![
            ImageSpec::new("pg:15"),
            ImageSpec::new("redis:7"),
            ImageSpec::new("svc:1.0"),
        ]);

        manager.start_containers().unwrap();

        assert_eq!(manager.container_ids().len(), 3);
        let commands = engine.get_commands();
        let creates: Vec<&String> = commands.iter().filter(|c| c.starts_with("create:")).collect();
        assert_eq!(creates, vec!["create:pg:15", "create:redis:7", "create:svc:1.0"]);
    }

    #[test]
    fn test_start_sleeps_after_start_and_each_init_cmd() {
        let spec = ImageSpec::new("svc:1.0")
            .with_init_cmd(InitCommand::new(["a"]))
            .with_init_cmd(InitCommand::new(["b"]))
            .with_init_delay_ms(30);
        let (manager, _, delay) = manager_for(vec![spec]);

        manager.start_containers().unwrap();

        assert_eq!(delay.pauses(), vec![Duration::from_millis(30); 3]);
    }

    #[test]
    fn test_init_cmds_run_in_declared_order() {
        let spec = ImageSpec::new("svc:1.0")
            .with_init_cmd(InitCommand::new(["first"]))
            .with_init_cmd(InitCommand::new(["second"]));
        let (manager, engine, _) = manager_for(vec![spec]);

        manager.start_containers().unwrap();

        let execs: Vec<String> = engine
            .get_commands()
            .into_iter()
            .filter(|c| c.starts_with("exec:"))
            .collect();
        assert_eq!(execs, vec!["exec:container-1:first", "exec:container-1:second"]);
    }

    #[test]
    fn test_failing_init_cmd_is_not_fatal() {
        let spec = ImageSpec::new("svc:1.0").with_init_cmd(InitCommand::new(["false"]));
        let (manager, engine, _) = manager_for(vec![spec]);
        engine.set_exec_exit_code(1);

        assert!(manager.start_containers().is_ok());
    }

    #[test]
    fn test_exec_error_propagates() {
        let spec = ImageSpec::new("svc:1.0").with_init_cmd(InitCommand::new(["x"]));
        let (manager, engine, _) = manager_for(vec![spec]);
        engine.set_fail_on("exec");

        let err = manager.start_containers().unwrap_err();
        assert!(matches!(err, FixtureError::Engine { .. }));
        // still tracked, so teardown can reclaim it
        assert_eq!(manager.container_ids(), vec!["container-1"]);
    }

    #[test]
    fn test_failed_start_is_still_tracked() {
        let (manager, engine, _) = manager_for(vec![ImageSpec::new("svc:1.0")]);
        engine.set_fail_on("start");

        assert!(manager.start_containers().is_err());
        assert_eq!(manager.container_ids().len(), 1);

        manager.clear_after_test().unwrap();
        assert!(manager.container_ids().is_empty());
    }

    #[test]
    fn test_missing_image_pulls_and_retries_once() {
        let (manager, engine, _) =
            manager_for(vec![ImageSpec::new("pg:15"), ImageSpec::new("svc:1.0")]);
        engine.set_missing_image("svc:1.0");

        manager.start_containers().unwrap();

        let commands = engine.get_commands();
        assert_eq!(commands.iter().filter(|c| c.starts_with("pull:")).count(), 2);
        // the pg container from the failed attempt was rolled back
        assert!(commands.contains(&"remove:container-1".to_string()));
        assert_eq!(manager.container_ids().len(), 2);
        assert!(!manager.container_ids().contains(&"container-1".to_string()));
    }

    #[test]
    fn test_persistently_missing_image_is_fatal() {
        let (manager, engine, _) = manager_for(vec![ImageSpec::new("ghost:1.0")]);
        engine.set_missing_image("ghost:1.0");
        engine.set_pull_restores_images(false);

        let err = manager.start_containers().unwrap_err();

        assert!(matches!(
            err,
            FixtureError::ImageUnavailable { ref image, retries: 1 } if image == "ghost:1.0"
        ));
        let commands = engine.get_commands();
        assert_eq!(commands.iter().filter(|c| c.starts_with("create:")).count(), 2);
        assert_eq!(commands.iter().filter(|c| c.starts_with("pull:")).count(), 1);
    }

    #[test]
    fn test_pull_failure_during_retry_propagates() {
        let (manager, engine, _) = manager_for(vec![ImageSpec::new("svc:1.0")]);
        engine.set_missing_image("svc:1.0");
        engine.set_fail_on("pull");

        let err = manager.start_containers().unwrap_err();
        assert!(matches!(err, FixtureError::Engine { .. }));
    }

    #[test]
    fn test_clear_kills_then_removes_in_order() {
        let (manager, engine, _) =
            manager_for(vec![ImageSpec::new("a:1"), ImageSpec::new("b:1")]);
        manager.start_containers().unwrap();
        engine.clear_commands();

        manager.clear_after_test().unwrap();

        assert_eq!(
            engine.get_commands(),
            vec![
                "kill:container-1",
                "remove:container-1",
                "kill:container-2",
                "remove:container-2",
            ]
        );
        assert!(manager.container_ids().is_empty());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (manager, engine, _) = manager_for(vec![ImageSpec::new("a:1")]);
        manager.start_containers().unwrap();

        manager.clear_after_test().unwrap();
        engine.clear_commands();
        manager.clear_after_test().unwrap();
        manager.clear_after_test().unwrap();

        assert!(engine.get_commands().is_empty());
    }

    #[test]
    fn test_clear_continues_past_failures_and_aggregates() {
        let (manager, engine, _) =
            manager_for(vec![ImageSpec::new("a:1"), ImageSpec::new("b:1")]);
        manager.start_containers().unwrap();
        engine.set_fail_on("remove");

        let err = manager.clear_after_test().unwrap_err();

        let FixtureError::Cleanup { failures } = err else {
            panic!("expected cleanup error");
        };
        assert_eq!(failures.len(), 2);
        assert!(manager.container_ids().is_empty());
        let commands = engine.get_commands();
        assert!(commands.contains(&"remove:container-2".to_string()));
    }

    #[test]
    fn test_kill_failure_still_removes() {
        let (manager, engine, _) = manager_for(vec![ImageSpec::new("a:1")]);
        manager.start_containers().unwrap();
        engine.set_fail_on("kill");

        manager.clear_after_test().unwrap();
        assert!(engine.get_commands().contains(&"remove:container-1".to_string()));
    }

    #[test]
    fn test_already_removed_container_counts_as_cleaned() {
        let (manager, engine, _) = manager_for(vec![ImageSpec::new("a:1")]);
        manager.start_containers().unwrap();
        engine.forget_container("container-1");

        assert!(manager.clear_after_test().is_ok());
    }

    #[test]
    fn test_host_port_reports_random_tls_binding() {
        let spec = ImageSpec::new("svc:1.0").with_ports(["8080"]).unwrap();
        let (manager, _, _) = manager_for(vec![spec]);
        manager.start_containers().unwrap();

        assert_eq!(manager.host_port("svc:1.0", PortSpec::tcp(8080)), Some(8080));
        let tls = manager.host_port("svc:1.0", IMPLICIT_TLS_PORT).unwrap();
        assert!(tls >= 49152);
        assert_eq!(manager.host_port("other:1.0", PortSpec::tcp(8080)), None);
    }

    #[test]
    fn test_queries_share_the_tracked_set() {
        let spec = ImageSpec::new("svc:1.0").with_ports(["8080"]).unwrap();
        let (manager, _, _) = manager_for(vec![spec]);
        manager.start_containers().unwrap();

        let held = manager.snapshot();
        assert_eq!(held.len(), 1);
        assert_eq!(manager.container_ids(), vec!["container-1"]);
        assert_eq!(manager.running_containers().len(), 1);
        assert_eq!(manager.host_port("svc:1.0", PortSpec::tcp(8080)), Some(8080));
        assert!(format!("{manager:?}").contains("container-1"));
        drop(held);
    }

    #[test]
    fn test_close_makes_engine_unusable() {
        let (manager, _, _) = manager_for(vec![ImageSpec::new("a:1")]);
        manager.close().unwrap();

        assert!(matches!(manager.pull_images(), Err(FixtureError::Closed)));
        assert!(matches!(manager.start_containers(), Err(FixtureError::Closed)));
        assert!(matches!(manager.close(), Err(FixtureError::Closed)));
    }
}
