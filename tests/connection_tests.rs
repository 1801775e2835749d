use fixturebox::domain::{ConnectionConfig, ConnectionMode, ContainerEngine};
use fixturebox::error::FixtureError;
use fixturebox::infra::ConnectionBuilder;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_certs(dir: &Path) {
    for name in ["ca.pem", "cert.pem", "key.pem"] {
        fs::write(dir.join(name), "-----BEGIN CERTIFICATE-----").unwrap();
    }
}

fn explicit_config(cert_path: &str) -> ConnectionConfig {
    ConnectionConfig {
        server_address: "https://192.168.99.100:2376".to_string(),
        email: "ci@example.com".to_string(),
        username: "ci".to_string(),
        password: "secret".to_string(),
        cert_path: cert_path.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_empty_config_uses_ambient_mode() {
    let builder = ConnectionBuilder::new(ConnectionConfig::default());
    let client = builder.build_with_docker_host(None).unwrap();

    assert!(client.mode().is_ambient());
    assert!(client.global_args().is_empty());
    assert_eq!(client.runtime_bin(), "docker");
}

#[test]
fn test_docker_host_wins_over_explicit_config() {
    let builder = ConnectionBuilder::new(explicit_config("/nowhere"));
    let mode = builder.resolve(Some("unix:///var/run/docker.sock")).unwrap();

    assert_eq!(mode, ConnectionMode::Ambient);
}

#[test]
fn test_explicit_mode_with_cert_dir() {
    let temp_dir = TempDir::new().unwrap();
    write_certs(temp_dir.path());

    let config = explicit_config(temp_dir.path().to_str().unwrap());
    let client = ConnectionBuilder::new(config)
        .build_with_docker_host(None)
        .unwrap();

    let ConnectionMode::Explicit(conn) = client.mode() else {
        panic!("expected explicit mode");
    };
    assert_eq!(conn.host, "tcp://192.168.99.100:2376");
    assert_eq!(conn.tls.ca, temp_dir.path().join("ca.pem"));
    assert_eq!(conn.auth.username, "ci");
    assert_eq!(
        conn.auth.server_address.as_deref(),
        Some("https://192.168.99.100:2376")
    );

    let args = client.global_args();
    assert!(args.contains(&"--tlsverify".to_string()));
    assert!(args.contains(&"tcp://192.168.99.100:2376".to_string()));
}

#[test]
fn test_missing_cert_dir_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("certs");

    let err = ConnectionBuilder::new(explicit_config(missing.to_str().unwrap()))
        .build_with_docker_host(None)
        .unwrap_err();

    assert!(matches!(err, FixtureError::MissingCertPath { ref path } if *path == missing));
}

#[test]
fn test_unset_cert_path_is_rejected() {
    let err = ConnectionBuilder::new(explicit_config(""))
        .resolve(None)
        .unwrap_err();

    assert!(matches!(err, FixtureError::MissingCertPath { .. }));
}

#[test]
fn test_cert_dir_without_key_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("ca.pem"), "ca").unwrap();
    fs::write(temp_dir.path().join("cert.pem"), "cert").unwrap();

    let err = ConnectionBuilder::new(explicit_config(temp_dir.path().to_str().unwrap()))
        .resolve(None)
        .unwrap_err();

    assert!(err.to_string().contains("key.pem"));
}

#[test]
fn test_closed_client_rejects_every_operation() {
    let client = ConnectionBuilder::default()
        .build_with_docker_host(None)
        .unwrap();

    client.close().unwrap();

    assert!(client.is_closed());
    assert!(matches!(client.pull_image("alpine:3"), Err(FixtureError::Closed)));
    assert!(matches!(client.kill_container("abc"), Err(FixtureError::Closed)));
    assert!(matches!(client.close(), Err(FixtureError::Closed)));
}
