use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use reqwest::Client;
use tokio::time::{sleep, timeout};

pub const TERMINAL_API_KEY: &str = "terminal-test-key";
pub const METRICS_TOKEN: &str = "test-token";

/// Ask the OS for a port nobody is listening on.
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("bind ephemeral port")
}

pub fn seed_fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/seed.json")
}

/// Service process, killed when dropped.
pub struct RunningService {
    pub base_url: String,
    child: Child,
}

impl Drop for RunningService {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn healthy(client: &Client, base_url: &str) -> bool {
    match client.get(format!("{}/healthz", base_url)).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Spawn the compiled service on a free port against an in-memory database
/// seeded from the fixture, and wait for `/healthz`.
pub async fn spawn_service() -> anyhow::Result<RunningService> {
    let port = free_port();
    let base_url = format!("http://127.0.0.1:{}", port);

    let child = Command::new(env!("CARGO_BIN_EXE_ledger-service"))
        .env("DB_PATH", ":memory:")
        .env("PORT", port.to_string())
        .env("SEED_PATH", seed_fixture_path())
        .env("TERMINAL_API_KEY", TERMINAL_API_KEY)
        .env("METRICS_AUTH_TOKEN", METRICS_TOKEN)
        .env("RUST_LOG", "warn")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    let service = RunningService { base_url, child };

    let client = Client::new();
    timeout(Duration::from_secs(10), async {
        while !healthy(&client, &service.base_url).await {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("service on port {} never became healthy", port))?;

    Ok(service)
}
