use crate::free_port;
use log::info;
use std::{
    fs,
    path::{Path, PathBuf},
    process::{Child, Command},
    time::Duration,
};
use tokio::time::sleep;

/// The compiled gateway binary running as a child process. The process is killed on drop.
pub struct GatewayProcess {
    base_url: String,
    child: Child,
    working_directory: PathBuf,
}

impl GatewayProcess {
    /// Starts `binary` on a free port with only the given environment variables set and waits
    /// until its health endpoint answers.
    ///
    /// The process runs in an empty directory of its own, so no `.env` file next to the tests
    /// leaks settings into it.
    pub async fn start(binary: &str, environment: &[(&str, String)]) -> Self {
        let port = free_port();
        let working_directory = std::env::temp_dir().join(format!(
            "contact-form-gateway-{}-{port}",
            std::process::id()
        ));
        fs::create_dir_all(&working_directory).unwrap();
        info!("Starting {binary} on port {port} in {}", working_directory.display());
        let child = Command::new(binary)
            .current_dir(&working_directory)
            .env_clear()
            .env("PORT", port.to_string())
            .env("RUST_LOG", "debug")
            .envs(environment.iter().map(|(key, value)| (*key, value.as_str())))
            .spawn()
            .unwrap();
        let gateway = Self {
            base_url: format!("http://127.0.0.1:{port}"),
            child,
            working_directory,
        };
        gateway.wait_until_healthy().await;
        gateway
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn wait_until_healthy(&self) {
        let client = reqwest::Client::new();
        for _ in 0..100 {
            if let Ok(response) = client.get(self.url("/api/health")).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("Gateway at {} did not become healthy", self.base_url);
    }
}

impl Drop for GatewayProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = fs::remove_dir_all(&self.working_directory);
    }
}
