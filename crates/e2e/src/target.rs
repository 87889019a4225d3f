//! Application-under-test management: optional dev-server process and the
//! HTTP reachability probe.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::{join_url, TargetConfig};
use crate::error::{E2eError, E2eResult};

const PROBE_INTERVAL: Duration = Duration::from_millis(100);
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Wait until `url` answers with a success status, for at most `bound_ms`
pub async fn probe_target(url: &str, bound_ms: u64) -> E2eResult<()> {
    let bound = Duration::from_millis(bound_ms);
    let client = reqwest::Client::builder()
        .timeout(bound.min(Duration::from_secs(2)).max(Duration::from_millis(50)))
        .build()?;

    let deadline = Instant::now() + bound;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(%url, attempts, "target reachable");
                return Ok(());
            }
            Ok(resp) => warn!(%url, status = %resp.status(), "probe returned non-success status"),
            Err(e) if !e.is_connect() => warn!(%url, error = %e, "probe error"),
            Err(_) => {}
        }

        if Instant::now() + PROBE_INTERVAL > deadline {
            return Err(E2eError::TargetUnreachable {
                url: url.to_string(),
                attempts,
            });
        }
        sleep(PROBE_INTERVAL).await;
    }
}

/// Handle to a dev server started for the run
pub struct TargetServer {
    child: Child,
    pub base_url: String,
}

impl TargetServer {
    /// Start `config.command` and wait until the health URL answers.
    ///
    /// Fails early if the process exits before becoming reachable.
    pub async fn spawn(config: &TargetConfig) -> E2eResult<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| E2eError::ServerStartup("target.command is empty".to_string()))?;

        info!(command = %config.command.join(" "), "Spawning target server");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd
            .spawn()
            .map_err(|e| E2eError::ServerStartup(format!("Failed to spawn {}: {}", program, e)))?;

        let mut server = TargetServer {
            child,
            base_url: config.url.clone(),
        };

        let health_url = join_url(&config.url, &config.health_path);
        server.wait_until_reachable(&health_url, config.startup_timeout_ms).await?;

        info!(url = %server.base_url, "Target server is up");
        Ok(server)
    }

    async fn wait_until_reachable(&mut self, health_url: &str, bound_ms: u64) -> E2eResult<()> {
        let deadline = Instant::now() + Duration::from_millis(bound_ms);

        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "process exited with {} before {} became reachable",
                    status, health_url
                )));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let slice = remaining.min(Duration::from_secs(1));
            match probe_target(health_url, slice.as_millis() as u64).await {
                Ok(()) => return Ok(()),
                Err(E2eError::TargetUnreachable { .. }) if Instant::now() < deadline => continue,
                Err(E2eError::TargetUnreachable { attempts, .. }) => {
                    return Err(E2eError::ServerStartup(format!(
                        "{} not reachable within {} ms ({} probes in last window)",
                        health_url, bound_ms, attempts
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// SIGTERM, then kill after a grace period
    pub async fn stop(mut self) -> E2eResult<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        info!(pid, "Stopping target server");

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                if let Ok(status) = timeout(STOP_GRACE, self.child.wait()).await {
                    debug!(status = ?status, "target server exited");
                    return Ok(());
                }
                warn!(pid, "target server ignored SIGTERM");
            }
        }

        self.child.kill().await?;
        Ok(())
    }
}

impl Drop for TargetServer {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_ok() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let reply = b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok";
                    let _ = socket.write_all(reply).await;
                });
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn probe_succeeds_against_live_listener() {
        let url = serve_ok().await;
        probe_target(&url, 2_000).await.unwrap();
    }

    #[tokio::test]
    async fn probe_fails_within_bound_on_closed_port() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url = format!("http://127.0.0.1:{}", port);

        let start = Instant::now();
        let err = probe_target(&url, 300).await.unwrap_err();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(matches!(err, E2eError::TargetUnreachable { attempts, .. } if attempts >= 1));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let config = TargetConfig::default();
        assert!(matches!(TargetServer::spawn(&config).await, Err(E2eError::ServerStartup(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_exiting_early_fails_startup() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = TargetConfig {
            url: format!("http://127.0.0.1:{}", port),
            command: vec!["sh".to_string(), "-c".to_string(), "exit 3".to_string()],
            startup_timeout_ms: 5_000,
            ..TargetConfig::default()
        };

        let err = TargetServer::spawn(&config).await.err().unwrap();
        assert!(err.to_string().contains("exited"), "{err}");
    }
}
