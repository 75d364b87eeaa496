use crate::error::{BossError, Result};
use crate::platform::ImageBuilder;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

/// Lines of stderr kept for error messages.
const STDERR_TAIL: usize = 20;

/// Driver for the `docker` CLI.
///
/// Output from long-running commands (`build`, `push`) is forwarded to the
/// log line by line so operators can follow progress.
#[derive(Debug, Clone)]
pub struct Docker {
    program: PathBuf,
}

impl Docker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate `docker` on `PATH`.
    pub fn detect() -> Option<Self> {
        which::which("docker").ok().map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `docker <args>`, streaming stdout to the log.
    /// Returns the failure message (with the stderr tail) on a non-zero exit.
    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> std::result::Result<(), String> {
        tracing::debug!(program = %self.program.display(), ?args, "spawning");
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.program.display()))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input)
                .await
                .map_err(|e| format!("failed to write to docker stdin: {e}"))?;
            // Dropping the pipe closes stdin.
        }

        let stderr_tail = Arc::new(Mutex::new(Vec::<String>::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "docker", "{line}");
                    if let Ok(mut t) = tail.lock() {
                        t.push(line);
                        if t.len() > STDERR_TAIL {
                            t.remove(0);
                        }
                    }
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    tracing::info!(target: "docker", "{line}");
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for docker: {e}"))?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }
        if status.success() {
            return Ok(());
        }

        let tail = stderr_tail
            .lock()
            .map(|t| t.join("\n"))
            .unwrap_or_default();
        let head = match status.code() {
            Some(code) => format!("docker {} exited with code {code}", args.first().unwrap_or(&"")),
            None => format!("docker {} terminated by signal", args.first().unwrap_or(&"")),
        };
        Err(if tail.is_empty() {
            head
        } else {
            format!("{head}\n{tail}")
        })
    }

    /// `docker login` with the password on stdin.
    pub async fn login(&self, username: &str, password: &str, endpoint: &str) -> Result<()> {
        self.run(
            &["login", "--username", username, "--password-stdin", endpoint],
            Some(password.as_bytes()),
        )
        .await
        .map_err(BossError::PushFailure)?;
        tracing::info!(%endpoint, "logged in to registry");
        Ok(())
    }

    pub async fn push(&self, reference: &str) -> Result<()> {
        self.run(&["push", reference], None)
            .await
            .map_err(BossError::PushFailure)
    }
}

#[async_trait]
impl ImageBuilder for Docker {
    async fn build(&self, context: &Path, image: &str, args: &[String]) -> Result<()> {
        let context = context.to_string_lossy();
        let mut argv: Vec<&str> = vec!["build", "-t", image];
        argv.extend(args.iter().map(String::as_str));
        argv.push(context.as_ref());
        self.run(&argv, None).await.map_err(BossError::BuildFailure)
    }

    async fn tag(&self, source: &str, target: &str) -> Result<()> {
        self.run(&["tag", source, target], None)
            .await
            .map_err(BossError::BuildFailure)
    }

    async fn has_local_image(&self, reference: &str) -> Result<bool> {
        Ok(self
            .run(&["image", "inspect", "--format", "{{.Id}}", reference], None)
            .await
            .is_ok())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_build_is_build_failure() {
        let docker = Docker::new("false");
        let err = docker
            .build(Path::new("."), "web", &[])
            .await
            .unwrap_err();
        assert!(
            matches!(err, BossError::BuildFailure(ref m) if m.contains("exited with code 1")),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn successful_command_is_ok() {
        let docker = Docker::new("true");
        docker.build(Path::new("."), "web", &[]).await.unwrap();
        assert!(docker.has_local_image("web:latest").await.unwrap());
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let docker = Docker::new("/nonexistent/docker");
        let err = docker.push("web:1").await.unwrap_err();
        assert!(matches!(err, BossError::PushFailure(ref m) if m.contains("failed to start")));
    }
}
