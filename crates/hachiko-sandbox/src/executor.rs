//! Container lifecycle
//!
//! The executor drives an existing container runtime (docker or podman),
//! it does not implement one. Lifecycle per context:
//! `create -> execute_in* -> destroy`. One context is never shared between
//! concurrently executing steps; each step execution owns its workspace and
//! container, and `destroy` must run on every exit path.

use crate::config::ContainerConfig;
use crate::error::SandboxError;
use crate::process::{execute_command, run_with_timeout, CommandOutput};
use dashmap::DashMap;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a container is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerPhase {
    /// Created, not yet started
    Created,
    /// Started and accepting commands
    Running,
    /// Removed (or never known)
    Destroyed,
}

/// Handle to one isolated execution environment.
///
/// Exclusively owned by the step execution that created it.
#[derive(Debug, Clone)]
pub struct ContainerContext {
    /// Runtime name/id of the container
    pub container_id: String,
    /// Host path mounted as the step workspace
    pub workspace_path: PathBuf,
    /// Host path of the repository checkout
    pub repo_path: PathBuf,
    /// Lifecycle phase at the time the handle was produced
    pub phase: ContainerPhase,
}

/// Creates, drives, and destroys sandbox containers.
pub struct SandboxExecutor {
    config: ContainerConfig,
    live: DashMap<String, ContainerContext>,
}

impl SandboxExecutor {
    /// Executor over an injected runtime configuration.
    #[must_use]
    pub fn new(config: ContainerConfig) -> Self {
        Self {
            config,
            live: DashMap::new(),
        }
    }

    /// The configuration this executor was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    async fn probe(&self) -> Result<(), SandboxError> {
        let runtime = &self.config.runtime;
        match execute_command(runtime, &["info"], None, Some(PROBE_TIMEOUT)).await {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(SandboxError::Unavailable {
                runtime: runtime.clone(),
                message: out.stderr.trim().to_string(),
            }),
            Err(e) => Err(SandboxError::Unavailable {
                runtime: runtime.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Is the underlying runtime reachable?
    pub async fn available(&self) -> bool {
        self.probe().await.is_ok()
    }

    /// Create and start a container for one step execution.
    ///
    /// `workspace_path` is mounted at the configured workdir and
    /// `repo_path` at `{workdir}/repo`. Fails with
    /// [`SandboxError::Unavailable`] when the runtime is unreachable; no
    /// partial context leaks on failure.
    pub async fn create(
        &self,
        workspace_path: &Path,
        repo_path: &Path,
    ) -> Result<ContainerContext, SandboxError> {
        self.probe().await?;

        let container_id = format!("hachi-sbx-{}", Uuid::new_v4());
        let workdir = &self.config.workdir;
        let workspace_mount = format!("{}:{}", workspace_path.display(), workdir);
        let repo_mount = format!("{}:{}/repo", repo_path.display(), workdir);

        let mut args: Vec<String> = vec![
            "create".into(),
            "--name".into(),
            container_id.clone(),
            "-v".into(),
            workspace_mount,
            "-v".into(),
            repo_mount,
            "-w".into(),
            workdir.clone(),
        ];
        if let Some(memory) = &self.config.memory_limit {
            args.push("--memory".into());
            args.push(memory.clone());
        }
        if let Some(cpus) = self.config.cpu_limit {
            args.push("--cpus".into());
            args.push(cpus.to_string());
        }
        if !self.config.network_enabled {
            args.push("--network".into());
            args.push("none".into());
        }
        for (key, value) in &self.config.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push(self.config.image.clone());
        args.push("sleep".into());
        args.push("infinity".into());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let created = execute_command(
            &self.config.runtime,
            &arg_refs,
            None,
            Some(LIFECYCLE_TIMEOUT),
        )
        .await?;
        if !created.success() {
            return Err(SandboxError::CreateFailed {
                stderr: created.stderr.trim().to_string(),
            });
        }

        let started = execute_command(
            &self.config.runtime,
            &["start", &container_id],
            None,
            Some(LIFECYCLE_TIMEOUT),
        )
        .await;
        match started {
            Ok(out) if out.success() => {}
            outcome => {
                // Clean up the created-but-unstarted container before failing.
                let _ = execute_command(
                    &self.config.runtime,
                    &["rm", "-f", &container_id],
                    None,
                    Some(LIFECYCLE_TIMEOUT),
                )
                .await;
                return Err(match outcome {
                    Ok(out) => SandboxError::CreateFailed {
                        stderr: out.stderr.trim().to_string(),
                    },
                    Err(e) => e,
                });
            }
        }

        let context = ContainerContext {
            container_id: container_id.clone(),
            workspace_path: workspace_path.to_path_buf(),
            repo_path: repo_path.to_path_buf(),
            phase: ContainerPhase::Running,
        };
        self.live.insert(container_id.clone(), context.clone());
        tracing::info!("sandbox container '{}' running", container_id);
        Ok(context)
    }

    /// Run a shell command inside a running container.
    ///
    /// Enforces a hard wall-clock timeout (the configured default when the
    /// caller passes none); on expiry the command is force-killed and the
    /// partial output is returned with exit code
    /// [`crate::process::TIMEOUT_EXIT_CODE`].
    pub async fn execute_in(
        &self,
        context: &ContainerContext,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, SandboxError> {
        let phase = self
            .live
            .get(&context.container_id)
            .map(|c| c.phase)
            .unwrap_or(ContainerPhase::Destroyed);
        if phase != ContainerPhase::Running {
            return Err(SandboxError::InvalidContext {
                container_id: context.container_id.clone(),
                phase,
            });
        }

        let mut exec = Command::new(&self.config.runtime);
        exec.args(["exec", &context.container_id, "sh", "-c", command]);
        let limit = timeout.unwrap_or(self.config.default_timeout);
        let output = run_with_timeout(exec, limit).await?;
        if output.timed_out {
            tracing::warn!(
                "command in container '{}' exceeded its {}s limit and was killed",
                context.container_id,
                limit.as_secs()
            );
        }
        Ok(output)
    }

    /// Remove a container.
    ///
    /// Idempotent: destroying an already-destroyed or unknown id is a
    /// no-op, not an error.
    pub async fn destroy(&self, container_id: &str) {
        if self.live.remove(container_id).is_none() {
            tracing::debug!("destroy of unknown container '{}' ignored", container_id);
            return;
        }
        match execute_command(
            &self.config.runtime,
            &["rm", "-f", container_id],
            None,
            Some(LIFECYCLE_TIMEOUT),
        )
        .await
        {
            Ok(out) if !out.success() => {
                tracing::warn!(
                    "removing container '{}' failed: {}",
                    container_id,
                    out.stderr.trim()
                );
            }
            Err(e) => {
                tracing::warn!("removing container '{}' failed: {}", container_id, e);
            }
            _ => tracing::info!("sandbox container '{}' destroyed", container_id),
        }
    }

    /// Is this container id currently tracked as running?
    #[inline]
    #[must_use]
    pub fn is_live(&self, container_id: &str) -> bool {
        self.live.contains_key(container_id)
    }
}
