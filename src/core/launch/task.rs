// ─── Launch Task ───
// Spawns a launch plan with its output captured in a per-game log file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};

use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::plan::LaunchPlan;

/// A spawned game. Dropping the handle does not stop the process.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub pid: u32,
    pub log_path: PathBuf,
    child: Child,
}

impl LaunchedProcess {
    /// Non-blocking liveness check.
    pub fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(err) => {
                warn!("Could not poll process {}: {}", self.pid, err);
                false
            }
        }
    }

    /// Block until the process exits. Meant for the CLI and tests.
    pub fn wait(&mut self) -> LauncherResult<Option<i32>> {
        let status = self
            .child
            .wait()
            .map_err(|source| LauncherError::io(&self.log_path, source))?;
        Ok(status.code())
    }
}

/// Spawns [`LaunchPlan`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Spawn `plan` with stdout and stderr going to `log_path` (truncated).
    /// Returns as soon as the process has started.
    pub fn launch(&self, plan: &LaunchPlan, log_path: &Path) -> LauncherResult<LaunchedProcess> {
        let Some(program) = plan.program() else {
            return Err(LauncherError::LaunchFailed {
                program: String::new(),
                reason: "empty command".into(),
            });
        };

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LauncherError::io(parent, source))?;
        }
        let stdout = File::create(log_path).map_err(|source| LauncherError::io(log_path, source))?;
        let stderr = stdout
            .try_clone()
            .map_err(|source| LauncherError::io(log_path, source))?;

        let mut cmd = std::process::Command::new(program);
        cmd.args(plan.args());
        cmd.envs(&plan.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::from(stdout));
        cmd.stderr(Stdio::from(stderr));

        debug!("Environment overrides: {:?}", plan.env);
        debug!("Command (copy/paste): {}", plan.display_command());

        let child = cmd.spawn().map_err(|e| LauncherError::LaunchFailed {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        info!("Started {} (pid {}), log at {:?}", program, pid, log_path);
        Ok(LaunchedProcess {
            pid,
            log_path: log_path.to_path_buf(),
            child,
        })
    }
}
