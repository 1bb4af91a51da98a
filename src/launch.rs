//! Emulator process launching
//!
//! A [`LaunchSpec`] describes the child completely: program, arguments and the
//! environment overrides for the chosen embed method. The parent's own
//! environment is never touched; overrides are applied to the child only.

use anyhow::{Context, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

use crate::cli::EmbedMethod;
use crate::config::EmulatorConfig;
use crate::embed::EmbedError;

/// Env var read by the emulator itself to reparent into a window
pub const PARENT_WIN_ENV: &str = "HATARI_PARENT_WIN";

/// Env var read by SDL to draw into a foreign window
pub const SDL_WINDOWID_ENV: &str = "SDL_WINDOWID";

/// Everything needed to start the emulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Build the launch for `method`, pointing it at `container` where needed
    pub fn for_method(emulator: &EmulatorConfig, method: EmbedMethod, container: u32) -> Self {
        let env = match method {
            EmbedMethod::Sdl => vec![(SDL_WINDOWID_ENV.to_string(), container.to_string())],
            EmbedMethod::Previous => vec![(PARENT_WIN_ENV.to_string(), container.to_string())],
            EmbedMethod::Reparent => Vec::new(),
        };

        Self {
            program: emulator.program.clone(),
            args: emulator.args.clone(),
            env,
        }
    }

    /// Look up an override
    #[cfg(test)]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }
}

/// Starting and killing the child process
pub trait ProcessControl {
    /// Start the process, returning its pid
    fn spawn(&mut self, spec: &LaunchSpec) -> Result<u32, EmbedError>;

    /// Send SIGKILL to `pid`
    fn kill(&mut self, pid: u32) -> Result<()>;
}

/// Real process control via `std::process::Command` and `kill(2)`
///
/// Spawned children are kept so that killed ones get reaped.
#[derive(Debug, Default)]
pub struct CommandLauncher {
    children: HashMap<u32, Child>,
}

impl CommandLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessControl for CommandLauncher {
    fn spawn(&mut self, spec: &LaunchSpec) -> Result<u32, EmbedError> {
        debug!("Spawning {:?} {:?} with {:?}", spec.program, spec.args, spec.env);

        let child = spec.command().spawn().map_err(|source| EmbedError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let pid = child.id();
        info!("Started {} with PID {}", spec.program, pid);
        self.children.insert(pid, child);
        Ok(pid)
    }

    fn kill(&mut self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid).context("PID out of range")?;
        signal::kill(Pid::from_raw(raw), Signal::SIGKILL)
            .with_context(|| format!("Failed to kill PID {}", pid))?;

        if let Some(mut child) = self.children.remove(&pid) {
            match child.wait() {
                Ok(status) => debug!("PID {} exited: {}", pid, status),
                Err(e) => warn!("Failed to reap PID {}: {}", pid, e),
            }
        }
        Ok(())
    }
}

impl Drop for CommandLauncher {
    fn drop(&mut self) {
        for (pid, mut child) in self.children.drain() {
            debug!("Cleaning up leftover PID {}", pid);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
