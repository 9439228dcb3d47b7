//! One-time backend detection for command-line synthesis tools.
//!
//! A backend can be reachable in several ways (a binary on PATH, a Python
//! module run with `-m`). Strategies are tried in order at startup and the
//! first one that answers wins; providers keep only the resulting
//! [`Launcher`] and never re-probe.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Program plus leading arguments used to invoke a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    pub program: String,
    pub args: Vec<String>,
}

impl Launcher {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Build from a config-style `["program", "arg", ...]` list.
    pub fn from_parts(parts: &[String]) -> Option<Self> {
        let (program, args) = parts.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// A command for this launcher. The child is killed if the handle is dropped.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).kill_on_drop(true);
        cmd
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone)]
pub enum DetectionStrategy {
    /// A binary on PATH (or an absolute path).
    Executable {
        program: String,
        probe_args: Vec<String>,
    },
    /// `<interpreter> -m <module>`.
    PythonModule {
        interpreter: String,
        module: String,
        probe_args: Vec<String>,
    },
}

impl DetectionStrategy {
    pub fn executable(program: &str, probe_args: &[&str]) -> Self {
        DetectionStrategy::Executable {
            program: program.to_string(),
            probe_args: probe_args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn python_module(interpreter: &str, module: &str, probe_args: &[&str]) -> Self {
        DetectionStrategy::PythonModule {
            interpreter: interpreter.to_string(),
            module: module.to_string(),
            probe_args: probe_args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn launcher(&self) -> Launcher {
        match self {
            DetectionStrategy::Executable { program, .. } => Launcher {
                program: program.clone(),
                args: Vec::new(),
            },
            DetectionStrategy::PythonModule {
                interpreter,
                module,
                ..
            } => Launcher {
                program: interpreter.clone(),
                args: vec!["-m".to_string(), module.clone()],
            },
        }
    }

    fn probe_args(&self) -> &[String] {
        match self {
            DetectionStrategy::Executable { probe_args, .. } => probe_args,
            DetectionStrategy::PythonModule { probe_args, .. } => probe_args,
        }
    }

    /// Run the probe; `Some` if it exits successfully within `timeout`.
    pub async fn probe(&self, timeout: Duration) -> Option<Launcher> {
        let launcher = self.launcher();
        let mut cmd = launcher.command();
        cmd.args(self.probe_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match tokio::time::timeout(timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => Some(launcher),
            Ok(Ok(status)) => {
                tracing::debug!("[TTS/Detect] '{}' exited with {}", launcher.display(), status);
                None
            }
            Ok(Err(e)) => {
                tracing::debug!("[TTS/Detect] '{}' not runnable: {}", launcher.display(), e);
                None
            }
            Err(_) => {
                tracing::debug!("[TTS/Detect] '{}' probe timed out", launcher.display());
                None
            }
        }
    }
}

/// Try each strategy in order; first success wins.
pub async fn detect(
    label: &str,
    strategies: &[DetectionStrategy],
    timeout: Duration,
) -> Option<Launcher> {
    for strategy in strategies {
        if let Some(launcher) = strategy.probe(timeout).await {
            tracing::info!("[TTS] {} available via '{}'", label, launcher.display());
            return Some(launcher);
        }
    }
    tracing::warn!("[TTS] {} not found ({} strategies tried)", label, strategies.len());
    None
}
