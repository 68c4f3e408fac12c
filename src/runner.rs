use std::fmt;
use std::process::Command;

use tracing::trace;

use crate::error::LaunchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn require_success(self, program: &str) -> Result<Self, LaunchError> {
        if self.is_success() {
            return Ok(self);
        }
        let stderr = self.stderr.trim().to_string();
        Err(LaunchError::CommandFailed {
            program: program.to_string(),
            code: self.code,
            stderr,
        })
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, LaunchError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, LaunchError> {
        trace!("running {invocation}");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|err| LaunchError::CommandSpawn {
                program: invocation.program.clone(),
                message: err.to_string(),
            })?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn renders_env_then_command_line() {
        let invocation = Invocation::new("alien-token-info")
            .env("JALIEN_TOKEN_CERT", "/t/cert.pem")
            .arg("-v");
        assert_eq!(
            invocation.to_string(),
            "JALIEN_TOKEN_CERT=/t/cert.pem alien-token-info -v"
        );
    }

    #[test]
    fn non_zero_exit_is_command_failure() {
        let err = CommandOutput::failure(2, "no such dir\n")
            .require_success("alien_ls")
            .unwrap_err();
        assert!(err.is_external_failure());
        assert_matches!(err, LaunchError::CommandFailed { code: Some(2), ref stderr, .. } if stderr == "no such dir");
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_captures_stdout() {
        let output = SystemRunner::new()
            .run(&Invocation::new("sh").args(["-c", "echo $GREETING"]).env("GREETING", "hi"))
            .unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout.trim(), "hi");
    }

    #[test]
    fn system_runner_reports_missing_program() {
        let err = SystemRunner::new()
            .run(&Invocation::new("definitely-not-a-real-tool-4821"))
            .unwrap_err();
        assert_matches!(err, LaunchError::CommandSpawn { .. });
    }
}
