//! Run gate and child-process launch
//!
//! Values reach the child only through its environment. Nothing here writes
//! them to our own stdout, stderr or logs.

use std::fmt;
use std::process::{Command, ExitStatus};

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::error::InjectError;
use crate::report::ValidationReport;

/// A command ready to launch with the resolved environment attached
pub struct Injection {
    program: String,
    args: Vec<String>,
    env: Vec<(String, SecretString)>,
}

impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Injection")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &names)
            .finish()
    }
}

/// Refuse unless the report is clean, then collect every resolved value
pub fn prepare(report: &ValidationReport, command: &[String]) -> Result<Injection, InjectError> {
    if !report.ok() {
        return Err(InjectError::ValidationFailed(report.error_count()));
    }
    let (program, args) = command.split_first().ok_or(InjectError::EmptyCommand)?;

    let env: Vec<(String, SecretString)> = report
        .fields()
        .iter()
        .filter_map(|field| {
            field
                .raw()
                .map(|raw| {
                    let value = SecretString::from(raw.expose_secret().clone());
                    (field.name().to_string(), value)
                })
        })
        .collect();

    debug!(program = %program, vars = env.len(), "prepared injection");

    Ok(Injection {
        program: program.clone(),
        args: args.to_vec(),
        env,
    })
}

impl Injection {
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Names of the injected variables
    pub fn var_names(&self) -> impl Iterator<Item = &str> {
        self.env.iter().map(|(k, _)| k.as_str())
    }

    /// The launch command; the parent environment is inherited underneath
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (name, value) in &self.env {
            cmd.env(name, value.expose_secret());
        }
        cmd
    }

    /// Spawn the child and wait for it
    pub fn status(&self) -> Result<ExitStatus, InjectError> {
        self.command().status().map_err(|source| InjectError::Launch {
            program: self.program.clone(),
            source,
        })
    }

    /// Replace the current process with the child. Only returns on failure.
    #[cfg(unix)]
    pub fn exec(&self) -> InjectError {
        use std::os::unix::process::CommandExt;

        let source = self.command().exec();
        InjectError::Launch {
            program: self.program.clone(),
            source,
        }
    }
}
