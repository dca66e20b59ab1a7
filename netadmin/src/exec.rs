//! External command execution
//!
//! The store never spawns processes itself; it goes through a
//! `CommandExecutor` so tests can substitute scripted tool output.

use std::io;
use std::process::Command;

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The program could not be started at all
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program ran and exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Runs an external program and captures its standard output.
///
/// Any error means "no output available"; partial output is never returned.
pub trait CommandExecutor: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError>;
}

/// Executes real processes on the host. No timeout: a hung tool blocks its caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError> {
        debug!("exec: {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| ExecError::Launch {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}
