use nfpipe_types::{NfpipeError, Result};

/// Result of running an external command to completion.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam over process spawning so provisioners can be exercised without
/// touching the host toolchain.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runs commands on the local machine, blocking until they exit.
#[derive(Debug, Clone, Default)]
pub struct LocalCommandRunner;

impl LocalCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for LocalCommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(args);

        tracing::debug!(program, args = ?args, "Spawning command");
        let output = cmd.output().map_err(|e| NfpipeError::Provisioning {
            command: render_command(program, args),
            message: e.to_string(),
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Human-readable rendering of a command line for error messages.
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command and turn a non-zero exit into a `Provisioning` error.
pub(crate) fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
) -> Result<CommandOutput> {
    let output = runner.run(program, args)?;
    if !output.success() {
        let stderr = output.stderr.trim();
        return Err(NfpipeError::Provisioning {
            command: render_command(program, args),
            message: if stderr.is_empty() {
                format!("exit code {}", output.exit_code)
            } else {
                format!("exit code {}: {}", output.exit_code, stderr)
            },
        });
    }
    Ok(output)
}
