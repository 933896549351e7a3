// exec.rs

use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{Result, StructureMpError};

/// Capability interface around external program invocation so the
/// orchestration layers can be exercised with a fake runner in tests.
pub trait ProgramRunner: Send + Sync {
    /// Runs `program` with `args`, redirecting its stdout to `stdout_log`.
    /// A launch failure or non-zero exit status is an error carrying
    /// `context` (which stage/replicate/K was being processed).
    fn run(&self, program: &str, args: &[String], stdout_log: &Path, context: &str) -> Result<()>;
}

/// Invokes programs resolved through `PATH` via `std::process::Command`.
pub struct SystemRunner;

impl ProgramRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String], stdout_log: &Path, context: &str) -> Result<()> {
        debug!("Running '{} {}' ({})", program, args.join(" "), context);
        let log_file = File::create(stdout_log)?;
        let status = Command::new(program)
            .args(args)
            .stdout(Stdio::from(log_file))
            .status()
            .map_err(|source| StructureMpError::Launch {
                program: program.to_string(),
                source,
            })?;
        if !status.success() {
            return Err(StructureMpError::ProcessFailed {
                program: program.to_string(),
                status: status.to_string(),
                context: context.to_string(),
            });
        }
        Ok(())
    }
}
