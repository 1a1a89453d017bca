//! Run an external inspection utility with a timeout and capture stdout.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::process::Command;

/// Windows `CREATE_NO_WINDOW`, keeps utilities from flashing a console
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Run `program args...`, returning stdout on a zero exit status.
///
/// A non-zero exit, a spawn failure, or exceeding `timeout` is an error.
/// The child is killed if it is still running when the timeout fires.
pub(crate) async fn run(program: &str, args: &[&str], timeout: Duration) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .with_context(|| format!("{} timed out after {:?}", program, timeout))?
        .with_context(|| format!("Failed to execute {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{} exited with {}: {}", program, output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a PowerShell script non-interactively
pub(crate) async fn powershell(script: &str, timeout: Duration) -> Result<String> {
    run(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
        timeout,
    )
    .await
}

/// Quote a value as a PowerShell single-quoted string literal
pub(crate) fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
