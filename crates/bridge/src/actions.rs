use std::process::Command;

use eyre::WrapErr;

/// Output of a shell action
#[derive(Debug)]
pub(crate) struct ShellOutput {
    pub success: bool,
    pub output: String,
}

/// Run a shell action to completion, capturing stdout and stderr
#[tracing::instrument]
pub(crate) fn run_shell(command: &str) -> eyre::Result<ShellOutput> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .wrap_err_with(|| format!("spawning shell for `{command}`"))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    tracing::debug!(status = ?output.status, "shell action finished");
    Ok(ShellOutput {
        success: output.status.success(),
        output: text,
    })
}
