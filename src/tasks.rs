use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    NotSelected,
}

/// One line of subprocess output, tagged with the stream it came from so the
/// runner can keep a stderr-only capture for failure diagnostics.
#[derive(Debug, Clone)]
pub struct TaskLine {
    pub text: String,
    pub from_stderr: bool,
}

#[cfg(unix)]
fn spawn_shell(cmd: &str) -> Result<Child> {
    let mut c = Command::new("sh");
    c.arg("-c")
        .arg(cmd)
        .envs(std::env::vars())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    Ok(c.spawn()?)
}

#[cfg(not(unix))]
fn spawn_shell(cmd: &str) -> Result<Child> {
    let mut c = Command::new("cmd");
    c.arg("/C")
        .arg(cmd)
        .envs(std::env::vars())
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    Ok(c.spawn()?)
}

/// True iff `cmd` resolves on PATH (`which` semantics).
pub async fn command_exists(cmd: &str) -> bool {
    let probe = if cfg!(unix) { "which" } else { "where" };
    Command::new(probe)
        .arg(cmd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Spawn a task command under a shell and return (child, receiver of output
/// lines). Stdout and stderr are read concurrently; line order between the
/// two streams is best-effort.
pub fn spawn_task(cmd: &str) -> Result<(Child, mpsc::UnboundedReceiver<TaskLine>)> {
    let mut child = spawn_shell(cmd)?;

    let (tx, rx) = mpsc::unbounded_channel::<TaskLine>();

    if let Some(stdout) = child.stdout.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = r.next_line().await {
                let line = line.trim_end().to_string();
                if !line.trim().is_empty() {
                    let _ = tx.send(TaskLine { text: line, from_stderr: false });
                }
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = r.next_line().await {
                let line = line.trim_end().to_string();
                if !line.trim().is_empty() {
                    let _ = tx.send(TaskLine { text: line, from_stderr: true });
                }
            }
        });
    }

    Ok((child, rx))
}
