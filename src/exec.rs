//! Relay this process's stdio to a child command.

use std::future::Future;
use std::process::{ExitStatus, Stdio};

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::{error, info};

use crate::error::SetupError;
use crate::relay::{ConnectionSupervisor, Endpoint, RelayConfig};

/// Exit code when the command could not be started at all.
pub const SPAWN_FAILED_EXIT: i32 = 127;
/// Exit code when the child did not exit normally (killed by a signal).
pub const ABNORMAL_EXIT: i32 = 2;

pub fn spawn(command: &str, args: &[String]) -> Result<Child, SetupError> {
    Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| SetupError::ProcessSpawnFailed {
            command: command.to_owned(),
            source,
        })
}

pub fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(ABNORMAL_EXIT)
}

/// Runs `command` with this process's stdin and stdout relayed to it and
/// returns the exit code this process should report.
pub async fn run(
    command: &str,
    args: &[String],
    config: &RelayConfig,
    stop: impl Future,
) -> Result<i32> {
    run_with(Endpoint::stdio(), command, args, config, stop).await
}

/// Like [`run`], with `local` standing in for stdin/stdout.
///
/// The relay ends once the child's stdout reaches end-of-stream, even if
/// `local` still has input for it.
pub async fn run_with<R, W>(
    local: Endpoint<R, W>,
    command: &str,
    args: &[String],
    config: &RelayConfig,
    stop: impl Future,
) -> Result<i32>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut child = match spawn(command, args) {
        Ok(child) => child,
        Err(e) => {
            error!("{}", e);
            return Ok(SPAWN_FAILED_EXIT);
        }
    };
    info!("started `{}` (pid {:?})", command, child.id());

    let to_child = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("child stdin was not piped"))?;
    let from_child = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("child stdout was not piped"))?;

    let report = ConnectionSupervisor::new(
        ("tochild", "fromchild"),
        local,
        Endpoint::new(from_child, to_child),
        config,
    )
    .end_with_b_to_a()
    .run_until(stop)
    .await;

    if report.stopped {
        if let Err(e) = child.start_kill() {
            error!("failed to kill `{}`: {}", command, e);
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("failed to wait for `{}`", command))?;
    info!(
        "`{}` exited with {}, relayed {} bytes in, {} bytes out",
        command, status, report.a_to_b.bytes, report.b_to_a.bytes
    );
    Ok(exit_code(status))
}
