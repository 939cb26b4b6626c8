//! Unix-domain socket proxy: every client accepted on the listening socket
//! is relayed to a fresh connection to the upstream socket, one client at a
//! time.

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::net::{UnixListener, UnixStream};
use tokio::select;
use tracing::{debug, info, warn};

use crate::error::SetupError;
use crate::relay::{ConnectionReport, ConnectionSupervisor, Endpoint, RelayConfig};

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Socket every client is relayed to.
    pub upstream: PathBuf,
    /// Socket clients connect to.
    pub listen: PathBuf,
    /// Stop after this many connections.
    pub max_connections: Option<usize>,
    /// Remove a stale socket file at `listen` before binding.
    pub unlink: bool,
}

fn socket_error(path: &Path) -> impl FnOnce(std::io::Error) -> SetupError + '_ {
    move |source| SetupError::SocketSetupFailed {
        path: path.to_owned(),
        source,
    }
}

pub fn bind(options: &ProxyOptions) -> Result<UnixListener, SetupError> {
    if options.unlink {
        match std::fs::remove_file(&options.listen) {
            Ok(()) => debug!("removed stale socket {}", options.listen.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => return Err(socket_error(&options.listen)(e)),
        }
    }
    UnixListener::bind(&options.listen).map_err(socket_error(&options.listen))
}

/// Binds the listening socket and serves until `max_connections` is reached
/// or `stop` resolves. The socket file is removed on the way out.
pub async fn serve<F, S>(options: &ProxyOptions, config: &RelayConfig, stop: F) -> Result<usize>
where
    F: FnMut() -> S,
    S: Future,
{
    let listener = bind(options)?;
    info!("listening on {}", options.listen.display());
    let served = serve_on(&listener, options, config, stop).await;
    if let Err(e) = std::fs::remove_file(&options.listen) {
        warn!("failed to remove {}: {}", options.listen.display(), e);
    }
    served
}

/// Accept loop over an already-bound listener. `stop` is called once per
/// wait, so it can hand out a fresh future each time. Returns the number of
/// connections served.
pub async fn serve_on<F, S>(
    listener: &UnixListener,
    options: &ProxyOptions,
    config: &RelayConfig,
    mut stop: F,
) -> Result<usize>
where
    F: FnMut() -> S,
    S: Future,
{
    let mut served = 0;
    loop {
        if options.max_connections.map_or(false, |max| served >= max) {
            info!("served {} connections, exiting", served);
            break;
        }
        let client = select! {
            accepted = listener.accept() => {
                let (client, _) = accepted.map_err(socket_error(&options.listen))?;
                client
            }
            _ = stop() => {
                info!("stop requested, no longer accepting");
                break;
            }
        };
        served += 1;
        info!("connected to new client #{}", served);

        let report = relay_client(client, &options.upstream, config, stop()).await?;
        info!(
            "client #{} closed: {} bytes up, {} bytes down",
            served, report.a_to_b.bytes, report.b_to_a.bytes
        );
        if report.stopped {
            break;
        }
    }
    Ok(served)
}

/// Relays one accepted client to a new upstream connection until both
/// directions finish. Each call gets its own buffers.
pub async fn relay_client(
    client: UnixStream,
    upstream: &Path,
    config: &RelayConfig,
    stop: impl Future,
) -> Result<ConnectionReport> {
    let upstream_conn = UnixStream::connect(upstream)
        .await
        .map_err(socket_error(upstream))?;
    let report = ConnectionSupervisor::new(
        ("from_cli", "from_cln"),
        Endpoint::from(client),
        Endpoint::from(upstream_conn),
        config,
    )
    .run_until(stop)
    .await;
    Ok(report)
}
