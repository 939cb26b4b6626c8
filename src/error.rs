use std::io::{self, ErrorKind};
use std::path::PathBuf;

/// Why a relay leg stopped moving bytes. Carried inside `Finish::Failed`;
/// never returned up the call stack.
#[derive(Debug, err_derive::Error)]
pub enum RelayError {
    #[error(display = "read failed after {} bytes: {}", after, source)]
    EndpointRead {
        after: u64,
        #[error(source)]
        source: io::Error,
    },
    #[error(display = "write failed after {} bytes: {}", after, source)]
    EndpointWrite {
        after: u64,
        #[error(source)]
        source: io::Error,
    },
    #[error(display = "peer closed after {} bytes: {}", after, source)]
    EndpointClosed {
        after: u64,
        #[error(source)]
        source: io::Error,
    },
}

fn peer_went_away(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

impl RelayError {
    pub fn read(after: u64, source: io::Error) -> Self {
        if peer_went_away(source.kind()) {
            RelayError::EndpointClosed { after, source }
        } else {
            RelayError::EndpointRead { after, source }
        }
    }

    pub fn write(after: u64, source: io::Error) -> Self {
        if peer_went_away(source.kind()) {
            RelayError::EndpointClosed { after, source }
        } else {
            RelayError::EndpointWrite { after, source }
        }
    }

    /// A peer hanging up is graceful; everything else is a hard failure.
    pub fn is_hard(&self) -> bool {
        !matches!(self, RelayError::EndpointClosed { .. })
    }
}

/// Collaborator-level failures that happen before any byte is relayed.
#[derive(Debug, err_derive::Error)]
pub enum SetupError {
    #[error(display = "failed to start `{}`: {}", command, source)]
    ProcessSpawnFailed {
        command: String,
        #[error(source)]
        source: io::Error,
    },
    #[error(display = "socket setup failed on {:?}: {}", path, source)]
    SocketSetupFailed {
        path: PathBuf,
        #[error(source)]
        source: io::Error,
    },
    #[error(display = "invalid configuration: {}", _0)]
    InvalidConfig(String),
}
