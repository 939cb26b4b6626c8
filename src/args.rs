use std::path::PathBuf;
use structopt::clap::AppSettings;
use structopt::StructOpt;

use crate::error::SetupError;
use crate::proxy::ProxyOptions;
use crate::relay::{RelayConfig, Teardown};

fn parse_log_level(l: &str) -> tracing::Level {
    match &l.to_lowercase()[..] {
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}

#[derive(StructOpt, Debug, Clone)]
#[structopt(name = "byte-relay")]
pub struct Opt {
    #[structopt(short = "l", long, default_value = "info", parse(from_str = parse_log_level))]
    pub log_level: tracing::Level,

    /// Relay buffer size per direction, in bytes
    #[structopt(short = "b", long, default_value = "1024")]
    pub buffer_size: usize,

    /// What a hard failure in one direction does to the other: escalate or independent
    #[structopt(long, default_value = "escalate")]
    pub teardown: Teardown,

    #[structopt(subcommand)]
    pub mode: Mode,
}

#[derive(StructOpt, Debug, Clone)]
pub enum Mode {
    /// Run a command with this process's stdin and stdout relayed to it
    #[structopt(setting = AppSettings::TrailingVarArg)]
    Exec {
        command: String,
        #[structopt(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Accept clients on a Unix socket and relay each to an upstream Unix socket
    Proxy {
        #[structopt(parse(from_os_str))]
        upstream: PathBuf,
        #[structopt(parse(from_os_str))]
        listen: PathBuf,
        /// Exit after serving this many connections
        #[structopt(long)]
        max_connections: Option<usize>,
        /// Remove a stale socket file before binding
        #[structopt(long)]
        unlink: bool,
    },
}

impl Opt {
    pub fn relay_config(&self) -> Result<RelayConfig, SetupError> {
        if self.buffer_size == 0 {
            return Err(SetupError::InvalidConfig(
                "buffer size must be at least 1 byte".into(),
            ));
        }
        Ok(RelayConfig {
            buffer_size: self.buffer_size,
            teardown: self.teardown,
        })
    }
}

impl Mode {
    pub fn proxy_options(&self) -> Option<ProxyOptions> {
        match self {
            Mode::Proxy {
                upstream,
                listen,
                max_connections,
                unlink,
            } => Some(ProxyOptions {
                upstream: upstream.clone(),
                listen: listen.clone(),
                max_connections: *max_connections,
                unlink: *unlink,
            }),
            Mode::Exec { .. } => None,
        }
    }
}
