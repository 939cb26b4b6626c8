use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use futures::future::{self, Pending};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::endpoint::Endpoint;
use super::pair::{PairReport, RelayPair};
use super::ring_buffer::DEFAULT_CAPACITY;

/// What happens to the other direction when one direction fails hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Escalate,
    Independent,
}

impl Default for Teardown {
    fn default() -> Self {
        Teardown::Escalate
    }
}

impl FromStr for Teardown {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_lowercase()[..] {
            "escalate" => Ok(Teardown::Escalate),
            "independent" => Ok(Teardown::Independent),
            other => Err(format!(
                "unknown teardown policy `{}` (expected `escalate` or `independent`)",
                other
            )),
        }
    }
}

impl fmt::Display for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Teardown::Escalate => f.write_str("escalate"),
            Teardown::Independent => f.write_str("independent"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RelayConfig {
    pub buffer_size: usize,
    pub teardown: Teardown,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_CAPACITY,
            teardown: Teardown::default(),
        }
    }
}

#[derive(Debug)]
pub struct ConnectionReport {
    pub a_to_b: PairReport,
    pub b_to_a: PairReport,
    /// The connection was cut short by an explicit stop.
    pub stopped: bool,
}

impl ConnectionReport {
    pub fn is_hard_failure(&self) -> bool {
        self.a_to_b.is_hard_failure() || self.b_to_a.is_hard_failure()
    }
}

/// Owns both directions of one logical connection between endpoints A and B.
#[derive(Debug)]
pub struct ConnectionSupervisor<AR, AW, BR, BW> {
    a_to_b: RelayPair<AR, BW>,
    b_to_a: RelayPair<BR, AW>,
    teardown: Teardown,
    b_to_a_ends_connection: bool,
}

impl<AR, AW, BR, BW> ConnectionSupervisor<AR, AW, BR, BW>
where
    AR: AsyncRead + Unpin,
    AW: AsyncWrite + Unpin,
    BR: AsyncRead + Unpin,
    BW: AsyncWrite + Unpin,
{
    /// `labels` name the A→B and B→A directions in logs and reports.
    pub fn new(
        labels: (&str, &str),
        a: Endpoint<AR, AW>,
        b: Endpoint<BR, BW>,
        config: &RelayConfig,
    ) -> Self {
        let (a_read, a_write) = a.into_split();
        let (b_read, b_write) = b.into_split();
        Self {
            a_to_b: RelayPair::new(labels.0, a_read, b_write, config.buffer_size),
            b_to_a: RelayPair::new(labels.1, b_read, a_write, config.buffer_size),
            teardown: config.teardown,
            b_to_a_ends_connection: false,
        }
    }

    /// Once B→A is finished, abort whatever is left of A→B. For a B that
    /// cannot read once its output is closed, such as an exited child.
    pub fn end_with_b_to_a(mut self) -> Self {
        self.b_to_a_ends_connection = true;
        self
    }

    pub fn poll_pairs(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let _ = self.a_to_b.poll_relay(cx);
        let _ = self.b_to_a.poll_relay(cx);

        if self.teardown == Teardown::Escalate {
            escalate(&self.a_to_b, &mut self.b_to_a);
            escalate(&self.b_to_a, &mut self.a_to_b);
        }
        if self.b_to_a_ends_connection && self.b_to_a.is_finished() && !self.a_to_b.is_finished() {
            info!(
                "pair ({}) finished, closing pair ({})",
                self.b_to_a.label(),
                self.a_to_b.label()
            );
            self.a_to_b.abort();
        }

        if self.a_to_b.is_finished() && self.b_to_a.is_finished() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }

    pub fn run(self) -> Supervised<AR, AW, BR, BW, Pending<()>> {
        self.run_until(future::pending())
    }

    /// Relays until both directions finish or `stop` resolves, whichever
    /// comes first. On stop every live leg is aborted.
    pub fn run_until<S: Future>(self, stop: S) -> Supervised<AR, AW, BR, BW, S> {
        info!(
            "relaying ({}, {}), teardown {}",
            self.a_to_b.label(),
            self.b_to_a.label(),
            self.teardown
        );
        Supervised {
            supervisor: Some(self),
            stop,
        }
    }
}

impl<AR, AW, BR, BW> ConnectionSupervisor<AR, AW, BR, BW> {
    pub fn abort(&mut self) {
        self.a_to_b.abort();
        self.b_to_a.abort();
    }

    fn into_report(self, stopped: bool) -> ConnectionReport {
        ConnectionReport {
            a_to_b: self.a_to_b.into_report(),
            b_to_a: self.b_to_a.into_report(),
            stopped,
        }
    }
}

fn escalate<R1, W1, R2, W2>(failed: &RelayPair<R1, W1>, other: &mut RelayPair<R2, W2>) {
    if failed.has_hard_failure() && !other.is_finished() {
        warn!(
            "pair ({}) failed, closing pair ({})",
            failed.label(),
            other.label()
        );
        other.abort();
    }
}

pin_project! {
    pub struct Supervised<AR, AW, BR, BW, S> {
        supervisor: Option<ConnectionSupervisor<AR, AW, BR, BW>>,
        #[pin]
        stop: S,
    }
}

impl<AR, AW, BR, BW, S> Future for Supervised<AR, AW, BR, BW, S>
where
    AR: AsyncRead + Unpin,
    AW: AsyncWrite + Unpin,
    BR: AsyncRead + Unpin,
    BW: AsyncWrite + Unpin,
    S: Future,
{
    type Output = ConnectionReport;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = self.project();
        let supervisor = me
            .supervisor
            .as_mut()
            .expect("Supervised polled after completion");

        let stopped = match me.stop.poll(cx) {
            Poll::Ready(_) => {
                info!("stop requested, closing connection");
                supervisor.abort();
                true
            }
            Poll::Pending => {
                if supervisor.poll_pairs(cx).is_pending() {
                    return Poll::Pending;
                }
                false
            }
        };

        let report = match me.supervisor.take() {
            Some(supervisor) => supervisor.into_report(stopped),
            None => unreachable!(),
        };
        debug!(
            "connection done: {} bytes {}, {} bytes {}",
            report.a_to_b.bytes, report.a_to_b.label, report.b_to_a.bytes, report.b_to_a.label
        );
        Poll::Ready(report)
    }
}
