//! The relay core: a fixed buffer per direction, two cooperating legs per
//! buffer, and a supervisor per connection. Everything runs on one task; no
//! locking is involved.

mod endpoint;
mod leg;
mod pair;
mod ring_buffer;
mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use endpoint::{poll_read_partial, Endpoint, ReadOutcome};
pub use leg::{Finish, LegState, ReaderLeg, Role, Step, WaitReason, WriterLeg};
pub use pair::{PairReport, RelayPair};
pub use ring_buffer::{ReadSide, RingBuffer, WriteSide, DEFAULT_CAPACITY};
pub use supervisor::{ConnectionReport, ConnectionSupervisor, RelayConfig, Supervised, Teardown};
