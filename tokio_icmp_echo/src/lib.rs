//! Single target ICMP echo prober running on a tokio event loop.
//!
//! [`ping::icmp::Pinger`] sends echo requests to one IPv4 host on a fixed period and
//! reports every reply carrying this process's identifier, with the round trip time
//! taken from the timestamp each probe carries in its payload.

pub mod error;
pub mod ping;
pub mod resolve;
pub mod socket;

pub use error::{DecodeError, Rejected, RunError, SetupError};
pub use ping::icmp::Pinger;
pub use ping::report::{ConsoleReporter, Event, Reporter};
pub use ping::{Pacing, PingConfiguration, Session};
