//! Matching replies to our own probes.
//!
//! No table of outstanding probes is kept: each probe carries its send time in the
//! payload and the reply hands it back. Nothing authenticates the peer, so any host
//! able to reach us can forge a reply with our identifier and an arbitrary timestamp.

use super::codec::Reply;
use super::{Session, MAGIC};
use crate::error::Rejected;
use pnet::packet::icmp::IcmpTypes;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A reply to one of our probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted {
    pub source: Ipv4Addr,
    pub sequence: u16,
    pub ttl: u8,
    /// ICMP bytes received.
    pub length: usize,
    pub elapsed: Duration,
}

/// Wall clock in microseconds since the UNIX epoch.
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

/// Accepts echo replies carrying our identifier and a usable send timestamp.
///
/// The sequence number is not checked, so duplicates and late replies are accepted.
/// A payload without our magic is accepted as well.
pub fn validate(reply: &Reply, session: &Session) -> Result<Accepted, Rejected> {
    if reply.icmp_type != IcmpTypes::EchoReply {
        return Err(Rejected::WrongType(reply.icmp_type.0));
    }
    if reply.identifier != session.identifier() {
        return Err(Rejected::WrongIdentifier {
            got: reply.identifier,
            expected: session.identifier(),
        });
    }
    let correlation = reply.correlation.ok_or(Rejected::ShortPacket)?;
    if correlation.magic != MAGIC {
        log::debug!(
            "reply from {} carries magic {:#010x}",
            reply.source,
            correlation.magic
        );
    }
    let elapsed = compute_elapsed(correlation.sent_at, reply.received_at).ok_or(
        Rejected::ClockSkew {
            sent_at: correlation.sent_at,
            received_at: reply.received_at,
        },
    )?;

    Ok(Accepted {
        source: reply.source,
        sequence: reply.sequence,
        ttl: reply.ttl,
        length: reply.icmp_length(),
        elapsed,
    })
}

/// `None` when the reply claims to have been sent after it was received.
pub fn compute_elapsed(sent_at: u64, received_at: u64) -> Option<Duration> {
    received_at.checked_sub(sent_at).map(Duration::from_micros)
}

/// Renders a time given in hundredths of a millisecond with three significant digits.
pub fn format_time(hundredths: u64) -> String {
    match hundredths {
        // 0.00 - 0.99
        t if t < 100 => format!("0.{:02}", t),
        // 1.00 - 9.99
        t if t < 1_000 => format!("{}.{:02}", t / 100, t % 100),
        // 10.0 - 99.9
        t if t < 10_000 => format!("{}.{}", t / 100, (t % 100) / 10),
        t => format!("{}", t / 100),
    }
}

/// Milliseconds as printed in reply lines.
pub fn format_elapsed(elapsed: Duration) -> String {
    format_time((elapsed.as_micros() / 10) as u64)
}
