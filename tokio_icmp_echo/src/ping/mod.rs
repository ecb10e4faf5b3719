pub mod codec;
pub mod correlation;
pub mod icmp;
pub mod report;

use crate::error::SetupError;
use pnet::packet;
use std::net::Ipv4Addr;
use std::time::Duration;

pub type IcmpType = packet::icmp::IcmpType;

/// Fixed part of an ICMP echo message: type, code, checksum, identifier, sequence.
pub const ICMP_HEADER_SIZE: usize = 8;
/// IPv4 header without options.
pub const IP_HEADER_SIZE: usize = 20;
/// Largest IPv4 datagram.
pub const IP_MAX_PACKET: usize = 65535;

/// Sentinel opening the correlation payload of every probe we send.
pub const MAGIC: u32 = 0xd4c3_d2a1;
/// Magic (4 bytes) followed by the send timestamp in microseconds (8 bytes).
pub const CORRELATION_SIZE: usize = 12;

pub const MIN_DATA_SIZE: u32 = CORRELATION_SIZE as u32;
pub const MAX_DATA_SIZE: u32 = (IP_MAX_PACKET - IP_HEADER_SIZE - ICMP_HEADER_SIZE) as u32;
// 56 data bytes, like the traditional ping
pub const DEFAULT_DATA_SIZE: u32 = MIN_DATA_SIZE + 44;
pub const DEFAULT_INTERVAL: Duration = Duration::from_micros(500_000);

/// How the probe timer is re-armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// A probe leaves every interval whether or not replies come back.
    Fixed,
    /// The timer fires once, then is re-armed one interval after each accepted reply.
    /// A lost probe stops the cadence.
    ReplyGated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingConfiguration {
    pub interval: Duration,
    // Data bytes after the ICMP header, correlation payload included
    pub data_size: u32,
    pub pacing: Pacing,
}

impl Default for PingConfiguration {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            data_size: DEFAULT_DATA_SIZE,
            pacing: Pacing::Fixed,
        }
    }
}

impl PingConfiguration {
    pub fn validate(&self) -> Result<(), SetupError> {
        if !(MIN_DATA_SIZE..=MAX_DATA_SIZE).contains(&self.data_size) {
            return Err(SetupError::InvalidPacketSize {
                size: self.data_size,
                min: MIN_DATA_SIZE,
                max: MAX_DATA_SIZE,
            });
        }
        if self.interval.is_zero() {
            return Err(SetupError::InvalidInterval);
        }
        Ok(())
    }
}

/// Runtime state shared by the probe timer and the reply listener.
#[derive(Debug, Clone)]
pub struct Session {
    identifier: u16,
    host: String,
    target: Ipv4Addr,
    sequence: u8,
    interval: Duration,
    packet_size: u32,
    pacing: Pacing,
}

impl Session {
    pub fn new(
        host: impl Into<String>,
        target: Ipv4Addr,
        configuration: &PingConfiguration,
    ) -> Result<Self, SetupError> {
        configuration.validate()?;
        Ok(Self {
            identifier: process_identifier(),
            host: host.into(),
            target,
            sequence: 1,
            interval: configuration.interval,
            packet_size: configuration.data_size + ICMP_HEADER_SIZE as u32,
            pacing: configuration.pacing,
        })
    }

    pub fn with_identifier(mut self, identifier: u16) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    /// The host as the operator wrote it.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn target(&self) -> Ipv4Addr {
        self.target
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total ICMP message size: header, correlation payload and padding.
    pub fn packet_size(&self) -> u32 {
        self.packet_size
    }

    /// Bytes following the ICMP header.
    pub fn data_size(&self) -> u32 {
        self.packet_size - ICMP_HEADER_SIZE as u32
    }

    /// Size of a probe on the wire, IP header included.
    pub fn wire_size(&self) -> u32 {
        self.packet_size + IP_HEADER_SIZE as u32
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Sequence number the next probe will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Returns the sequence number for the probe about to be sent and advances the counter.
    pub fn next_sequence(&mut self) -> u8 {
        let sequence = self.sequence;
        self.sequence = sequence.wrapping_add(1);
        sequence
    }
}

/// Identifier of this process's probes: the pid truncated to 16 bits.
pub fn process_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}
