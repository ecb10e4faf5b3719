use std::io;
use std::net::Ipv4Addr;

/// Failures that prevent the probe loop from starting.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("unsupported protocol icmp ({0})")]
    UnsupportedProtocol(#[source] io::Error),
    #[error("can't create raw socket ({0})")]
    RawSocket(#[source] io::Error),
    #[error("cannot bind source address '{addr}' ({source})")]
    Bind {
        addr: Ipv4Addr,
        #[source]
        source: io::Error,
    },
    #[error("unknown host {0}")]
    UnknownHost(String),
    #[error("invalid packet size {size} (data must be between {min} and {max} bytes)")]
    InvalidPacketSize { size: u32, min: u32, max: u32 },
    #[error("invalid interval (must be greater than zero)")]
    InvalidInterval,
    #[error("cannot start event loop ({0})")]
    Runtime(#[source] io::Error),
}

/// Structural problems found while decoding a received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("packet too short ({length} bytes, need {required})")]
    TooShort { length: usize, required: usize },
    #[error("malformed IP header (ihl {ihl})")]
    MalformedIpHeader { ihl: u8 },
}

/// Reasons a decoded datagram is not reported as a reply to one of our probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejected {
    #[error("not an echo reply (type {0})")]
    WrongType(u8),
    #[error("identifier {got} != {expected}")]
    WrongIdentifier { got: u16, expected: u16 },
    #[error("packet too short for the correlation payload")]
    ShortPacket,
    #[error("reply timestamp {sent_at}us is after reception at {received_at}us")]
    ClockSkew { sent_at: u64, received_at: u64 },
}


/// Why a ping run ended with an error, at setup or later.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("cannot read from raw socket ({0})")]
    Receive(#[from] io::Error),
}
