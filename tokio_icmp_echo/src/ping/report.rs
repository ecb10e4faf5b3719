use super::correlation::format_elapsed;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Everything the probe loop tells the operator, one line each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Banner {
        name: String,
        addr: Ipv4Addr,
        data_size: u32,
        wire_size: u32,
    },
    Reply {
        length: usize,
        name: String,
        addr: Ipv4Addr,
        sequence: u16,
        ttl: u8,
        elapsed: Duration,
    },
    ShortPacket {
        length: usize,
        from: Ipv4Addr,
    },
    MalformedHeader {
        ihl: u8,
        length: usize,
        from: Ipv4Addr,
    },
    UnexpectedIdentifier {
        got: u16,
        expected: u16,
        length: usize,
        from: Ipv4Addr,
    },
    ClockSkew {
        sequence: u16,
        length: usize,
        from: Ipv4Addr,
    },
    SendFailed {
        host: String,
        reason: String,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Banner {
                name,
                addr,
                data_size,
                wire_size,
            } => write!(
                f,
                "PING {} ({}) {}({}) bytes of data.",
                name, addr, data_size, wire_size
            ),
            Self::Reply {
                length,
                name,
                addr,
                sequence,
                ttl,
                elapsed,
            } => write!(
                f,
                "{} bytes from {} ({}): icmp_seq={} ttl={} time={} ms",
                length,
                name,
                addr,
                sequence,
                ttl,
                format_elapsed(*elapsed)
            ),
            Self::ShortPacket { length, from } => write!(
                f,
                "received packet too short for ICMP ({} bytes from {})",
                length, from
            ),
            Self::MalformedHeader { ihl, length, from } => write!(
                f,
                "received packet with malformed IP header - ihl {} ({} bytes from {})",
                ihl, length, from
            ),
            Self::UnexpectedIdentifier {
                got,
                expected,
                length,
                from,
            } => write!(
                f,
                "received unexpected packet - id {} != {} ({} bytes from {})",
                got, expected, length, from
            ),
            Self::ClockSkew {
                sequence,
                length,
                from,
            } => write!(
                f,
                "received reply from the future - icmp_seq={} ({} bytes from {})",
                sequence, length, from
            ),
            Self::SendFailed { host, reason } => {
                write!(f, "{} error while sending ping [{}]", host, reason)
            }
        }
    }
}

pub trait Reporter {
    fn report(&mut self, event: Event);
}

/// Prints every event on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&mut self, event: Event) {
        println!("{}", event);
    }
}

impl Reporter for Vec<Event> {
    fn report(&mut self, event: Event) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);

    #[test]
    fn banner() {
        let event = Event::Banner {
            name: "host.example".into(),
            addr: PEER,
            data_size: 56,
            wire_size: 84,
        };
        assert_eq!(
            event.to_string(),
            "PING host.example (192.0.2.1) 56(84) bytes of data."
        );
    }

    #[test]
    fn reply() {
        let event = Event::Reply {
            length: 64,
            name: "host.example".into(),
            addr: PEER,
            sequence: 3,
            ttl: 57,
            elapsed: Duration::from_micros(12_345),
        };
        assert_eq!(
            event.to_string(),
            "64 bytes from host.example (192.0.2.1): icmp_seq=3 ttl=57 time=12.3 ms"
        );
    }

    #[test]
    fn diagnostics() {
        assert_eq!(
            Event::ShortPacket {
                length: 12,
                from: PEER
            }
            .to_string(),
            "received packet too short for ICMP (12 bytes from 192.0.2.1)"
        );
        assert_eq!(
            Event::UnexpectedIdentifier {
                got: 4321,
                expected: 1234,
                length: 84,
                from: PEER
            }
            .to_string(),
            "received unexpected packet - id 4321 != 1234 (84 bytes from 192.0.2.1)"
        );
        assert_eq!(
            Event::SendFailed {
                host: "example.org".into(),
                reason: "Network is unreachable (os error 101)".into()
            }
            .to_string(),
            "example.org error while sending ping [Network is unreachable (os error 101)]"
        );
    }

    #[test]
    fn vec_collects_events() {
        let mut events = Vec::new();
        events.report(Event::ShortPacket {
            length: 1,
            from: PEER,
        });
        assert_eq!(events.len(), 1);
    }
}
