use super::codec;
use super::correlation::{self, timestamp_now};
use super::report::{Event, Reporter};
use super::{Pacing, Session, IP_MAX_PACKET};
use crate::error::{DecodeError, Rejected};
use crate::resolve::Resolver;
use crate::socket::RawEndpoint;
use std::future::Future;
use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::time::{self, Instant};

/// Probe loop for a single target.
///
/// One timer paces the echo requests and the endpoint's read readiness drives the
/// reply listener. Both run on the task calling [`Pinger::run`], one at a time.
pub struct Pinger<E, R, W> {
    session: Session,
    endpoint: E,
    resolver: R,
    reporter: W,
    // The banner goes out with the first probe actually sent
    announced: bool,
    buffer: Box<[u8]>,
}

impl<E, R, W> Pinger<E, R, W>
where
    E: RawEndpoint,
    R: Resolver,
    W: Reporter,
{
    pub fn new(session: Session, endpoint: E, resolver: R, reporter: W) -> Self {
        Self {
            session,
            endpoint,
            resolver,
            reporter,
            announced: false,
            buffer: vec![0; IP_MAX_PACKET].into_boxed_slice(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn reporter(&self) -> &W {
        &self.reporter
    }

    pub fn into_reporter(self) -> W {
        self.reporter
    }

    /// Runs until `shutdown` resolves. The first probe leaves one interval after the start.
    ///
    /// Fails when the endpoint can no longer be read from.
    pub async fn run<F>(&mut self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let interval = self.session.interval();
        let timer = time::sleep(interval);
        tokio::pin!(timer);
        tokio::pin!(shutdown);
        let mut armed = true;

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                () = &mut timer, if armed => {
                    self.push();
                    match self.session.pacing() {
                        Pacing::Fixed => {
                            let next = next_deadline(timer.deadline(), interval, Instant::now());
                            timer.as_mut().reset(next);
                        }
                        Pacing::ReplyGated => armed = false,
                    }
                }
                received = self.endpoint.recv_from(&mut self.buffer) => {
                    let received_at = timestamp_now();
                    let (length, from) = match received {
                        Ok(received) => received,
                        Err(error) if is_transient(&error) => continue,
                        Err(error) => {
                            log::debug!("receive failed: {}", error);
                            return Err(error);
                        }
                    };
                    if self.on_datagram(length, from, received_at)
                        && self.session.pacing() == Pacing::ReplyGated
                    {
                        timer.as_mut().reset(Instant::now() + interval);
                        armed = true;
                    }
                }
            }
        }
        log::debug!(
            "stopped pinging {} before icmp_seq={}",
            self.session.target(),
            self.session.sequence()
        );
        Ok(())
    }

    /// Formats and sends one probe.
    fn push(&mut self) {
        let sequence = self.session.next_sequence();
        let target = self.session.target();
        let packet = codec::encode_request(
            self.session.identifier(),
            sequence,
            self.session.packet_size() as usize,
            timestamp_now(),
        );

        match self.endpoint.send_to(&packet, target) {
            Ok(sent) if sent == packet.len() => {
                log::trace!("sent icmp_seq={} to {}", sequence, target);
                if !self.announced {
                    self.announced = true;
                    let name = self.resolver.display_name(target);
                    self.reporter.report(Event::Banner {
                        name,
                        addr: target,
                        data_size: self.session.data_size(),
                        wire_size: self.session.wire_size(),
                    });
                }
            }
            Ok(sent) => self.send_failed(format!(
                "partial write: {} of {} bytes",
                sent,
                packet.len()
            )),
            Err(error) => self.send_failed(error.to_string()),
        }
    }

    fn send_failed(&mut self, reason: String) {
        self.reporter.report(Event::SendFailed {
            host: self.session.host().to_string(),
            reason,
        });
    }

    /// Handles one receive. Returns whether it was a reply to one of our probes.
    fn on_datagram(&mut self, length: usize, from: Ipv4Addr, received_at: u64) -> bool {
        let reply = match codec::decode(&self.buffer[..length], from, received_at) {
            Ok(reply) => reply,
            Err(DecodeError::TooShort { .. }) => {
                self.reporter.report(Event::ShortPacket { length, from });
                return false;
            }
            Err(DecodeError::MalformedIpHeader { ihl }) => {
                self.reporter
                    .report(Event::MalformedHeader { ihl, length, from });
                return false;
            }
        };

        match correlation::validate(&reply, &self.session) {
            Ok(accepted) => {
                let name = self.resolver.display_name(accepted.source);
                self.reporter.report(Event::Reply {
                    length: accepted.length,
                    name,
                    addr: accepted.source,
                    sequence: accepted.sequence,
                    ttl: accepted.ttl,
                    elapsed: accepted.elapsed,
                });
                true
            }
            Err(Rejected::WrongType(ty)) => {
                log::trace!("ignoring icmp type {} from {}", ty, from);
                false
            }
            Err(Rejected::WrongIdentifier { got, expected }) => {
                self.reporter.report(Event::UnexpectedIdentifier {
                    got,
                    expected,
                    length,
                    from,
                });
                false
            }
            Err(Rejected::ShortPacket) => {
                self.reporter.report(Event::ShortPacket { length, from });
                false
            }
            Err(Rejected::ClockSkew { .. }) => {
                self.reporter.report(Event::ClockSkew {
                    sequence: reply.sequence,
                    length,
                    from,
                });
                false
            }
        }
    }
}

/// Spurious wake-ups and interrupted reads leave the endpoint usable.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Next firing of a fixed period timer. A timer running late restarts its period
/// from `now` instead of firing a burst.
fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let next = previous + interval;
    if next < now {
        now + interval
    } else {
        next
    }
}
