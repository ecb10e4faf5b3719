use super::{IcmpType, CORRELATION_SIZE, ICMP_HEADER_SIZE, IP_HEADER_SIZE, MAGIC};
use crate::error::DecodeError;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::{self, MutableEchoRequestPacket};
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::{MutablePacket, Packet};
use std::net::Ipv4Addr;

/// Smallest echo request we can format: header plus correlation payload.
pub const MIN_PACKET_SIZE: usize = ICMP_HEADER_SIZE + CORRELATION_SIZE;

/// Payload we embed in every probe so that a reply carries its own send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    pub magic: u32,
    /// Microseconds since the UNIX epoch.
    pub sent_at: u64,
}

impl Correlation {
    fn read(payload: &[u8]) -> Option<Self> {
        let payload = payload.get(..CORRELATION_SIZE)?;
        let (magic, sent_at) = payload.split_at(4);
        Some(Self {
            magic: u32::from_be_bytes(magic.try_into().ok()?),
            sent_at: u64::from_be_bytes(sent_at.try_into().ok()?),
        })
    }

    fn write(&self, payload: &mut [u8]) {
        payload[..4].copy_from_slice(&self.magic.to_be_bytes());
        payload[4..CORRELATION_SIZE].copy_from_slice(&self.sent_at.to_be_bytes());
    }
}

/// Decoded view over a datagram read from the raw endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub ip_header_length: usize,
    pub ttl: u8,
    pub icmp_type: IcmpType,
    pub identifier: u16,
    pub sequence: u16,
    /// Only read for echo replies long enough to hold it.
    pub correlation: Option<Correlation>,
    /// Microseconds since the UNIX epoch.
    pub received_at: u64,
    pub source: Ipv4Addr,
    /// Bytes received, IP header included.
    pub length: usize,
}

impl Reply {
    /// Size of the ICMP message alone.
    pub fn icmp_length(&self) -> usize {
        self.length - self.ip_header_length
    }
}

/// Internet checksum (RFC 1071) over `data`.
///
/// Words are summed in network byte order with the carries folded back in, and the
/// sum is complemented. A trailing odd byte counts as the high half of a last word
/// padded with zero. Running it over a message that already holds its checksum
/// yields zero.
pub fn checksum(data: &[u8]) -> u16 {
    let mut words = data.chunks_exact(2);
    let mut sum: u64 = words
        .by_ref()
        .map(|word| u64::from(u16::from_be_bytes([word[0], word[1]])))
        .sum();
    if let [last] = words.remainder() {
        sum += u64::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Formats an echo request of `packet_size` bytes (never less than `MIN_PACKET_SIZE`).
///
/// Layout: ICMP header, magic, `sent_at`, zero padding. The checksum is computed last
/// while its field is still zero.
pub fn encode_request(identifier: u16, sequence: u8, packet_size: usize, sent_at: u64) -> Vec<u8> {
    let mut buffer = vec![0; packet_size.max(MIN_PACKET_SIZE)];
    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer[..]) {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(echo_request::IcmpCodes::NoCode);
        packet.set_identifier(identifier);
        packet.set_sequence_number(u16::from(sequence));
        Correlation {
            magic: MAGIC,
            sent_at,
        }
        .write(packet.payload_mut());
        let csum = checksum(packet.packet());
        packet.set_checksum(csum);
    }
    buffer
}

/// Decodes an IPv4 datagram holding an ICMP message.
///
/// The ICMP checksum is not verified: any reply the kernel hands us is looked at.
pub fn decode(buffer: &[u8], source: Ipv4Addr, received_at: u64) -> Result<Reply, DecodeError> {
    let too_short = |required| DecodeError::TooShort {
        length: buffer.len(),
        required,
    };
    let ip =
        Ipv4Packet::new(buffer).ok_or_else(|| too_short(IP_HEADER_SIZE + ICMP_HEADER_SIZE))?;
    let ihl = ip.get_header_length();
    if ihl < 5 {
        return Err(DecodeError::MalformedIpHeader { ihl });
    }
    let ip_header_length = usize::from(ihl) * 4;
    let icmp = buffer
        .get(ip_header_length..)
        .and_then(EchoReplyPacket::new)
        .ok_or_else(|| too_short(ip_header_length + ICMP_HEADER_SIZE))?;

    let icmp_type = icmp.get_icmp_type();
    let correlation = if icmp_type == IcmpTypes::EchoReply {
        Correlation::read(icmp.payload())
    } else {
        None
    };

    Ok(Reply {
        ip_header_length,
        ttl: ip.get_ttl(),
        icmp_type,
        identifier: icmp.get_identifier(),
        sequence: icmp.get_sequence_number(),
        correlation,
        received_at,
        source,
        length: buffer.len(),
    })
}

/// Builds the datagram a conforming peer sends back for `request`: the same ICMP
/// message turned into an echo reply, behind an IPv4 header from `source` to `destination`.
pub fn echo_reply_datagram(
    request: &[u8],
    source: Ipv4Addr,
    destination: Ipv4Addr,
    ttl: u8,
) -> Vec<u8> {
    let mut icmp = request.to_vec();
    if icmp.len() >= ICMP_HEADER_SIZE {
        icmp[0] = IcmpTypes::EchoReply.0;
        icmp[2..4].copy_from_slice(&[0, 0]);
        let csum = checksum(&icmp);
        icmp[2..4].copy_from_slice(&csum.to_be_bytes());
    }

    let mut buffer = vec![0; IP_HEADER_SIZE + icmp.len()];
    if let Some(mut ip) = MutableIpv4Packet::new(&mut buffer[..]) {
        ip.set_version(4);
        ip.set_header_length((IP_HEADER_SIZE / 4) as u8);
        ip.set_total_length((IP_HEADER_SIZE + icmp.len()) as u16);
        ip.set_ttl(ttl);
        ip.set_next_level_protocol(IpNextHeaderProtocols::Icmp);
        ip.set_source(source);
        ip.set_destination(destination);
        ip.set_payload(&icmp);
        let csum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(csum);
    }
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);

    #[test]
    fn checksum_of_checksummed_buffer_is_zero() {
        for size in [MIN_PACKET_SIZE, 64, 65, 1001] {
            let packet = encode_request(0xbeef, 42, size, 1_600_000_000_123_456);
            assert_eq!(packet.len(), size);
            assert_eq!(checksum(&packet), 0, "size {}", size);
        }
    }

    #[test]
    fn checksum_agrees_with_pnet() {
        for size in [MIN_PACKET_SIZE, 63, 64, 1500] {
            let mut packet = encode_request(7, 3, size, 99);
            packet[2] = 0;
            packet[3] = 0;
            assert_eq!(checksum(&packet), pnet::util::checksum(&packet, 1));
        }
    }

    #[test]
    fn checksum_pads_odd_byte_on_the_right() {
        assert_eq!(checksum(&[0x01]), !0x0100);
        assert_eq!(checksum(&[0x00, 0x01, 0xf2]), !0xf201);
        // carry folding
        assert_eq!(checksum(&[0xff, 0xff, 0x00, 0x01]), !0x0001);
        assert_eq!(checksum(&[]), 0xffff);
    }

    #[test]
    fn request_layout() {
        let packet = encode_request(0x1234, 9, 64, 0x0102_0304_0506_0708);
        assert_eq!(packet[0], 8);
        assert_eq!(packet[1], 0);
        assert_eq!(&packet[4..6], &[0x12, 0x34]);
        assert_eq!(&packet[6..8], &[0, 9]);
        assert_eq!(&packet[8..12], &MAGIC.to_be_bytes());
        assert_eq!(&packet[12..20], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(packet[20..].iter().all(|b| *b == 0));
    }

    #[test]
    fn undersized_request_is_grown_to_fit_the_payload() {
        assert_eq!(encode_request(1, 1, 8, 0).len(), MIN_PACKET_SIZE);
    }

    #[test]
    fn reply_round_trip() {
        let request = encode_request(4321, 200, 64, 1_234_567);
        let datagram = echo_reply_datagram(&request, PEER, Ipv4Addr::LOCALHOST, 57);
        let reply = decode(&datagram, PEER, 1_300_000).unwrap();

        assert_eq!(reply.icmp_type, IcmpTypes::EchoReply);
        assert_eq!(reply.identifier, 4321);
        assert_eq!(reply.sequence, 200);
        assert_eq!(reply.ttl, 57);
        assert_eq!(reply.ip_header_length, 20);
        assert_eq!(reply.length, 84);
        assert_eq!(reply.icmp_length(), 64);
        assert_eq!(reply.source, PEER);
        assert_eq!(
            reply.correlation,
            Some(Correlation {
                magic: MAGIC,
                sent_at: 1_234_567
            })
        );
    }

    #[test]
    fn short_buffers_are_refused() {
        let request = encode_request(1, 1, 64, 0);
        let datagram = echo_reply_datagram(&request, PEER, Ipv4Addr::LOCALHOST, 64);
        for length in [0, 1, 19, 20, 27] {
            assert_eq!(
                decode(&datagram[..length], PEER, 0),
                Err(DecodeError::TooShort {
                    length,
                    required: 28
                })
            );
        }
        assert!(decode(&datagram[..28], PEER, 0).is_ok());
    }

    #[test]
    fn ip_options_shift_the_icmp_header() {
        let request = encode_request(77, 5, 64, 10);
        let plain = echo_reply_datagram(&request, PEER, Ipv4Addr::LOCALHOST, 64);
        let mut datagram = plain[..IP_HEADER_SIZE].to_vec();
        datagram[0] = 0x46;
        datagram.extend_from_slice(&[1, 1, 1, 0]);
        datagram.extend_from_slice(&plain[IP_HEADER_SIZE..]);

        let reply = decode(&datagram, PEER, 20).unwrap();
        assert_eq!(reply.ip_header_length, 24);
        assert_eq!(reply.identifier, 77);
        assert_eq!(reply.correlation.map(|c| c.sent_at), Some(10));

        assert_eq!(
            decode(&datagram[..31], PEER, 0),
            Err(DecodeError::TooShort {
                length: 31,
                required: 32
            })
        );
    }

    #[test]
    fn malformed_header_length() {
        let request = encode_request(1, 1, 64, 0);
        let mut datagram = echo_reply_datagram(&request, PEER, Ipv4Addr::LOCALHOST, 64);
        datagram[0] = 0x44;
        assert_eq!(
            decode(&datagram, PEER, 0),
            Err(DecodeError::MalformedIpHeader { ihl: 4 })
        );
    }

    #[test]
    fn correlation_only_read_from_echo_replies() {
        let request = encode_request(1, 1, 64, 0);
        let mut datagram = echo_reply_datagram(&request, PEER, Ipv4Addr::LOCALHOST, 64);
        datagram[IP_HEADER_SIZE] = IcmpTypes::EchoRequest.0;
        let reply = decode(&datagram, PEER, 0).unwrap();
        assert_eq!(reply.icmp_type, IcmpTypes::EchoRequest);
        assert_eq!(reply.correlation, None);

        let truncated = echo_reply_datagram(&request[..16], PEER, Ipv4Addr::LOCALHOST, 64);
        let reply = decode(&truncated, PEER, 0).unwrap();
        assert_eq!(reply.icmp_type, IcmpTypes::EchoReply);
        assert_eq!(reply.correlation, None);
    }

    #[test]
    fn reply_checksum_is_not_checked() {
        let request = encode_request(1, 1, 64, 0);
        let mut datagram = echo_reply_datagram(&request, PEER, Ipv4Addr::LOCALHOST, 64);
        datagram[IP_HEADER_SIZE + 2] ^= 0xff;
        assert!(decode(&datagram, PEER, 0).is_ok());
    }
}
