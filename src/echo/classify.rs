//! Inbound datagram classification
//!
//! Decides whether a received datagram answers the outstanding echo request
//! and, if so, produces a typed reply. Malformed or unrelated traffic is
//! `Irrelevant`, never an error: a single datagram cannot abort the session.

use crate::echo::reply::{IpOptionInfo, ReplyStatus};
use crate::protocol::icmp::{IcmpPacket, IcmpType, ICMP_HEADER_SIZE};
use crate::protocol::ipv4::{Ipv4Header, PROTO_ICMP};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// A reply correlated to the outstanding request
///
/// `data` and `raw_options` borrow from the receive scratch buffer; the
/// accumulator relocates them into the caller's reply buffer.
#[derive(Debug)]
pub struct Matched<'a> {
    pub source: Ipv4Addr,
    pub status: ReplyStatus,
    pub rtt: Duration,
    pub options: IpOptionInfo,
    pub data: &'a [u8],
    pub raw_options: &'a [u8],
}

/// Classification outcome for one inbound datagram
#[derive(Debug)]
pub enum Classification<'a> {
    /// Noise from unrelated traffic; only consumes timeout budget
    Irrelevant,
    Matched(Matched<'a>),
}

/// Classify an inbound datagram against the outstanding (id, sequence) pair
///
/// The reply's own checksum is deliberately not verified: strict checking
/// breaks legitimate replies traversing some NAT/masquerading paths. Use
/// [`classify_strict`] to opt into verification.
pub fn classify<'a>(
    datagram: &'a [u8],
    from: Ipv4Addr,
    expected_id: u16,
    expected_seq: u16,
    sent_at: Instant,
    received_at: Instant,
) -> Classification<'a> {
    classify_inner(
        datagram,
        from,
        expected_id,
        expected_seq,
        sent_at,
        received_at,
        false,
    )
}

/// [`classify`] with echo-reply checksum verification enabled
pub fn classify_strict<'a>(
    datagram: &'a [u8],
    from: Ipv4Addr,
    expected_id: u16,
    expected_seq: u16,
    sent_at: Instant,
    received_at: Instant,
) -> Classification<'a> {
    classify_inner(
        datagram,
        from,
        expected_id,
        expected_seq,
        sent_at,
        received_at,
        true,
    )
}

fn classify_inner<'a>(
    datagram: &'a [u8],
    from: Ipv4Addr,
    expected_id: u16,
    expected_seq: u16,
    sent_at: Instant,
    received_at: Instant,
    strict: bool,
) -> Classification<'a> {
    // Raw sockets deliver the outer IP header; datagram ping sockets strip
    // it. No ICMP message type has 4 in the high nibble of its first byte,
    // so the version nibble disambiguates.
    let (icmp_region, source, options, raw_options): (&[u8], Ipv4Addr, IpOptionInfo, &[u8]) =
        if !datagram.is_empty() && datagram[0] >> 4 == 4 {
            let Ok(ip) = Ipv4Header::parse(datagram) else {
                return Classification::Irrelevant;
            };
            if ip.protocol() != PROTO_ICMP {
                return Classification::Irrelevant;
            }
            // The outer total-length field bounds everything that follows
            let total = (ip.total_length() as usize).min(datagram.len());
            if total < ip.header_len() + ICMP_HEADER_SIZE {
                return Classification::Irrelevant;
            }
            (
                &datagram[ip.header_len()..total],
                ip.src_addr(),
                IpOptionInfo {
                    ttl: ip.ttl(),
                    tos: ip.tos(),
                    flags: ip.flags(),
                },
                ip.options(),
            )
        } else {
            if datagram.len() < ICMP_HEADER_SIZE {
                return Classification::Irrelevant;
            }
            (datagram, from, IpOptionInfo::default(), &[][..])
        };

    let Ok(icmp) = IcmpPacket::parse(icmp_region) else {
        return Classification::Irrelevant;
    };

    let rtt = received_at.saturating_duration_since(sent_at);

    if icmp.is_echo_reply() {
        if icmp.identifier() != expected_id || icmp.sequence() != expected_seq {
            return Classification::Irrelevant;
        }
        if strict && !icmp.validate_checksum() {
            return Classification::Irrelevant;
        }
        return Classification::Matched(Matched {
            source,
            status: ReplyStatus::Success,
            rtt,
            options,
            data: icmp.payload(),
            raw_options,
        });
    }

    let Some(status) = ReplyStatus::from_icmp_error(icmp.icmp_type(), icmp.code()) else {
        return Classification::Irrelevant;
    };

    // The error payload embeds a copy of the original IP header plus the
    // leading bytes of the datagram that triggered it. The embedded echo
    // header must match the outstanding conversation exactly.
    let embedded = icmp.original_datagram();
    let Ok(orig_ip) = Ipv4Header::parse(embedded) else {
        return Classification::Irrelevant;
    };
    if orig_ip.protocol() != PROTO_ICMP {
        return Classification::Irrelevant;
    }
    if embedded.len() < orig_ip.header_len() + ICMP_HEADER_SIZE {
        return Classification::Irrelevant;
    }
    let Ok(orig_icmp) = IcmpPacket::parse(&embedded[orig_ip.header_len()..]) else {
        return Classification::Irrelevant;
    };
    if orig_icmp.icmp_type() != IcmpType::EchoRequest as u8
        || orig_icmp.code() != 0
        || orig_icmp.identifier() != expected_id
        || orig_icmp.sequence() != expected_seq
    {
        return Classification::Irrelevant;
    }

    Classification::Matched(Matched {
        source,
        status,
        rtt,
        options,
        data: embedded,
        raw_options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::icmp::{build_echo_request, dest_unreachable, icmp_checksum};

    const ID: u16 = 0x1234;
    const SEQ: u16 = 0x0042;

    fn gateway() -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, 254)
    }

    fn timestamps() -> (Instant, Instant) {
        let sent = Instant::now();
        (sent, sent + Duration::from_millis(12))
    }

    // Wrap an ICMP message in an outer IPv4 header
    fn make_ip(src: Ipv4Addr, ttl: u8, tos: u8, options: &[u8], icmp: &[u8]) -> Vec<u8> {
        assert!(options.len() % 4 == 0);
        let header_len = 20 + options.len();
        let total = header_len + icmp.len();
        let mut buf = vec![0u8; total];
        buf[0] = 0x40 | (header_len / 4) as u8;
        buf[1] = tos;
        buf[2..4].copy_from_slice(&(total as u16).to_be_bytes());
        buf[8] = ttl;
        buf[9] = PROTO_ICMP;
        buf[12..16].copy_from_slice(&src.octets());
        buf[16..20].copy_from_slice(&[10, 0, 0, 1]);
        buf[20..header_len].copy_from_slice(options);
        buf[header_len..].copy_from_slice(icmp);
        buf
    }

    fn make_echo_reply(id: u16, seq: u16, payload: &[u8]) -> Vec<u8> {
        let mut reply = build_echo_request(id, seq, payload).unwrap();
        reply[0] = IcmpType::EchoReply as u8;
        reply[2] = 0;
        reply[3] = 0;
        let checksum = icmp_checksum(&reply);
        reply[2..4].copy_from_slice(&checksum.to_be_bytes());
        reply
    }

    // ICMP error wrapping the original request datagram (IP header + echo header)
    fn make_icmp_error(icmp_type: u8, code: u8, orig_id: u16, orig_seq: u16) -> Vec<u8> {
        let orig_request = build_echo_request(orig_id, orig_seq, b"abcdefgh").unwrap();
        let orig_datagram = make_ip(Ipv4Addr::new(10, 0, 0, 1), 64, 0, &[], &orig_request);

        let mut error = vec![0u8; 8 + orig_datagram.len()];
        error[0] = icmp_type;
        error[1] = code;
        error[8..].copy_from_slice(&orig_datagram);
        let checksum = icmp_checksum(&error);
        error[2..4].copy_from_slice(&checksum.to_be_bytes());
        error
    }

    // ==================== echo reply matching ====================

    #[test]
    fn test_matching_echo_reply() {
        let (sent, received) = timestamps();
        let reply = make_echo_reply(ID, SEQ, b"ping payload");
        let datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0x10, &[], &reply);

        match classify(&datagram, gateway(), ID, SEQ, sent, received) {
            Classification::Matched(m) => {
                assert_eq!(m.status, ReplyStatus::Success);
                assert_eq!(m.source, Ipv4Addr::LOCALHOST);
                assert_eq!(m.data, b"ping payload");
                assert_eq!(m.options.ttl, 64);
                assert_eq!(m.options.tos, 0x10);
                assert_eq!(m.rtt, Duration::from_millis(12));
                assert!(m.raw_options.is_empty());
            }
            Classification::Irrelevant => panic!("reply should match"),
        }
    }

    #[test]
    fn test_id_sequence_isolation() {
        let (sent, received) = timestamps();
        // Another session's reply: same process, different id/sequence
        let reply = make_echo_reply(ID.wrapping_add(1), SEQ, b"x");
        let datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &[], &reply);
        assert!(matches!(
            classify(&datagram, gateway(), ID, SEQ, sent, received),
            Classification::Irrelevant
        ));

        let reply = make_echo_reply(ID, SEQ.wrapping_add(1), b"x");
        let datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &[], &reply);
        assert!(matches!(
            classify(&datagram, gateway(), ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_reply_with_ip_options() {
        let (sent, received) = timestamps();
        let options = [0x07, 0x08, 0, 0, 0, 0, 0, 0]; // record-route, padded
        let reply = make_echo_reply(ID, SEQ, b"data");
        let datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &options, &reply);

        match classify(&datagram, gateway(), ID, SEQ, sent, received) {
            Classification::Matched(m) => {
                assert_eq!(m.raw_options, &options);
                assert_eq!(m.data, b"data");
            }
            Classification::Irrelevant => panic!("reply should match"),
        }
    }

    #[test]
    fn test_total_length_bounds_payload() {
        let (sent, received) = timestamps();
        let reply = make_echo_reply(ID, SEQ, b"data");
        let mut datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &[], &reply);
        // Trailing bytes beyond the declared total length are not payload
        datagram.extend_from_slice(b"junk");

        match classify(&datagram, gateway(), ID, SEQ, sent, received) {
            Classification::Matched(m) => assert_eq!(m.data, b"data"),
            Classification::Irrelevant => panic!("reply should match"),
        }
    }

    #[test]
    fn test_strict_rejects_bad_checksum() {
        let (sent, received) = timestamps();
        let mut reply = make_echo_reply(ID, SEQ, b"data");
        reply[2] ^= 0xFF; // corrupt checksum only
        let datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &[], &reply);

        // Default mode tolerates it (NAT rewrite compatibility)
        assert!(matches!(
            classify(&datagram, gateway(), ID, SEQ, sent, received),
            Classification::Matched(_)
        ));
        assert!(matches!(
            classify_strict(&datagram, gateway(), ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }

    // ==================== datagram-socket mode ====================

    #[test]
    fn test_bare_icmp_reply() {
        let (sent, received) = timestamps();
        // Datagram ping sockets deliver the ICMP message without IP header
        let reply = make_echo_reply(ID, SEQ, b"bare");

        match classify(&reply, Ipv4Addr::LOCALHOST, ID, SEQ, sent, received) {
            Classification::Matched(m) => {
                assert_eq!(m.source, Ipv4Addr::LOCALHOST);
                assert_eq!(m.data, b"bare");
                assert_eq!(m.options, IpOptionInfo::default());
            }
            Classification::Irrelevant => panic!("bare reply should match"),
        }
    }

    // ==================== ICMP error correlation ====================

    #[test]
    fn test_port_unreachable_matches() {
        let (sent, received) = timestamps();
        let error = make_icmp_error(
            IcmpType::DestinationUnreachable as u8,
            dest_unreachable::PORT_UNREACHABLE,
            ID,
            SEQ,
        );
        let datagram = make_ip(gateway(), 255, 0, &[], &error);

        match classify(&datagram, Ipv4Addr::LOCALHOST, ID, SEQ, sent, received) {
            Classification::Matched(m) => {
                assert_eq!(m.status, ReplyStatus::DestPortUnreachable);
                assert_eq!(m.source, gateway());
                // Data is the embedded original datagram
                assert_eq!(m.data[0] >> 4, 4);
            }
            Classification::Irrelevant => panic!("error should match"),
        }
    }

    #[test]
    fn test_ttl_expired_matches() {
        let (sent, received) = timestamps();
        let error = make_icmp_error(IcmpType::TimeExceeded as u8, 0, ID, SEQ);
        let datagram = make_ip(gateway(), 254, 0, &[], &error);

        match classify(&datagram, Ipv4Addr::LOCALHOST, ID, SEQ, sent, received) {
            Classification::Matched(m) => {
                assert_eq!(m.status, ReplyStatus::TtlExpiredInTransit)
            }
            Classification::Irrelevant => panic!("error should match"),
        }
    }

    #[test]
    fn test_error_for_other_conversation_ignored() {
        let (sent, received) = timestamps();
        let error = make_icmp_error(
            IcmpType::DestinationUnreachable as u8,
            dest_unreachable::PORT_UNREACHABLE,
            ID.wrapping_add(7),
            SEQ,
        );
        let datagram = make_ip(gateway(), 255, 0, &[], &error);
        assert!(matches!(
            classify(&datagram, Ipv4Addr::LOCALHOST, ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_error_with_truncated_embedded_datagram() {
        let (sent, received) = timestamps();
        let mut error = make_icmp_error(IcmpType::TimeExceeded as u8, 0, ID, SEQ);
        // Keep only the embedded IP header, dropping the echo header
        error.truncate(8 + 20 + 4);
        let datagram = make_ip(gateway(), 254, 0, &[], &error);
        assert!(matches!(
            classify(&datagram, Ipv4Addr::LOCALHOST, ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_error_embedding_non_echo_ignored() {
        let (sent, received) = timestamps();

        // Embedded datagram carries UDP, not ICMP
        let mut orig = make_ip(Ipv4Addr::new(10, 0, 0, 1), 64, 0, &[], &[0u8; 8]);
        orig[9] = 17;
        let mut error = vec![0u8; 8 + orig.len()];
        error[0] = IcmpType::DestinationUnreachable as u8;
        error[1] = dest_unreachable::PORT_UNREACHABLE;
        error[8..].copy_from_slice(&orig);
        let datagram = make_ip(gateway(), 255, 0, &[], &error);
        assert!(matches!(
            classify(&datagram, Ipv4Addr::LOCALHOST, ID, SEQ, sent, received),
            Classification::Irrelevant
        ));

        // Embedded datagram is ICMP but not an echo request (type 0)
        let orig = make_ip(Ipv4Addr::new(10, 0, 0, 1), 64, 0, &[], &[0u8; 8]);
        let mut error = vec![0u8; 8 + orig.len()];
        error[0] = IcmpType::DestinationUnreachable as u8;
        error[1] = dest_unreachable::PORT_UNREACHABLE;
        error[8..].copy_from_slice(&orig);
        let datagram = make_ip(gateway(), 255, 0, &[], &error);
        assert!(matches!(
            classify(&datagram, Ipv4Addr::LOCALHOST, ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }

    // ==================== noise rejection ====================

    #[test]
    fn test_non_icmp_protocol_ignored() {
        let (sent, received) = timestamps();
        let reply = make_echo_reply(ID, SEQ, b"x");
        let mut datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &[], &reply);
        datagram[9] = 17; // UDP
        assert!(matches!(
            classify(&datagram, gateway(), ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_short_datagrams_ignored() {
        let (sent, received) = timestamps();
        for len in 0..20 {
            let buf = vec![0x45u8; len];
            assert!(matches!(
                classify(&buf, gateway(), ID, SEQ, sent, received),
                Classification::Irrelevant
            ));
        }
    }

    #[test]
    fn test_truncated_icmp_after_header_ignored() {
        let (sent, received) = timestamps();
        // Valid IP header, but only 4 bytes of ICMP follow
        let datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &[], &[0u8; 4]);
        assert!(matches!(
            classify(&datagram, gateway(), ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_unknown_icmp_type_ignored() {
        let (sent, received) = timestamps();
        let mut message = vec![0u8; 16];
        message[0] = 13; // timestamp request
        let datagram = make_ip(Ipv4Addr::LOCALHOST, 64, 0, &[], &message);
        assert!(matches!(
            classify(&datagram, gateway(), ID, SEQ, sent, received),
            Classification::Irrelevant
        ));
    }
}
