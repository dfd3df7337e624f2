//! Reply status model and ICMP error mapping

use crate::protocol::icmp::{dest_unreachable, time_exceeded, IcmpType};
use std::fmt;

/// Outcome attached to a single reply record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Success,
    TimedOut,
    DestNetUnreachable,
    DestHostUnreachable,
    DestProtocolUnreachable,
    DestPortUnreachable,
    /// Source-route failure
    BadRoute,
    TtlExpiredInTransit,
    TtlExpiredReassembly,
    ParamProblem,
    SourceQuench,
    GeneralFailure,
}

impl ReplyStatus {
    /// Map an ICMP error (type, code) pair onto a status
    ///
    /// Returns `None` for types that are not error notifications answering
    /// an echo request.
    pub fn from_icmp_error(icmp_type: u8, code: u8) -> Option<Self> {
        match IcmpType::from_u8(icmp_type)? {
            IcmpType::DestinationUnreachable => Some(match code {
                dest_unreachable::HOST_UNREACHABLE
                | dest_unreachable::HOST_UNKNOWN
                | dest_unreachable::SOURCE_ISOLATED
                | dest_unreachable::HOST_PROHIBITED
                | dest_unreachable::HOST_UNREACHABLE_TOS => ReplyStatus::DestHostUnreachable,
                dest_unreachable::PROTOCOL_UNREACHABLE => ReplyStatus::DestProtocolUnreachable,
                dest_unreachable::PORT_UNREACHABLE => ReplyStatus::DestPortUnreachable,
                dest_unreachable::SOURCE_ROUTE_FAILED => ReplyStatus::BadRoute,
                _ => ReplyStatus::DestNetUnreachable,
            }),
            IcmpType::TimeExceeded => Some(if code == time_exceeded::FRAGMENT_REASSEMBLY {
                ReplyStatus::TtlExpiredReassembly
            } else {
                ReplyStatus::TtlExpiredInTransit
            }),
            IcmpType::ParameterProblem => Some(ReplyStatus::ParamProblem),
            IcmpType::SourceQuench => Some(ReplyStatus::SourceQuench),
            IcmpType::EchoReply | IcmpType::EchoRequest => None,
        }
    }

    /// Stable numeric code used by the packed record encoding
    pub fn as_u32(self) -> u32 {
        match self {
            ReplyStatus::Success => 0,
            ReplyStatus::TimedOut => 1,
            ReplyStatus::DestNetUnreachable => 2,
            ReplyStatus::DestHostUnreachable => 3,
            ReplyStatus::DestProtocolUnreachable => 4,
            ReplyStatus::DestPortUnreachable => 5,
            ReplyStatus::BadRoute => 6,
            ReplyStatus::TtlExpiredInTransit => 7,
            ReplyStatus::TtlExpiredReassembly => 8,
            ReplyStatus::ParamProblem => 9,
            ReplyStatus::SourceQuench => 10,
            ReplyStatus::GeneralFailure => 11,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => ReplyStatus::Success,
            1 => ReplyStatus::TimedOut,
            2 => ReplyStatus::DestNetUnreachable,
            3 => ReplyStatus::DestHostUnreachable,
            4 => ReplyStatus::DestProtocolUnreachable,
            5 => ReplyStatus::DestPortUnreachable,
            6 => ReplyStatus::BadRoute,
            7 => ReplyStatus::TtlExpiredInTransit,
            8 => ReplyStatus::TtlExpiredReassembly,
            9 => ReplyStatus::ParamProblem,
            10 => ReplyStatus::SourceQuench,
            11 => ReplyStatus::GeneralFailure,
            _ => return None,
        })
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReplyStatus::Success => "success",
            ReplyStatus::TimedOut => "request timed out",
            ReplyStatus::DestNetUnreachable => "destination net unreachable",
            ReplyStatus::DestHostUnreachable => "destination host unreachable",
            ReplyStatus::DestProtocolUnreachable => "destination protocol unreachable",
            ReplyStatus::DestPortUnreachable => "destination port unreachable",
            ReplyStatus::BadRoute => "bad route (source route failed)",
            ReplyStatus::TtlExpiredInTransit => "TTL expired in transit",
            ReplyStatus::TtlExpiredReassembly => "TTL expired during reassembly",
            ReplyStatus::ParamProblem => "parameter problem",
            ReplyStatus::SourceQuench => "source quench",
            ReplyStatus::GeneralFailure => "general failure",
        };
        f.write_str(text)
    }
}

/// IP-level option info copied from the outer header of a reply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpOptionInfo {
    pub ttl: u8,
    pub tos: u8,
    pub flags: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== mapping table tests ====================

    #[test]
    fn test_dest_unreachable_mapping() {
        assert_eq!(
            ReplyStatus::from_icmp_error(3, 0),
            Some(ReplyStatus::DestNetUnreachable)
        );
        assert_eq!(
            ReplyStatus::from_icmp_error(3, 1),
            Some(ReplyStatus::DestHostUnreachable)
        );
        assert_eq!(
            ReplyStatus::from_icmp_error(3, 2),
            Some(ReplyStatus::DestProtocolUnreachable)
        );
        assert_eq!(
            ReplyStatus::from_icmp_error(3, 3),
            Some(ReplyStatus::DestPortUnreachable)
        );
        assert_eq!(
            ReplyStatus::from_icmp_error(3, 5),
            Some(ReplyStatus::BadRoute)
        );
    }

    #[test]
    fn test_host_unreachable_family() {
        for code in [1, 7, 8, 10, 12] {
            assert_eq!(
                ReplyStatus::from_icmp_error(3, code),
                Some(ReplyStatus::DestHostUnreachable),
                "code {}",
                code
            );
        }
    }

    #[test]
    fn test_unknown_unreachable_codes_default_to_net() {
        for code in [4, 6, 9, 11, 13, 200] {
            assert_eq!(
                ReplyStatus::from_icmp_error(3, code),
                Some(ReplyStatus::DestNetUnreachable),
                "code {}",
                code
            );
        }
    }

    #[test]
    fn test_time_exceeded_mapping() {
        assert_eq!(
            ReplyStatus::from_icmp_error(11, 0),
            Some(ReplyStatus::TtlExpiredInTransit)
        );
        assert_eq!(
            ReplyStatus::from_icmp_error(11, 1),
            Some(ReplyStatus::TtlExpiredReassembly)
        );
        // Unknown codes fall back to in-transit
        assert_eq!(
            ReplyStatus::from_icmp_error(11, 9),
            Some(ReplyStatus::TtlExpiredInTransit)
        );
    }

    #[test]
    fn test_param_problem_and_source_quench() {
        assert_eq!(
            ReplyStatus::from_icmp_error(12, 0),
            Some(ReplyStatus::ParamProblem)
        );
        assert_eq!(
            ReplyStatus::from_icmp_error(4, 0),
            Some(ReplyStatus::SourceQuench)
        );
    }

    #[test]
    fn test_non_error_types_unmapped() {
        assert_eq!(ReplyStatus::from_icmp_error(0, 0), None);
        assert_eq!(ReplyStatus::from_icmp_error(8, 0), None);
        assert_eq!(ReplyStatus::from_icmp_error(5, 0), None);
        assert_eq!(ReplyStatus::from_icmp_error(99, 0), None);
    }

    // ==================== code round-trip ====================

    #[test]
    fn test_status_code_roundtrip() {
        let all = [
            ReplyStatus::Success,
            ReplyStatus::TimedOut,
            ReplyStatus::DestNetUnreachable,
            ReplyStatus::DestHostUnreachable,
            ReplyStatus::DestProtocolUnreachable,
            ReplyStatus::DestPortUnreachable,
            ReplyStatus::BadRoute,
            ReplyStatus::TtlExpiredInTransit,
            ReplyStatus::TtlExpiredReassembly,
            ReplyStatus::ParamProblem,
            ReplyStatus::SourceQuench,
            ReplyStatus::GeneralFailure,
        ];
        for status in all {
            assert_eq!(ReplyStatus::from_u32(status.as_u32()), Some(status));
        }
        assert_eq!(ReplyStatus::from_u32(255), None);
    }
}
