// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! RR type numbers, including the DNSSEC types and the AXFR/IXFR
//! pseudo-types used only in the question section.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    SRV,
    NAPTR,
    AAAA,
    SSHFP,
    TLSA,
    SVCB,
    HTTPS,
    CAA,
    DS,
    DNSKEY,
    RRSIG,
    NSEC,
    NSEC3,
    NSEC3PARAM,
    OPT,
    IXFR,
    AXFR,
    ANY,
    Unknown(u16),
}

impl RecordType {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::A => 1,
            Self::NS => 2,
            Self::CNAME => 5,
            Self::SOA => 6,
            Self::PTR => 12,
            Self::MX => 15,
            Self::TXT => 16,
            Self::SRV => 33,
            Self::NAPTR => 35,
            Self::AAAA => 28,
            Self::OPT => 41,
            Self::DS => 43,
            Self::SSHFP => 44,
            Self::RRSIG => 46,
            Self::NSEC => 47,
            Self::DNSKEY => 48,
            Self::NSEC3 => 50,
            Self::NSEC3PARAM => 51,
            Self::TLSA => 52,
            Self::SVCB => 64,
            Self::HTTPS => 65,
            Self::CAA => 257,
            Self::IXFR => 251,
            Self::AXFR => 252,
            Self::ANY => 255,
            Self::Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::A,
            2 => Self::NS,
            5 => Self::CNAME,
            6 => Self::SOA,
            12 => Self::PTR,
            15 => Self::MX,
            16 => Self::TXT,
            33 => Self::SRV,
            35 => Self::NAPTR,
            28 => Self::AAAA,
            41 => Self::OPT,
            43 => Self::DS,
            44 => Self::SSHFP,
            46 => Self::RRSIG,
            47 => Self::NSEC,
            48 => Self::DNSKEY,
            50 => Self::NSEC3,
            51 => Self::NSEC3PARAM,
            52 => Self::TLSA,
            64 => Self::SVCB,
            65 => Self::HTTPS,
            257 => Self::CAA,
            251 => Self::IXFR,
            252 => Self::AXFR,
            255 => Self::ANY,
            other => Self::Unknown(other),
        }
    }

    /// Whether this type carries DNSSEC signing material, used by the
    /// canonicalisation step to decide whether RRSIGs cover it.
    pub fn is_dnssec(self) -> bool {
        matches!(
            self,
            Self::DS | Self::DNSKEY | Self::RRSIG | Self::NSEC | Self::NSEC3 | Self::NSEC3PARAM
        )
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(v) => write!(f, "TYPE{v}"),
            other => write!(f, "{other:?}"),
        }
    }
}
