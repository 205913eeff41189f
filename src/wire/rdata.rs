// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! RDATA schemas for every RR type required by the codec contract.
//!
//! Unknown/unsupported types are kept as opaque `Unknown` RDATA carrying
//! the original type number, per the decoder's tolerance requirement.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::CodecError;
use crate::wire::codec::{BinDecoder, BinEncoder};
use crate::wire::name::Name;
use crate::wire::record_type::RecordType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SvcParam {
    pub key: u16,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Mx { preference: u16, exchange: Name },
    Txt(Vec<Vec<u8>>),
    Soa(Soa),
    Srv { priority: u16, weight: u16, port: u16, target: Name },
    Naptr { order: u16, preference: u16, flags: Vec<u8>, services: Vec<u8>, regexp: Vec<u8>, replacement: Name },
    Caa { flags: u8, tag: Vec<u8>, value: Vec<u8> },
    Sshfp { algorithm: u8, fp_type: u8, fingerprint: Vec<u8> },
    Tlsa { usage: u8, selector: u8, matching_type: u8, data: Vec<u8> },
    SvcbOrHttps { priority: u16, target: Name, params: Vec<SvcParam> },
    Dnskey { flags: u16, protocol: u8, algorithm: u8, public_key: Vec<u8> },
    Rrsig {
        type_covered: RecordType,
        algorithm: u8,
        labels: u8,
        original_ttl: u32,
        expiration: u32,
        inception: u32,
        key_tag: u16,
        signer_name: Name,
        signature: Vec<u8>,
    },
    Ds { key_tag: u16, algorithm: u8, digest_type: u8, digest: Vec<u8> },
    Nsec { next_domain_name: Name, type_bit_maps: Vec<u8> },
    Nsec3 {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
        next_hashed_owner: Vec<u8>,
        type_bit_maps: Vec<u8>,
    },
    Unknown { rtype: u16, data: Vec<u8> },
}

impl RData {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::A(_) => RecordType::A,
            Self::Aaaa(_) => RecordType::AAAA,
            Self::Ns(_) => RecordType::NS,
            Self::Cname(_) => RecordType::CNAME,
            Self::Ptr(_) => RecordType::PTR,
            Self::Mx { .. } => RecordType::MX,
            Self::Txt(_) => RecordType::TXT,
            Self::Soa(_) => RecordType::SOA,
            Self::Srv { .. } => RecordType::SRV,
            Self::Naptr { .. } => RecordType::NAPTR,
            Self::Caa { .. } => RecordType::CAA,
            Self::Sshfp { .. } => RecordType::SSHFP,
            Self::Tlsa { .. } => RecordType::TLSA,
            Self::SvcbOrHttps { .. } => RecordType::SVCB,
            Self::Dnskey { .. } => RecordType::DNSKEY,
            Self::Rrsig { .. } => RecordType::RRSIG,
            Self::Ds { .. } => RecordType::DS,
            Self::Nsec { .. } => RecordType::NSEC,
            Self::Nsec3 { .. } => RecordType::NSEC3,
            Self::Unknown { rtype, .. } => RecordType::from_u16(*rtype),
        }
    }

    pub fn read(
        decoder: &mut BinDecoder<'_>,
        rtype: RecordType,
        rdlength: usize,
    ) -> Result<Self, CodecError> {
        let rdata_start = decoder.position();
        // RFC 2136 prerequisite and deletion RRs carry RDLENGTH 0
        // regardless of TYPE (the value-independent forms); no per-type
        // schema applies, so short-circuit before the normal dispatch.
        if rdlength == 0 {
            return Ok(Self::Unknown { rtype: rtype.to_u16(), data: Vec::new() });
        }

        let rdata = match rtype {
            RecordType::A => {
                let bytes = decoder.read_bytes(4)?;
                Self::A(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
            }
            RecordType::AAAA => {
                let bytes = decoder.read_bytes(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                Self::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::NS => Self::Ns(Name::read(decoder)?),
            RecordType::CNAME => Self::Cname(Name::read(decoder)?),
            RecordType::PTR => Self::Ptr(Name::read(decoder)?),
            RecordType::MX => {
                let preference = decoder.read_u16()?;
                let exchange = Name::read(decoder)?;
                Self::Mx { preference, exchange }
            }
            RecordType::TXT => {
                let mut strings = Vec::new();
                let end = rdata_start + rdlength;
                while decoder.position() < end {
                    strings.push(decoder.read_character_string()?);
                }
                if strings.is_empty() {
                    strings.push(Vec::new());
                }
                Self::Txt(strings)
            }
            RecordType::SOA => {
                let mname = Name::read(decoder)?;
                let rname = Name::read(decoder)?;
                Self::Soa(Soa {
                    mname,
                    rname,
                    serial: decoder.read_u32()?,
                    refresh: decoder.read_u32()?,
                    retry: decoder.read_u32()?,
                    expire: decoder.read_u32()?,
                    minimum: decoder.read_u32()?,
                })
            }
            RecordType::SRV => Self::Srv {
                priority: decoder.read_u16()?,
                weight: decoder.read_u16()?,
                port: decoder.read_u16()?,
                target: Name::read(decoder)?,
            },
            RecordType::NAPTR => {
                let order = decoder.read_u16()?;
                let preference = decoder.read_u16()?;
                let flags = decoder.read_character_string()?;
                let services = decoder.read_character_string()?;
                let regexp = decoder.read_character_string()?;
                let replacement = Name::read(decoder)?;
                Self::Naptr { order, preference, flags, services, regexp, replacement }
            }
            RecordType::CAA => {
                let flags = decoder.read_u8()?;
                let tag = decoder.read_character_string()?;
                let remaining = rdata_start + rdlength - decoder.position();
                let value = decoder.read_bytes(remaining)?.to_vec();
                Self::Caa { flags, tag, value }
            }
            RecordType::SSHFP => {
                let algorithm = decoder.read_u8()?;
                let fp_type = decoder.read_u8()?;
                let remaining = rdata_start + rdlength - decoder.position();
                let fingerprint = decoder.read_bytes(remaining)?.to_vec();
                Self::Sshfp { algorithm, fp_type, fingerprint }
            }
            RecordType::TLSA => {
                let usage = decoder.read_u8()?;
                let selector = decoder.read_u8()?;
                let matching_type = decoder.read_u8()?;
                let remaining = rdata_start + rdlength - decoder.position();
                let data = decoder.read_bytes(remaining)?.to_vec();
                Self::Tlsa { usage, selector, matching_type, data }
            }
            RecordType::SVCB | RecordType::HTTPS => {
                let priority = decoder.read_u16()?;
                let target = Name::read(decoder)?;
                let mut params = Vec::new();
                let end = rdata_start + rdlength;
                while decoder.position() < end {
                    let key = decoder.read_u16()?;
                    let len = decoder.read_u16()? as usize;
                    let value = decoder.read_bytes(len)?.to_vec();
                    params.push(SvcParam { key, value });
                }
                Self::SvcbOrHttps { priority, target, params }
            }
            RecordType::DNSKEY => {
                let flags = decoder.read_u16()?;
                let protocol = decoder.read_u8()?;
                let algorithm = decoder.read_u8()?;
                let remaining = rdata_start + rdlength - decoder.position();
                let public_key = decoder.read_bytes(remaining)?.to_vec();
                Self::Dnskey { flags, protocol, algorithm, public_key }
            }
            RecordType::RRSIG => {
                let type_covered = RecordType::from_u16(decoder.read_u16()?);
                let algorithm = decoder.read_u8()?;
                let labels = decoder.read_u8()?;
                let original_ttl = decoder.read_u32()?;
                let expiration = decoder.read_u32()?;
                let inception = decoder.read_u32()?;
                let key_tag = decoder.read_u16()?;
                let signer_name = Name::read(decoder)?;
                let remaining = rdata_start + rdlength - decoder.position();
                let signature = decoder.read_bytes(remaining)?.to_vec();
                Self::Rrsig {
                    type_covered,
                    algorithm,
                    labels,
                    original_ttl,
                    expiration,
                    inception,
                    key_tag,
                    signer_name,
                    signature,
                }
            }
            RecordType::DS => {
                let key_tag = decoder.read_u16()?;
                let algorithm = decoder.read_u8()?;
                let digest_type = decoder.read_u8()?;
                let remaining = rdata_start + rdlength - decoder.position();
                let digest = decoder.read_bytes(remaining)?.to_vec();
                Self::Ds { key_tag, algorithm, digest_type, digest }
            }
            RecordType::NSEC => {
                let next_domain_name = Name::read(decoder)?;
                let remaining = rdata_start + rdlength - decoder.position();
                let type_bit_maps = decoder.read_bytes(remaining)?.to_vec();
                Self::Nsec { next_domain_name, type_bit_maps }
            }
            RecordType::NSEC3 => {
                let hash_algorithm = decoder.read_u8()?;
                let flags = decoder.read_u8()?;
                let iterations = decoder.read_u16()?;
                let salt_len = decoder.read_u8()? as usize;
                let salt = decoder.read_bytes(salt_len)?.to_vec();
                let hash_len = decoder.read_u8()? as usize;
                let next_hashed_owner = decoder.read_bytes(hash_len)?.to_vec();
                let remaining = rdata_start + rdlength - decoder.position();
                let type_bit_maps = decoder.read_bytes(remaining)?.to_vec();
                Self::Nsec3 {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                    next_hashed_owner,
                    type_bit_maps,
                }
            }
            _ => {
                let data = decoder.read_bytes(rdlength)?.to_vec();
                Self::Unknown { rtype: rtype.to_u16(), data }
            }
        };
        Ok(rdata)
    }

    /// Emits RDATA without name compression (used for canonical/DNSSEC
    /// hashing and for AXFR/IXFR streaming where compression is undesirable).
    pub fn emit_uncompressed(&self, encoder: &mut BinEncoder) -> Result<(), CodecError> {
        match self {
            Self::A(addr) => encoder.emit_bytes(&addr.octets()),
            Self::Aaaa(addr) => encoder.emit_bytes(&addr.octets()),
            Self::Ns(n) | Self::Cname(n) | Self::Ptr(n) => n.emit(encoder)?,
            Self::Mx { preference, exchange } => {
                encoder.emit_u16(*preference);
                exchange.emit(encoder)?;
            }
            Self::Txt(strings) => {
                for s in strings {
                    encoder.emit_character_string(s)?;
                }
            }
            Self::Soa(soa) => {
                soa.mname.emit(encoder)?;
                soa.rname.emit(encoder)?;
                encoder.emit_u32(soa.serial);
                encoder.emit_u32(soa.refresh);
                encoder.emit_u32(soa.retry);
                encoder.emit_u32(soa.expire);
                encoder.emit_u32(soa.minimum);
            }
            Self::Srv { priority, weight, port, target } => {
                encoder.emit_u16(*priority);
                encoder.emit_u16(*weight);
                encoder.emit_u16(*port);
                target.emit(encoder)?;
            }
            Self::Naptr { order, preference, flags, services, regexp, replacement } => {
                encoder.emit_u16(*order);
                encoder.emit_u16(*preference);
                encoder.emit_character_string(flags)?;
                encoder.emit_character_string(services)?;
                encoder.emit_character_string(regexp)?;
                replacement.emit(encoder)?;
            }
            Self::Caa { flags, tag, value } => {
                encoder.emit_u8(*flags);
                encoder.emit_character_string(tag)?;
                encoder.emit_bytes(value);
            }
            Self::Sshfp { algorithm, fp_type, fingerprint } => {
                encoder.emit_u8(*algorithm);
                encoder.emit_u8(*fp_type);
                encoder.emit_bytes(fingerprint);
            }
            Self::Tlsa { usage, selector, matching_type, data } => {
                encoder.emit_u8(*usage);
                encoder.emit_u8(*selector);
                encoder.emit_u8(*matching_type);
                encoder.emit_bytes(data);
            }
            Self::SvcbOrHttps { priority, target, params } => {
                encoder.emit_u16(*priority);
                target.emit(encoder)?;
                for p in params {
                    encoder.emit_u16(p.key);
                    encoder.emit_u16(p.value.len() as u16);
                    encoder.emit_bytes(&p.value);
                }
            }
            Self::Dnskey { flags, protocol, algorithm, public_key } => {
                encoder.emit_u16(*flags);
                encoder.emit_u8(*protocol);
                encoder.emit_u8(*algorithm);
                encoder.emit_bytes(public_key);
            }
            Self::Rrsig {
                type_covered,
                algorithm,
                labels,
                original_ttl,
                expiration,
                inception,
                key_tag,
                signer_name,
                signature,
            } => {
                encoder.emit_u16(type_covered.to_u16());
                encoder.emit_u8(*algorithm);
                encoder.emit_u8(*labels);
                encoder.emit_u32(*original_ttl);
                encoder.emit_u32(*expiration);
                encoder.emit_u32(*inception);
                encoder.emit_u16(*key_tag);
                signer_name.emit(encoder)?;
                encoder.emit_bytes(signature);
            }
            Self::Ds { key_tag, algorithm, digest_type, digest } => {
                encoder.emit_u16(*key_tag);
                encoder.emit_u8(*algorithm);
                encoder.emit_u8(*digest_type);
                encoder.emit_bytes(digest);
            }
            Self::Nsec { next_domain_name, type_bit_maps } => {
                next_domain_name.emit(encoder)?;
                encoder.emit_bytes(type_bit_maps);
            }
            Self::Nsec3 {
                hash_algorithm,
                flags,
                iterations,
                salt,
                next_hashed_owner,
                type_bit_maps,
            } => {
                encoder.emit_u8(*hash_algorithm);
                encoder.emit_u8(*flags);
                encoder.emit_u16(*iterations);
                encoder.emit_u8(salt.len() as u8);
                encoder.emit_bytes(salt);
                encoder.emit_u8(next_hashed_owner.len() as u8);
                encoder.emit_bytes(next_hashed_owner);
                encoder.emit_bytes(type_bit_maps);
            }
            Self::Unknown { data, .. } => encoder.emit_bytes(data),
        }
        Ok(())
    }

    /// Canonical RDATA bytes for DNSSEC RRset ordering/hashing: names inside
    /// RDATA are lower-cased and never compressed (already guaranteed for
    /// `Name`, since it stores canonical form).
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut encoder = BinEncoder::new(&mut buf);
        // Canonical emission never compresses names; reuse the uncompressed
        // path, which never calls `emit_name_compressed`.
        let _ = self.emit_uncompressed(&mut encoder);
        buf
    }
}
