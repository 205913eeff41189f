// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Canonical RRset assembly for RRSIG verification (RFC 4034 §6).

use crate::wire::rdata::RData;
use crate::wire::record::ResourceRecord;

/// Builds the canonical wire form of an RRset covered by `rrsig`: owner
/// name lower-cased (already guaranteed), TTL replaced by the RRSIG's
/// Original TTL, RRs sorted by canonical RDATA byte order, concatenated.
pub fn canonical_rrset_bytes(records: &[ResourceRecord], original_ttl: u32) -> Vec<u8> {
    let mut canon: Vec<Vec<u8>> = records.iter().map(|r| r.to_canonical_bytes(original_ttl)).collect();
    canon.sort();
    canon.concat()
}

/// The portion of an RRSIG's RDATA that is itself covered by the
/// signature: every field up to, but excluding, the signature bytes.
pub fn rrsig_signed_data(
    type_covered: u16,
    algorithm: u8,
    labels: u8,
    original_ttl: u32,
    expiration: u32,
    inception: u32,
    key_tag: u16,
    signer_name_canonical: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(18 + signer_name_canonical.len());
    out.extend_from_slice(&type_covered.to_be_bytes());
    out.push(algorithm);
    out.push(labels);
    out.extend_from_slice(&original_ttl.to_be_bytes());
    out.extend_from_slice(&expiration.to_be_bytes());
    out.extend_from_slice(&inception.to_be_bytes());
    out.extend_from_slice(&key_tag.to_be_bytes());
    out.extend_from_slice(signer_name_canonical);
    out
}

/// Computes the DNSKEY key tag per RFC 4034 Appendix B.
pub fn key_tag(dnskey_rdata: &RData) -> u16 {
    let RData::Dnskey { flags, protocol, algorithm, public_key } = dnskey_rdata else {
        return 0;
    };
    let mut bytes = Vec::with_capacity(4 + public_key.len());
    bytes.extend_from_slice(&flags.to_be_bytes());
    bytes.push(*protocol);
    bytes.push(*algorithm);
    bytes.extend_from_slice(public_key);

    if *algorithm == 1 {
        // RSA/MD5 uses the last two octets of the public key directly.
        let len = bytes.len();
        return u16::from_be_bytes([bytes[len - 2], bytes[len - 1]]);
    }

    let mut acc: u32 = 0;
    for (i, b) in bytes.iter().enumerate() {
        if i % 2 == 0 {
            acc += (*b as u32) << 8;
        } else {
            acc += *b as u32;
        }
    }
    acc += (acc >> 16) & 0xFFFF;
    (acc & 0xFFFF) as u16
}
