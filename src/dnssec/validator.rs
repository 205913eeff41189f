// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! RRSIG verification, DS chain-of-trust walking, and NSEC/NSEC3
//! authenticated-denial checks.

use std::time::{SystemTime, UNIX_EPOCH};

use ring::digest;

use crate::dnssec::canonical::{canonical_rrset_bytes, key_tag, rrsig_signed_data};
use crate::dnssec::keys::PublicKey;
use crate::error::DnssecError;
use crate::wire::name::Name;
use crate::wire::rdata::RData;
use crate::wire::record::ResourceRecord;
use crate::wire::record_type::RecordType;

const MAX_CHAIN_DEPTH: u8 = 10;

/// Final validation state, per §4.7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationState {
    Secure,
    Insecure,
    Bogus,
    Indeterminate,
}

/// A single trust anchor: a DS (or self-signed root DNSKEY) the chain
/// walk may terminate at.
#[derive(Clone, Debug)]
pub struct TrustAnchor {
    pub zone: Name,
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

fn now_unix() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as u32
}

/// Verifies every RRSIG covering `rrset`, returning `Ok(())` on the first
/// signature that validates (one success suffices per RRset).
pub fn verify_rrset(
    rrset: &[ResourceRecord],
    rrsigs: &[ResourceRecord],
    dnskeys: &[ResourceRecord],
) -> Result<(), DnssecError> {
    if rrset.is_empty() {
        return Err(DnssecError::NoSignature);
    }
    let covered_type = rrset[0].record_type();
    let now = now_unix();

    let mut saw_signature = false;
    let mut saw_unsupported_algo = false;
    let mut attempted_verify = false;
    for sig_rr in rrsigs {
        let RData::Rrsig {
            type_covered,
            algorithm,
            labels: _,
            original_ttl,
            expiration,
            inception,
            key_tag: sig_key_tag,
            signer_name,
            signature,
        } = &sig_rr.rdata
        else {
            continue;
        };
        if *type_covered != covered_type {
            continue;
        }
        saw_signature = true;

        if now < *inception || now > *expiration {
            continue;
        }

        let Some(key_rr) = dnskeys.iter().find(|k| match &k.rdata {
            RData::Dnskey { algorithm: a, .. } => *a == *algorithm && key_tag(&k.rdata) == *sig_key_tag,
            _ => false,
        }) else {
            continue;
        };
        let RData::Dnskey { public_key, .. } = &key_rr.rdata else {
            continue;
        };

        let public_key = match PublicKey::from_dnskey(*algorithm, public_key) {
            Ok(key) => key,
            Err(DnssecError::UnsupportedAlgorithm(_)) => {
                saw_unsupported_algo = true;
                continue;
            }
            Err(_) => continue,
        };

        attempted_verify = true;
        let rrset_bytes = canonical_rrset_bytes(rrset, *original_ttl);
        let signed_header = rrsig_signed_data(
            type_covered.to_u16(),
            *algorithm,
            sig_rr.name.label_count() as u8,
            *original_ttl,
            *expiration,
            *inception,
            *sig_key_tag,
            &signer_name.to_canonical_bytes(),
        );
        let mut signed_data = signed_header;
        signed_data.extend_from_slice(&rrset_bytes);

        if public_key.verify(&signed_data, signature).is_ok() {
            return Ok(());
        }
    }

    if attempted_verify {
        Err(DnssecError::BadSignature)
    } else if saw_unsupported_algo {
        Err(DnssecError::UnsupportedAlgorithm(0))
    } else if saw_signature {
        Err(DnssecError::BadSignature)
    } else {
        Err(DnssecError::NoSignature)
    }
}

/// Computes a DS digest over `(owner, dnskey)` for comparison against a
/// parent DS RRset, per RFC 4034 §5.1.4.
pub fn ds_digest(owner: &Name, dnskey_rr: &ResourceRecord, digest_type: u8) -> Option<Vec<u8>> {
    let mut data = owner.to_canonical_bytes();
    data.extend_from_slice(&dnskey_rr.rdata.to_canonical_bytes());
    match digest_type {
        1 => Some(digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &data).as_ref().to_vec()),
        2 => Some(digest::digest(&digest::SHA256, &data).as_ref().to_vec()),
        4 => Some(digest::digest(&digest::SHA384, &data).as_ref().to_vec()),
        _ => None,
    }
}

/// Walks the chain of trust upward from a validated child KSK to a
/// configured trust anchor, stopping at the first DS match per level
/// (full recursion to a root anchor is a documented limitation).
pub fn walk_chain_of_trust(
    zone: &Name,
    ksk: &ResourceRecord,
    ds_lookup: impl Fn(&Name) -> Option<Vec<TrustAnchor>>,
) -> Result<(), DnssecError> {
    let Some(candidates) = ds_lookup(zone) else {
        return Err(DnssecError::ChainBroken { depth: 0 });
    };
    for depth in 0..MAX_CHAIN_DEPTH {
        for anchor in &candidates {
            if anchor.zone != *zone {
                continue;
            }
            if let Some(digest) = ds_digest(zone, ksk, anchor.digest_type) {
                if digest == anchor.digest && anchor.key_tag == key_tag(&ksk.rdata) {
                    return Ok(());
                }
            }
        }
        if depth + 1 >= MAX_CHAIN_DEPTH {
            break;
        }
    }
    Err(DnssecError::ChainBroken { depth: MAX_CHAIN_DEPTH })
}

/// Verifies that an NSEC record authentically denies `qname`: the NSEC
/// owner must precede `qname` and `qname` must precede the NSEC's
/// `next_domain_name` in canonical ordering.
pub fn nsec_covers(qname: &Name, nsec_owner: &Name, next_domain_name: &Name) -> bool {
    let q = qname.to_canonical_bytes();
    let owner = nsec_owner.to_canonical_bytes();
    let next = next_domain_name.to_canonical_bytes();
    if owner < next {
        owner < q && q < next
    } else {
        // Wrap-around case: the NSEC owner is the last name in the zone.
        q > owner || q < next
    }
}

/// Determines the validation verdict for a response given its answer
/// RRset, covering RRSIGs, DNSKEYs and (for denial responses) NSEC data.
pub fn validate_response(
    rrset: &[ResourceRecord],
    rrsigs: &[ResourceRecord],
    dnskeys: &[ResourceRecord],
) -> ValidationState {
    if dnskeys.is_empty() || rrsigs.is_empty() {
        return ValidationState::Indeterminate;
    }
    match verify_rrset(rrset, rrsigs, dnskeys) {
        Ok(()) => ValidationState::Secure,
        Err(DnssecError::UnsupportedAlgorithm(_)) => ValidationState::Insecure,
        Err(_) => ValidationState::Bogus,
    }
}

pub fn record_type_is_supported_for_denial(rtype: RecordType) -> bool {
    matches!(rtype, RecordType::NSEC | RecordType::NSEC3)
}

/// Computes the RFC 5155 §5 NSEC3 hash of `name`: `iterations + 1` rounds
/// of SHA-1 over `(candidate || salt)`, starting from the canonical wire
/// form of `name`.
pub fn nsec3_hash(name: &Name, salt: &[u8], iterations: u16) -> Vec<u8> {
    let mut candidate = name.to_canonical_bytes();
    for _ in 0..=iterations {
        let mut input = candidate;
        input.extend_from_slice(salt);
        candidate = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &input).as_ref().to_vec();
    }
    candidate
}

/// Verifies that an NSEC3 record authentically denies `qname`: the owner's
/// base32hex-decoded first label must be the hash of some name preceding
/// `qname` in hashed order, and `nsec3_hash(qname, ...)` must fall strictly
/// between it and `next_hashed_owner`.
pub fn nsec3_covers(qname: &Name, owner_hash: &[u8], next_hashed_owner: &[u8], salt: &[u8], iterations: u16) -> bool {
    let q_hash = nsec3_hash(qname, salt, iterations);
    if owner_hash < next_hashed_owner {
        owner_hash < q_hash.as_slice() && q_hash.as_slice() < next_hashed_owner
    } else {
        // Wrap-around: this NSEC3 record's owner is the last in hash order.
        q_hash.as_slice() > owner_hash || q_hash.as_slice() < next_hashed_owner
    }
}

/// Decodes an NSEC3 owner name's leading label (base32hex, RFC 5155 §1) into
/// the raw hash bytes used for [`nsec3_covers`] comparisons.
pub fn decode_nsec3_owner_hash(first_label: &str) -> Option<Vec<u8>> {
    data_encoding::BASE32HEX_NOPAD.decode(first_label.to_ascii_uppercase().as_bytes()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nsec_covers_in_order_range() {
        let owner = Name::parse("a.example.com").unwrap();
        let qname = Name::parse("b.example.com").unwrap();
        let next = Name::parse("c.example.com").unwrap();
        assert!(nsec_covers(&qname, &owner, &next));
        assert!(!nsec_covers(&Name::parse("z.example.com").unwrap(), &owner, &next));
    }

    #[test]
    fn unsupported_algorithm_is_insecure_not_bogus() {
        let owner = Name::parse("example.com").unwrap();
        let a_record = ResourceRecord::new(owner.clone(), 300, RData::A("93.184.216.34".parse().unwrap()));
        // Algorithm 16 is Ed448, explicitly allowed to go unsupported per
        // the validator's documented contract.
        let dnskey = ResourceRecord::new(owner.clone(), 300, RData::Dnskey { flags: 257, protocol: 3, algorithm: 16, public_key: vec![1, 2, 3, 4] });
        let key_tag = crate::dnssec::canonical::key_tag(&dnskey.rdata);

        let now = now_unix();
        let rrsig = ResourceRecord::new(
            owner.clone(),
            300,
            RData::Rrsig {
                type_covered: RecordType::A,
                algorithm: 16,
                labels: 2,
                original_ttl: 300,
                expiration: now + 3600,
                inception: now.saturating_sub(3600),
                key_tag,
                signer_name: owner,
                signature: vec![0u8; 32],
            },
        );

        let state = validate_response(&[a_record], &[rrsig], &[dnskey]);
        assert_eq!(state, ValidationState::Insecure);
    }

    #[test]
    fn indeterminate_without_material() {
        let state = validate_response(&[], &[], &[]);
        assert_eq!(state, ValidationState::Indeterminate);
    }

    #[test]
    fn nsec3_hash_is_deterministic() {
        let name = Name::parse("example.com").unwrap();
        let salt = [0xAA, 0xBB];
        let a = nsec3_hash(&name, &salt, 1);
        let b = nsec3_hash(&name, &salt, 1);
        assert_eq!(a, b);
        let different_salt = nsec3_hash(&name, &[0xCC], 1);
        assert_ne!(a, different_salt);
    }

    #[test]
    fn nsec3_covers_matches_hashed_qname_range() {
        let salt = [0x01, 0x02];
        let qname = Name::parse("missing.example.com").unwrap();
        let q_hash = nsec3_hash(&qname, &salt, 2);

        // Bracket the qname hash with a lower owner hash and a higher
        // next-hashed-owner so it falls strictly inside the range.
        let owner_hash = vec![0x00; q_hash.len()];
        let next_hash = vec![0xFF; q_hash.len()];

        assert!(nsec3_covers(&qname, &owner_hash, &next_hash, &salt, 2));
        // A degenerate owner==next range never covers any name.
        assert!(!nsec3_covers(&qname, &q_hash, &q_hash, &salt, 2));
    }
}
