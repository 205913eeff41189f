// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Parses raw DNSKEY public-key material into the form `ring`'s signature
//! verifiers expect. Kept as a dedicated module so [`super::validator`]
//! only ever consumes already-validated public-key objects.

use ring::signature::{
    UnparsedPublicKey, ECDSA_P256_SHA256_FIXED, ECDSA_P384_SHA384_FIXED, ED25519, RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
    RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_2048_8192_SHA512,
};

use crate::error::DnssecError;

/// Supported DNSSEC algorithm numbers (RFC 8624 / IANA registry).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    RsaSha1,
    RsaSha256,
    RsaSha512,
    EcdsaP256Sha256,
    EcdsaP384Sha384,
    Ed25519,
}

impl Algorithm {
    pub fn from_u8(v: u8) -> Result<Self, DnssecError> {
        match v {
            5 | 7 => Ok(Self::RsaSha1),
            8 => Ok(Self::RsaSha256),
            10 => Ok(Self::RsaSha512),
            13 => Ok(Self::EcdsaP256Sha256),
            14 => Ok(Self::EcdsaP384Sha384),
            15 => Ok(Self::Ed25519),
            // Ed448 (16) and anything else: insecure-algo, not bogus.
            other => Err(DnssecError::UnsupportedAlgorithm(other)),
        }
    }
}

/// A DNSKEY's public key, parsed into a form `ring` can verify against.
pub struct PublicKey {
    algorithm: Algorithm,
    key_bytes: Vec<u8>,
}

impl PublicKey {
    /// Builds a verifier-ready key from raw DNSKEY RDATA public-key bytes.
    /// RSA keys use the exponent/modulus encoding of RFC 3110; EC/Ed25519
    /// keys are the raw point/scalar encoding used directly on the wire.
    pub fn from_dnskey(algorithm: u8, raw_public_key: &[u8]) -> Result<Self, DnssecError> {
        let algorithm = Algorithm::from_u8(algorithm)?;
        let key_bytes = match algorithm {
            Algorithm::RsaSha1 | Algorithm::RsaSha256 | Algorithm::RsaSha512 => {
                rsa_der_from_rfc3110(raw_public_key)?
            }
            Algorithm::EcdsaP256Sha256 => uncompressed_point(raw_public_key, 32),
            Algorithm::EcdsaP384Sha384 => uncompressed_point(raw_public_key, 48),
            Algorithm::Ed25519 => raw_public_key.to_vec(),
        };
        Ok(Self { algorithm, key_bytes })
    }

    /// Verifies `signature` over `signed_data` using this key.
    pub fn verify(&self, signed_data: &[u8], signature: &[u8]) -> Result<(), DnssecError> {
        let result = match self.algorithm {
            Algorithm::RsaSha1 => {
                UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY, &self.key_bytes)
                    .verify(signed_data, signature)
            }
            Algorithm::RsaSha256 => {
                UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, &self.key_bytes).verify(signed_data, signature)
            }
            Algorithm::RsaSha512 => {
                UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA512, &self.key_bytes).verify(signed_data, signature)
            }
            Algorithm::EcdsaP256Sha256 => {
                UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, &self.key_bytes).verify(signed_data, signature)
            }
            Algorithm::EcdsaP384Sha384 => {
                UnparsedPublicKey::new(&ECDSA_P384_SHA384_FIXED, &self.key_bytes).verify(signed_data, signature)
            }
            Algorithm::Ed25519 => UnparsedPublicKey::new(&ED25519, &self.key_bytes).verify(signed_data, signature),
        };
        result.map_err(|_| DnssecError::BadSignature)
    }
}

/// Parses the RFC 3110 wire form (`[exp_len][exponent][modulus]`, with a
/// 2-byte exponent length when it exceeds 255) and re-encodes it as a
/// minimal DER `RSAPublicKey ::= SEQUENCE { modulus, publicExponent }`,
/// the form `ring`'s RSA verifiers expect.
fn rsa_der_from_rfc3110(raw: &[u8]) -> Result<Vec<u8>, DnssecError> {
    if raw.is_empty() {
        return Err(DnssecError::BadSignature);
    }
    let (exp_len, exp_start) = if raw[0] == 0 {
        if raw.len() < 3 {
            return Err(DnssecError::BadSignature);
        }
        (u16::from_be_bytes([raw[1], raw[2]]) as usize, 3)
    } else {
        (raw[0] as usize, 1)
    };
    let exponent = raw.get(exp_start..exp_start + exp_len).ok_or(DnssecError::BadSignature)?;
    let modulus = raw.get(exp_start + exp_len..).ok_or(DnssecError::BadSignature)?;

    let mut der = Vec::new();
    let mut body = Vec::new();
    body.extend(der_integer(modulus));
    body.extend(der_integer(exponent));
    der.push(0x30); // SEQUENCE
    der.extend(der_length(body.len()));
    der.extend(body);
    Ok(der)
}

fn der_integer(value: &[u8]) -> Vec<u8> {
    let mut trimmed = value;
    while trimmed.len() > 1 && trimmed[0] == 0 {
        trimmed = &trimmed[1..];
    }
    let needs_pad = !trimmed.is_empty() && trimmed[0] & 0x80 != 0;
    let mut content = Vec::with_capacity(trimmed.len() + needs_pad as usize);
    if needs_pad {
        content.push(0);
    }
    content.extend_from_slice(trimmed);

    let mut out = vec![0x02]; // INTEGER
    out.extend(der_length(content.len()));
    out.extend(content);
    out
}

fn der_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let bytes = len.to_be_bytes();
        let significant: Vec<u8> = bytes.iter().copied().skip_while(|&b| b == 0).collect();
        let mut out = vec![0x80 | significant.len() as u8];
        out.extend(significant);
        out
    }
}

fn uncompressed_point(raw: &[u8], coord_len: usize) -> Vec<u8> {
    // DNSKEY stores the concatenated X||Y coordinates without the 0x04
    // prefix SEC1 uses for uncompressed points; `ring` needs that prefix.
    let mut out = Vec::with_capacity(1 + coord_len * 2);
    out.push(0x04);
    out.extend_from_slice(&raw[..(coord_len * 2).min(raw.len())]);
    out
}
