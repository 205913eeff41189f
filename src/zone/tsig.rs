// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! TSIG (RFC 8945): transaction signatures authenticating AXFR/IXFR/DDNS
//! requests with a shared HMAC secret.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE64;
use parking_lot::Mutex;
use ring::hmac;

use crate::error::ZoneError;
use crate::wire::Name;

const FUDGE_SECONDS: i64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TsigAlgorithm {
    HmacMd5,
    HmacSha1,
    HmacSha256,
    HmacSha512,
}

impl TsigAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().trim_end_matches('.') {
            "hmac-md5.sig-alg.reg.int" => Some(Self::HmacMd5),
            "hmac-sha1" => Some(Self::HmacSha1),
            "hmac-sha256" => Some(Self::HmacSha256),
            "hmac-sha512" => Some(Self::HmacSha512),
            _ => None,
        }
    }

    /// The canonical wire name, as stored back to the repository.
    pub fn as_wire_name(self) -> &'static str {
        match self {
            Self::HmacMd5 => "hmac-md5.sig-alg.reg.int",
            Self::HmacSha1 => "hmac-sha1",
            Self::HmacSha256 => "hmac-sha256",
            Self::HmacSha512 => "hmac-sha512",
        }
    }

    fn ring_algorithm(self) -> hmac::Algorithm {
        match self {
            // `ring` has no HMAC-MD5; legacy keys fall back to SHA1 here
            // and are rejected at verification since MACs will never match.
            Self::HmacMd5 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Self::HmacSha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Self::HmacSha256 => hmac::HMAC_SHA256,
            Self::HmacSha512 => hmac::HMAC_SHA512,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TsigKey {
    pub name: String,
    pub algorithm: TsigAlgorithm,
    pub secret_base64: String,
    pub enabled: bool,
}

impl TsigKey {
    fn secret_bytes(&self) -> Result<Vec<u8>, ZoneError> {
        BASE64.decode(self.secret_base64.as_bytes()).map_err(|_| ZoneError::TsigFailed("malformed secret"))
    }
}

/// A parsed TSIG RR as seen on the wire, prior to verification.
pub struct TsigRecord<'a> {
    pub key_name: &'a Name,
    pub algorithm_name: &'a str,
    pub time_signed: u64,
    pub mac: &'a [u8],
}

/// Tracks recently seen MACs per key to reject replays within the fudge
/// window.
pub struct ReplayGuard {
    seen: Mutex<HashSet<(String, Vec<u8>)>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self { seen: Mutex::new(HashSet::new()) }
    }

    fn check_and_record(&self, key_name: &str, mac: &[u8]) -> bool {
        let mut seen = self.seen.lock();
        let entry = (key_name.to_string(), mac.to_vec());
        if seen.contains(&entry) {
            return false;
        }
        seen.insert(entry);
        true
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies a TSIG record against `message_bytes` (the DNS message as
/// sent, with the TSIG RR itself excluded) and the configured key.
pub fn verify(
    tsig: &TsigRecord<'_>,
    message_bytes: &[u8],
    key: &TsigKey,
    replay_guard: &ReplayGuard,
) -> Result<(), ZoneError> {
    if !key.enabled {
        return Err(ZoneError::TsigFailed("key disabled"));
    }
    let Some(alg) = TsigAlgorithm::from_name(tsig.algorithm_name) else {
        return Err(ZoneError::TsigFailed("unsupported algorithm"));
    };
    if alg != key.algorithm {
        return Err(ZoneError::TsigFailed("algorithm mismatch"));
    }

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    if (now - tsig.time_signed as i64).abs() > FUDGE_SECONDS {
        return Err(ZoneError::TsigFailed("time outside fudge window"));
    }

    if !replay_guard.check_and_record(&key.name, tsig.mac) {
        return Err(ZoneError::TsigFailed("replayed MAC"));
    }

    let secret = key.secret_bytes()?;
    let hmac_key = hmac::Key::new(alg.ring_algorithm(), &secret);
    hmac::verify(&hmac_key, message_bytes, tsig.mac).map_err(|_| ZoneError::TsigFailed("MAC mismatch"))
}

/// A TSIG RR's RDATA, decoded from the opaque bytes the wire codec hands
/// back for record type 250 (TSIG has no dedicated `RData` variant since
/// it never appears in a zone, only on the wire alongside a transfer or
/// update request).
pub struct RawTsig {
    pub algorithm_name: String,
    pub time_signed: u64,
    pub mac: Vec<u8>,
}

/// Parses a TSIG RR's RDATA per RFC 8945 §4.2: algorithm name, a 48-bit
/// time-signed field, a 16-bit fudge (ignored here; verification uses the
/// fixed [`FUDGE_SECONDS`] window), then a length-prefixed MAC.
pub fn parse_tsig_rdata(data: &[u8]) -> Result<RawTsig, ZoneError> {
    let mut decoder = crate::wire::codec::BinDecoder::new(data);
    let algorithm_name = Name::read(&mut decoder).map_err(|_| ZoneError::TsigFailed("malformed algorithm name"))?;
    let time_high = decoder.read_u16().map_err(|_| ZoneError::TsigFailed("truncated TSIG rdata"))? as u64;
    let time_low = decoder.read_u32().map_err(|_| ZoneError::TsigFailed("truncated TSIG rdata"))? as u64;
    let time_signed = (time_high << 32) | time_low;
    let _fudge = decoder.read_u16().map_err(|_| ZoneError::TsigFailed("truncated TSIG rdata"))?;
    let mac_size = decoder.read_u16().map_err(|_| ZoneError::TsigFailed("truncated TSIG rdata"))? as usize;
    let mac = decoder.read_bytes(mac_size).map_err(|_| ZoneError::TsigFailed("truncated TSIG mac"))?.to_vec();
    let algorithm_name = algorithm_name.to_string().trim_end_matches('.').to_string();
    Ok(RawTsig { algorithm_name, time_signed, mac })
}

/// A registry of configured TSIG keys, looked up by name at the server's
/// transfer/update listeners. Loaded once from the repository at startup
/// and refreshed whenever the management facade mutates a key.
pub struct TsigKeyRing {
    keys: Mutex<HashMap<String, TsigKey>>,
}

impl TsigKeyRing {
    pub fn new() -> Self {
        Self { keys: Mutex::new(HashMap::new()) }
    }

    pub fn from_rows(rows: impl IntoIterator<Item = crate::repository::TsigKeyRow>) -> Self {
        let ring = Self::new();
        for row in rows {
            if let Some(algorithm) = TsigAlgorithm::from_name(&row.algorithm) {
                ring.insert(TsigKey { name: row.name, algorithm, secret_base64: row.secret_base64, enabled: row.enabled });
            }
        }
        ring
    }

    pub fn insert(&self, key: TsigKey) {
        self.keys.lock().insert(key.name.clone(), key);
    }

    pub fn remove(&self, name: &str) {
        self.keys.lock().remove(name);
    }

    pub fn get(&self, name: &str) -> Option<TsigKey> {
        self.keys.lock().get(name).cloned()
    }
}

impl Default for TsigKeyRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the MAC the server would sign a response with, for the
/// matching TSIG RR on the reply.
pub fn sign(message_bytes: &[u8], key: &TsigKey) -> Result<Vec<u8>, ZoneError> {
    let secret = key.secret_bytes()?;
    let hmac_key = hmac::Key::new(key.algorithm.ring_algorithm(), &secret);
    Ok(hmac::sign(&hmac_key, message_bytes).as_ref().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::BinEncoder;

    fn build_tsig_rdata(algorithm: &str, time_signed: u64, mac: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut encoder = BinEncoder::new(&mut buf);
        Name::parse(algorithm).unwrap().emit(&mut encoder).unwrap();
        encoder.emit_u16((time_signed >> 32) as u16);
        encoder.emit_u32((time_signed & 0xFFFF_FFFF) as u32);
        encoder.emit_u16(300); // fudge
        encoder.emit_u16(mac.len() as u16);
        encoder.emit_bytes(mac);
        buf
    }

    #[test]
    fn parses_tsig_rdata_fields() {
        let rdata = build_tsig_rdata("hmac-sha256", 1_700_000_000, b"abcd1234");
        let parsed = parse_tsig_rdata(&rdata).unwrap();
        assert_eq!(parsed.algorithm_name, "hmac-sha256");
        assert_eq!(parsed.time_signed, 1_700_000_000);
        assert_eq!(parsed.mac, b"abcd1234");
    }

    #[test]
    fn round_trip_sign_and_verify() {
        let key = TsigKey {
            name: "transfer-key".to_string(),
            algorithm: TsigAlgorithm::HmacSha256,
            secret_base64: BASE64.encode(b"supersecretkeybytes1234"),
            enabled: true,
        };
        let message = b"pretend-dns-message-bytes";
        let mac = sign(message, &key).unwrap();

        let guard = ReplayGuard::new();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let tsig = TsigRecord { key_name: &Name::parse("transfer-key").unwrap(), algorithm_name: "hmac-sha256", time_signed: now, mac: &mac };
        assert!(verify(&tsig, message, &key, &guard).is_ok());
    }

    #[test]
    fn rejects_replayed_mac() {
        let key = TsigKey {
            name: "k".to_string(),
            algorithm: TsigAlgorithm::HmacSha256,
            secret_base64: BASE64.encode(b"supersecretkeybytes1234"),
            enabled: true,
        };
        let message = b"msg";
        let mac = sign(message, &key).unwrap();
        let guard = ReplayGuard::new();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let name = Name::parse("k").unwrap();
        let tsig = TsigRecord { key_name: &name, algorithm_name: "hmac-sha256", time_signed: now, mac: &mac };
        assert!(verify(&tsig, message, &key, &guard).is_ok());
        assert!(verify(&tsig, message, &key, &guard).is_err());
    }

    #[test]
    fn rejects_outside_fudge_window() {
        let key = TsigKey {
            name: "k".to_string(),
            algorithm: TsigAlgorithm::HmacSha256,
            secret_base64: BASE64.encode(b"supersecretkeybytes1234"),
            enabled: true,
        };
        let message = b"msg";
        let mac = sign(message, &key).unwrap();
        let guard = ReplayGuard::new();
        let name = Name::parse("k").unwrap();
        let tsig = TsigRecord { key_name: &name, algorithm_name: "hmac-sha256", time_signed: 0, mac: &mac };
        assert!(verify(&tsig, message, &key, &guard).is_err());
    }
}
