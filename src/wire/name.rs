// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Domain name representation, canonicalisation and wire-format codec
//! (including 14-bit compression pointers).

use std::fmt;

use crate::error::CodecError;
use crate::wire::codec::{BinDecoder, BinEncoder};

const MAX_NAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;
/// Top two bits of a length byte mark a compression pointer.
const POINTER_MASK: u8 = 0b1100_0000;

/// A domain name, stored canonicalised: lower-cased labels, no trailing dot.
///
/// Equality and ordering operate on the canonical (lower-case) form so
/// `Name` can be used directly as a cache/zone-store key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    labels: Vec<String>,
}

impl Name {
    /// The DNS root name.
    pub fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Parses a presentation-format name (e.g. `"www.example.com"` or
    /// `"www.example.com."`), canonicalising case.
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        let trimmed = text.trim_end_matches('.');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut labels = Vec::new();
        for label in trimmed.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(CodecError::LabelTooLong);
            }
            labels.push(label.to_ascii_lowercase());
        }
        let name = Self { labels };
        if name.wire_len() > MAX_NAME_LEN {
            return Err(CodecError::NameTooLong);
        }
        Ok(name)
    }

    /// Number of labels, not counting the implicit root.
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Returns true if `self` is equal to or a sub-domain of `base`.
    pub fn is_subdomain_of(&self, base: &Name) -> bool {
        if base.labels.len() > self.labels.len() {
            return false;
        }
        let offset = self.labels.len() - base.labels.len();
        self.labels[offset..] == base.labels[..]
    }

    /// Returns a new name with the first (leftmost) label removed, i.e. the
    /// parent domain. `None` for the root.
    pub fn parent(&self) -> Option<Name> {
        if self.labels.is_empty() {
            return None;
        }
        Some(Name {
            labels: self.labels[1..].to_vec(),
        })
    }

    /// Prepends a label (used by NSEC3 hashed-owner-name construction).
    pub fn prepend_label(&self, label: impl Into<String>) -> Result<Name, CodecError> {
        let label = label.into();
        if label.len() > MAX_LABEL_LEN {
            return Err(CodecError::LabelTooLong);
        }
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(label);
        labels.extend(self.labels.iter().cloned());
        let name = Name { labels };
        if name.wire_len() > MAX_NAME_LEN {
            return Err(CodecError::NameTooLong);
        }
        Ok(name)
    }

    /// Length of the name in wire format, including length-prefix bytes and
    /// the trailing root octet.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Decodes a name from `decoder`, honouring compression pointers.
    pub fn read(decoder: &mut BinDecoder<'_>) -> Result<Self, CodecError> {
        let mut labels = Vec::new();
        let mut total_len = 0usize;
        let mut cursor = decoder.position();
        // Pointers must only ever point strictly backwards; track the
        // furthest-back position we've already visited to reject loops.
        let mut visited = std::collections::HashSet::new();
        let mut jumped = false;
        let start_pos = cursor;

        loop {
            if !visited.insert(cursor) {
                return Err(CodecError::PointerLoop { offset: cursor });
            }
            let len_byte = decoder.peek_u8_at(cursor)?;
            if len_byte == 0 {
                if !jumped {
                    decoder.set_position(cursor + 1);
                }
                break;
            } else if len_byte & POINTER_MASK == POINTER_MASK {
                let hi = (len_byte & !POINTER_MASK) as usize;
                let lo = decoder.peek_u8_at(cursor + 1)? as usize;
                let pointer = (hi << 8) | lo;
                if pointer >= start_pos && !jumped {
                    // A forward-or-self pointer on the very first jump is
                    // always illegal; later jumps are bounded by `visited`.
                    return Err(CodecError::BadPointer { offset: cursor });
                }
                if pointer >= decoder.len() {
                    return Err(CodecError::BadPointer { offset: cursor });
                }
                if !jumped {
                    decoder.set_position(cursor + 2);
                }
                jumped = true;
                cursor = pointer;
                continue;
            } else if len_byte & POINTER_MASK != 0 {
                return Err(CodecError::BadPointer { offset: cursor });
            } else {
                let len = len_byte as usize;
                let label_start = cursor + 1;
                let bytes = decoder.peek_slice_at(label_start, len)?;
                let label = String::from_utf8_lossy(bytes).to_ascii_lowercase();
                if label.len() > MAX_LABEL_LEN {
                    return Err(CodecError::LabelTooLong);
                }
                total_len += label.len() + 1;
                if total_len + 1 > MAX_NAME_LEN {
                    return Err(CodecError::NameTooLong);
                }
                labels.push(label);
                cursor = label_start + len;
                if !jumped {
                    decoder.set_position(cursor);
                }
            }
        }
        Ok(Self { labels })
    }

    /// Encodes the name in wire format. Compression is intentionally not
    /// emitted here; callers that want compressed output use
    /// [`BinEncoder::emit_name_compressed`].
    pub fn emit(&self, encoder: &mut BinEncoder) -> Result<(), CodecError> {
        for label in &self.labels {
            encoder.emit_u8(label.len() as u8);
            encoder.emit_bytes(label.as_bytes());
        }
        encoder.emit_u8(0);
        Ok(())
    }

    /// Canonical wire form used for DNSSEC hashing: lower-cased (already
    /// guaranteed by construction) labels, no compression.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        for label in &self.labels {
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
        out.push(0);
        out
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        for label in &self.labels {
            write!(f, "{label}.")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::codec::{BinDecoder, BinEncoder};

    #[test]
    fn parse_canonicalises_case() {
        let a = Name::parse("WWW.Example.COM.").unwrap();
        let b = Name::parse("www.example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "www.example.com.");
    }

    #[test]
    fn subdomain_matching() {
        let base = Name::parse("example.com").unwrap();
        let sub = Name::parse("ads.example.com").unwrap();
        assert!(sub.is_subdomain_of(&base));
        assert!(base.is_subdomain_of(&base));
        assert!(!base.is_subdomain_of(&sub));
    }

    #[test]
    fn round_trip_without_compression() {
        let name = Name::parse("a.b.example.com").unwrap();
        let mut buf = Vec::new();
        {
            let mut enc = BinEncoder::new(&mut buf);
            name.emit(&mut enc).unwrap();
        }
        let mut dec = BinDecoder::new(&buf);
        let decoded = Name::read(&mut dec).unwrap();
        assert_eq!(name, decoded);
    }

    #[test]
    fn rejects_pointer_loop() {
        // byte 0: pointer to itself
        let buf = vec![0xC0, 0x00];
        let mut dec = BinDecoder::new(&buf);
        assert!(Name::read(&mut dec).is_err());
    }

    #[test]
    fn rejects_forward_pointer() {
        let buf = vec![0xC0, 0x05, 0x00];
        let mut dec = BinDecoder::new(&buf);
        assert!(Name::read(&mut dec).is_err());
    }
}
