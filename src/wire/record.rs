// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `Question` and `ResourceRecord`.

use crate::error::CodecError;
use crate::wire::codec::{BinDecoder, BinEncoder};
use crate::wire::name::Name;
use crate::wire::rdata::RData;
use crate::wire::record_type::RecordType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnsClass {
    In,
    Any,
    Unknown(u16),
}

impl DnsClass {
    pub fn to_u16(self) -> u16 {
        match self {
            Self::In => 1,
            Self::Any => 255,
            Self::Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => Self::In,
            255 => Self::Any,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub qname: Name,
    pub qtype: RecordType,
    pub qclass: DnsClass,
}

impl Question {
    pub fn new(qname: Name, qtype: RecordType) -> Self {
        Self { qname, qtype, qclass: DnsClass::In }
    }

    pub fn read(decoder: &mut BinDecoder<'_>) -> Result<Self, CodecError> {
        let qname = Name::read(decoder)?;
        let qtype = RecordType::from_u16(decoder.read_u16()?);
        let qclass = DnsClass::from_u16(decoder.read_u16()?);
        Ok(Self { qname, qtype, qclass })
    }

    pub fn emit(&self, encoder: &mut BinEncoder) -> Result<(), CodecError> {
        encoder.emit_name_compressed(&self.qname)?;
        encoder.emit_u16(self.qtype.to_u16());
        encoder.emit_u16(self.qclass.to_u16());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: Name,
    pub dns_class: DnsClass,
    pub ttl: u32,
    pub rdata: RData,
}

impl ResourceRecord {
    pub fn new(name: Name, ttl: u32, rdata: RData) -> Self {
        Self { name, dns_class: DnsClass::In, ttl, rdata }
    }

    pub fn record_type(&self) -> RecordType {
        self.rdata.record_type()
    }

    pub fn read(decoder: &mut BinDecoder<'_>) -> Result<Self, CodecError> {
        let name = Name::read(decoder)?;
        let rtype = RecordType::from_u16(decoder.read_u16()?);
        let dns_class = DnsClass::from_u16(decoder.read_u16()?);
        let ttl = decoder.read_u32()?;
        let rdlength = decoder.read_u16()? as usize;
        let rdata = RData::read(decoder, rtype, rdlength)?;
        Ok(Self { name, dns_class, ttl, rdata })
    }

    pub fn emit(&self, encoder: &mut BinEncoder) -> Result<(), CodecError> {
        encoder.emit_name_compressed(&self.name)?;
        encoder.emit_u16(self.rdata.record_type().to_u16());
        encoder.emit_u16(self.dns_class.to_u16());
        encoder.emit_u32(self.ttl);
        // RDATA length must be patched in after we know its encoded size;
        // encode into a scratch buffer first since names inside RDATA are
        // never compressed against the outer message.
        let mut scratch = Vec::new();
        {
            let mut rdata_encoder = BinEncoder::new(&mut scratch);
            self.rdata.emit_uncompressed(&mut rdata_encoder)?;
        }
        if scratch.len() > u16::MAX as usize {
            return Err(CodecError::MessageTooLarge);
        }
        encoder.emit_u16(scratch.len() as u16);
        encoder.emit_bytes(&scratch);
        Ok(())
    }

    /// Canonical form for DNSSEC RRset hashing: owner lower-cased (already
    /// guaranteed), class fixed to IN, TTL replaced by the RRSIG's Original
    /// TTL, RDATA in canonical (uncompressed) form.
    pub fn to_canonical_bytes(&self, original_ttl: u32) -> Vec<u8> {
        let mut out = self.name.to_canonical_bytes();
        out.extend_from_slice(&self.rdata.record_type().to_u16().to_be_bytes());
        out.extend_from_slice(&DnsClass::In.to_u16().to_be_bytes());
        out.extend_from_slice(&original_ttl.to_be_bytes());
        let rdata_bytes = self.rdata.to_canonical_bytes();
        out.extend_from_slice(&(rdata_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&rdata_bytes);
        out
    }
}
