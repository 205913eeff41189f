// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! EDNS0 (RFC 6891), carried as the OPT pseudo-record.

use crate::error::CodecError;
use crate::wire::codec::{BinDecoder, BinEncoder};
use crate::wire::name::Name;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edns {
    pub max_payload_size: u16,
    pub dnssec_ok: bool,
    pub version: u8,
    /// Extended RCODE bits (high 8 bits of the 12-bit wire RCODE), combined
    /// with the header's low 4 bits by the caller.
    pub extended_rcode_high: u8,
}

impl Default for Edns {
    fn default() -> Self {
        Self {
            max_payload_size: 1232,
            dnssec_ok: false,
            version: 0,
            extended_rcode_high: 0,
        }
    }
}

impl Edns {
    /// Reads the OPT pseudo-record body; `name` must be the root and
    /// `rtype` must already have been checked as OPT by the caller.
    pub fn read(decoder: &mut BinDecoder<'_>) -> Result<(Self, u16 /* rdlength-consuming caller owns advance */), CodecError> {
        let max_payload_size = decoder.read_u16()?;
        let extended_rcode_high = decoder.read_u8()?;
        let version = decoder.read_u8()?;
        let flags = decoder.read_u16()?;
        let dnssec_ok = flags & 0x8000 != 0;
        let rdlength = decoder.read_u16()?;
        if rdlength > 0 {
            decoder.read_bytes(rdlength as usize)?;
        }
        Ok((
            Self {
                max_payload_size,
                dnssec_ok,
                version,
                extended_rcode_high,
            },
            rdlength,
        ))
    }

    pub fn emit(&self, encoder: &mut BinEncoder) -> Result<(), CodecError> {
        Name::root().emit(encoder)?;
        encoder.emit_u16(41); // TYPE OPT
        encoder.emit_u16(self.max_payload_size);
        encoder.emit_u8(self.extended_rcode_high);
        encoder.emit_u8(self.version);
        let flags: u16 = if self.dnssec_ok { 0x8000 } else { 0 };
        encoder.emit_u16(flags);
        encoder.emit_u16(0); // no options carried
        Ok(())
    }
}
