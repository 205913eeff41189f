// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNS message header: id, flags and the four section counts.

use crate::error::CodecError;
use crate::wire::codec::{BinDecoder, BinEncoder};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Query,
    Response,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Query,
    Status,
    Notify,
    Update,
    Unknown(u8),
}

impl OpCode {
    fn to_u8(self) -> u8 {
        match self {
            Self::Query => 0,
            Self::Status => 2,
            Self::Notify => 4,
            Self::Update => 5,
            Self::Unknown(v) => v,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Query,
            2 => Self::Status,
            4 => Self::Notify,
            5 => Self::Update,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    NotAuth,
    Other(u8),
}

impl ResponseCode {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::NoError => 0,
            Self::FormErr => 1,
            Self::ServFail => 2,
            Self::NxDomain => 3,
            Self::NotImp => 4,
            Self::Refused => 5,
            Self::NotAuth => 9,
            Self::Other(v) => v,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NoError,
            1 => Self::FormErr,
            2 => Self::ServFail,
            3 => Self::NxDomain,
            4 => Self::NotImp,
            5 => Self::Refused,
            9 => Self::NotAuth,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub id: u16,
    pub message_type: MessageType,
    pub op_code: OpCode,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub response_code: ResponseCode,
    pub query_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

impl Header {
    pub fn new(id: u16, message_type: MessageType, op_code: OpCode) -> Self {
        Self {
            id,
            message_type,
            op_code,
            authoritative: false,
            truncated: false,
            recursion_desired: matches!(message_type, MessageType::Query),
            recursion_available: false,
            authentic_data: false,
            checking_disabled: false,
            response_code: ResponseCode::NoError,
            query_count: 0,
            answer_count: 0,
            authority_count: 0,
            additional_count: 0,
        }
    }

    pub fn read(decoder: &mut BinDecoder<'_>) -> Result<Self, CodecError> {
        let id = decoder.read_u16()?;
        let flags1 = decoder.read_u8()?;
        let flags2 = decoder.read_u8()?;
        let message_type = if flags1 & 0x80 != 0 { MessageType::Response } else { MessageType::Query };
        let op_code = OpCode::from_u8((flags1 >> 3) & 0x0F);
        let authoritative = flags1 & 0x04 != 0;
        let truncated = flags1 & 0x02 != 0;
        let recursion_desired = flags1 & 0x01 != 0;
        let recursion_available = flags2 & 0x80 != 0;
        let authentic_data = flags2 & 0x20 != 0;
        let checking_disabled = flags2 & 0x10 != 0;
        let response_code = ResponseCode::from_u8(flags2 & 0x0F);
        let query_count = decoder.read_u16()?;
        let answer_count = decoder.read_u16()?;
        let authority_count = decoder.read_u16()?;
        let additional_count = decoder.read_u16()?;
        Ok(Self {
            id,
            message_type,
            op_code,
            authoritative,
            truncated,
            recursion_desired,
            recursion_available,
            authentic_data,
            checking_disabled,
            response_code,
            query_count,
            answer_count,
            authority_count,
            additional_count,
        })
    }

    pub fn emit(&self, encoder: &mut BinEncoder) {
        encoder.emit_u16(self.id);
        let mut flags1 = 0u8;
        if matches!(self.message_type, MessageType::Response) {
            flags1 |= 0x80;
        }
        flags1 |= (self.op_code.to_u8() & 0x0F) << 3;
        if self.authoritative {
            flags1 |= 0x04;
        }
        if self.truncated {
            flags1 |= 0x02;
        }
        if self.recursion_desired {
            flags1 |= 0x01;
        }
        let mut flags2 = self.response_code.to_u8() & 0x0F;
        if self.recursion_available {
            flags2 |= 0x80;
        }
        if self.authentic_data {
            flags2 |= 0x20;
        }
        if self.checking_disabled {
            flags2 |= 0x10;
        }
        encoder.emit_u8(flags1);
        encoder.emit_u8(flags2);
        encoder.emit_u16(self.query_count);
        encoder.emit_u16(self.answer_count);
        encoder.emit_u16(self.authority_count);
        encoder.emit_u16(self.additional_count);
    }
}
