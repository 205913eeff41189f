// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The basic request/response data structure used for every DNS protocol
//! this server speaks. Pure functions: `decode`/`encode`, no I/O.

use tracing::warn;

use crate::error::CodecError;
use crate::wire::codec::{BinDecoder, BinEncoder};
use crate::wire::edns::Edns;
use crate::wire::header::{Header, MessageType, OpCode, ResponseCode};
use crate::wire::record::{Question, ResourceRecord};
use crate::wire::record_type::RecordType;

/// Default UDP response size when the client sent no OPT record.
pub const DEFAULT_UDP_SIZE: u16 = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
    pub edns: Option<Edns>,
}

impl Message {
    pub fn query(id: u16) -> Self {
        Self::new(id, MessageType::Query, OpCode::Query)
    }

    pub fn response(id: u16, op_code: OpCode) -> Self {
        Self::new(id, MessageType::Response, op_code)
    }

    pub fn error(id: u16, op_code: OpCode, rcode: ResponseCode) -> Self {
        let mut msg = Self::response(id, op_code);
        msg.header.response_code = rcode;
        msg
    }

    fn new(id: u16, message_type: MessageType, op_code: OpCode) -> Self {
        Self {
            header: Header::new(id, message_type, op_code),
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
            edns: None,
        }
    }

    pub fn add_question(&mut self, question: Question) -> &mut Self {
        self.questions.push(question);
        self
    }

    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// The response code, folding in the EDNS extended bits if present.
    pub fn response_code(&self) -> ResponseCode {
        self.header.response_code
    }

    /// A truncated copy: question and OPT preserved, all response sections
    /// dropped and TC set.
    pub fn truncate(&self) -> Self {
        let mut msg = Self::new(self.header.id, self.header.message_type, self.header.op_code);
        msg.header = self.header;
        msg.header.truncated = true;
        msg.header.answer_count = 0;
        msg.header.authority_count = 0;
        msg.header.additional_count = 0;
        msg.questions = self.questions.clone();
        msg.edns = self.edns;
        msg
    }

    /// Decodes a complete message from `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut decoder = BinDecoder::new(bytes);
        let header = Header::read(&mut decoder)?;

        let mut questions = Vec::with_capacity(header.query_count as usize);
        for _ in 0..header.query_count {
            questions.push(Question::read(&mut decoder)?);
        }

        let answers = Self::read_records(&mut decoder, header.answer_count)?;
        let authorities = Self::read_records(&mut decoder, header.authority_count)?;

        let mut additionals = Vec::new();
        let mut edns = None;
        for _ in 0..header.additional_count {
            let record_start = decoder.position();
            if decoder.remaining() == 0 {
                break;
            }
            // Names in the additional section are read generically; OPT is
            // identified by TYPE after the (always-root) owner name.
            let name_len_byte = decoder.peek_u8_at(record_start)?;
            if name_len_byte == 0 {
                // Likely root name: could be OPT.
                let mut probe = BinDecoder::new(bytes);
                probe.set_position(record_start);
                let _root = crate::wire::name::Name::read(&mut probe)?;
                let rtype = RecordType::from_u16(probe.peek_u8_at(probe.position())? as u16 * 256
                    + probe.peek_u8_at(probe.position() + 1)? as u16);
                if rtype == RecordType::OPT {
                    probe.set_position(probe.position() + 2); // consume TYPE
                    let (parsed_edns, _) = Edns::read(&mut probe)?;
                    edns = Some(parsed_edns);
                    decoder.set_position(probe.position());
                    continue;
                }
            }
            additionals.push(ResourceRecord::read(&mut decoder)?);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authorities,
            additionals,
            edns,
        })
    }

    fn read_records(decoder: &mut BinDecoder<'_>, count: u16) -> Result<Vec<ResourceRecord>, CodecError> {
        let mut records = Vec::with_capacity(count as usize);
        for _ in 0..count {
            records.push(ResourceRecord::read(decoder)?);
        }
        Ok(records)
    }

    /// Encodes the message. If `max_size` is exceeded the response is
    /// truncated after the question and `TC` is set, per the
    /// response-ID contract.
    pub fn encode(&self, max_size: Option<u16>) -> Result<Vec<u8>, CodecError> {
        let full = self.encode_full()?;
        let limit = max_size.unwrap_or(u16::MAX) as usize;
        if full.len() <= limit {
            return Ok(full);
        }
        warn!(id = self.header.id, size = full.len(), limit, "truncating oversized response");
        self.truncate().encode_full()
    }

    fn encode_full(&self) -> Result<Vec<u8>, CodecError> {
        let mut header = self.header;
        header.query_count = self.questions.len() as u16;
        header.answer_count = self.answers.len() as u16;
        header.authority_count = self.authorities.len() as u16;
        header.additional_count = self.additionals.len() as u16 + self.edns.is_some() as u16;

        let mut buf = Vec::new();
        let mut encoder = BinEncoder::new(&mut buf);
        header.emit(&mut encoder);
        for q in &self.questions {
            q.emit(&mut encoder)?;
        }
        for r in &self.answers {
            r.emit(&mut encoder)?;
        }
        for r in &self.authorities {
            r.emit(&mut encoder)?;
        }
        for r in &self.additionals {
            r.emit(&mut encoder)?;
        }
        if let Some(edns) = &self.edns {
            edns.emit(&mut encoder)?;
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::name::Name;
    use crate::wire::rdata::RData;
    use crate::wire::record::{Question, ResourceRecord};
    use std::net::Ipv4Addr;

    #[test]
    fn round_trip_a_record() {
        let mut msg = Message::response(0x1234, OpCode::Query);
        msg.add_question(Question::new(Name::parse("example.com").unwrap(), RecordType::A));
        msg.answers.push(ResourceRecord::new(
            Name::parse("example.com").unwrap(),
            300,
            RData::A(Ipv4Addr::new(93, 184, 216, 34)),
        ));
        let bytes = msg.encode(None).unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.header.id, 0x1234);
        assert_eq!(decoded.answers.len(), 1);
        assert_eq!(decoded.answers[0].rdata, RData::A(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[test]
    fn truncates_when_over_udp_size() {
        let mut msg = Message::response(1, OpCode::Query);
        msg.add_question(Question::new(Name::parse("example.com").unwrap(), RecordType::TXT));
        for i in 0..50u8 {
            msg.answers.push(ResourceRecord::new(
                Name::parse("example.com").unwrap(),
                300,
                RData::Txt(vec![vec![i; 200]]),
            ));
        }
        let bytes = msg.encode(Some(DEFAULT_UDP_SIZE)).unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        assert!(decoded.header.truncated);
        assert!(decoded.answers.is_empty());
    }

    #[test]
    fn rejects_garbage_bytes_without_panicking() {
        let garbage = [0xffu8; 4];
        assert!(Message::decode(&garbage).is_err());
    }
}
