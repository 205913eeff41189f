// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! AXFR: full zone transfer, streamed as one SOA-first, one SOA-last,
//! record-bearing messages in between.

use std::sync::Arc;

use crate::wire::record::ResourceRecord;
use crate::wire::{Header, Message, MessageType, OpCode, RData};
use crate::zone::store::Zone;

/// Records per transfer message, chosen to stay well within the 64KiB
/// TCP message cap even for large RDATA; the caller may split further to
/// respect a peer's own EDNS size preference.
const RECORDS_PER_MESSAGE: usize = 50;

/// Builds the full sequence of messages for an AXFR response: first and
/// last carry the SOA, interior messages carry the zone's other records
/// grouped to [`RECORDS_PER_MESSAGE`] per message.
pub fn build_transfer(zone: &Arc<Zone>, query_id: u16) -> Vec<Message> {
    let soa = zone.soa();
    let origin = zone.origin.clone();
    let soa_rr = ResourceRecord::new(origin, soa.minimum, RData::Soa(soa));
    let records = zone.all_records();

    let mut messages = Vec::new();
    let mut header = Header::new(query_id, MessageType::Response, OpCode::Query);
    header.authoritative = true;

    let mut first = Message { header, questions: Vec::new(), answers: vec![soa_rr.clone()], authorities: Vec::new(), additionals: Vec::new(), edns: None };
    if records.is_empty() {
        first.answers.push(soa_rr);
        messages.push(first);
        return messages;
    }

    for (i, chunk) in records.chunks(RECORDS_PER_MESSAGE).enumerate() {
        if i == 0 {
            first.answers.extend_from_slice(chunk);
            messages.push(first.clone());
        } else {
            let mut header = Header::new(query_id, MessageType::Response, OpCode::Query);
            header.authoritative = true;
            messages.push(Message {
                header,
                questions: Vec::new(),
                answers: chunk.to_vec(),
                authorities: Vec::new(),
                additionals: Vec::new(),
                edns: None,
            });
        }
    }

    let mut header = Header::new(query_id, MessageType::Response, OpCode::Query);
    header.authoritative = true;
    messages.push(Message { header, questions: Vec::new(), answers: vec![soa_rr], authorities: Vec::new(), additionals: Vec::new(), edns: None });

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Name;
    use crate::wire::rdata::Soa;
    use crate::zone::store::ChangeType;

    fn test_soa() -> Soa {
        Soa {
            mname: Name::parse("ns1.example.com").unwrap(),
            rname: Name::parse("hostmaster.example.com").unwrap(),
            serial: 5,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 300,
        }
    }

    #[test]
    fn transfer_starts_and_ends_with_soa() {
        let origin = Name::parse("test-axfr.example.com").unwrap();
        let zone = Arc::new(Zone::new(origin.clone(), test_soa()));
        for i in 0..3 {
            let name = Name::parse(&format!("host{i}.test-axfr.example.com")).unwrap();
            zone.apply(ChangeType::Add, ResourceRecord::new(name, 300, RData::A(format!("10.0.0.{i}").parse().unwrap()))).unwrap();
        }

        let messages = build_transfer(&zone, 42);
        assert!(messages.len() >= 2);
        assert!(matches!(messages.first().unwrap().answers.first().unwrap().rdata, RData::Soa(_)));
        assert!(matches!(messages.last().unwrap().answers.last().unwrap().rdata, RData::Soa(_)));

        let total_non_soa: usize = messages.iter().flat_map(|m| &m.answers).filter(|r| !matches!(r.rdata, RData::Soa(_))).count();
        assert_eq!(total_non_soa, 3);
    }
}
