// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Zone-transfer and dynamic-update authentication and streaming,
//! shared by every stream-oriented listener (`server::tcp`, `server::dot`).
//! AXFR (type 252) and IXFR (type 251) questions, and opcode UPDATE
//! (RFC 2136) requests, never reach the recursive pipeline; they're
//! intercepted here first.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::warn;

use crate::error::ZoneError;
use crate::pipeline::Pipeline;
use crate::wire::record::{DnsClass, ResourceRecord};
use crate::wire::record_type::RecordType;
use crate::wire::{Message, OpCode, RData, ResponseCode};
use crate::zone::ddns::{apply_update, Prerequisite, UpdateOp};
use crate::zone::ixfr::{build_ixfr, IxfrResponse};
use crate::zone::tsig::{parse_tsig_rdata, verify, RawTsig, TsigRecord};

/// Returns `Some(replies)` once `raw_message` has been fully handled as
/// an AXFR/IXFR/UPDATE request; `None` means the caller should fall
/// through to the ordinary pipeline.
pub async fn maybe_handle(pipeline: &Arc<Pipeline>, raw_message: &[u8], peer: IpAddr) -> Option<Vec<Message>> {
    let message = Message::decode(raw_message).ok()?;
    let question = message.question()?.clone();

    match (message.header.op_code, question.qtype) {
        (OpCode::Update, _) => Some(handle_update(pipeline, &message, peer)),
        (_, RecordType::AXFR) => Some(handle_axfr(pipeline, &message, peer)),
        (_, RecordType::IXFR) => Some(handle_ixfr(pipeline, &message, peer)),
        _ => None,
    }
}

fn handle_axfr(pipeline: &Arc<Pipeline>, message: &Message, peer: IpAddr) -> Vec<Message> {
    let question = message.question().expect("matched on question.qtype above").clone();
    let Some(zone) = pipeline.zone_store.find_for_name(&question.qname) else {
        return vec![Message::error(message.header.id, OpCode::Query, ResponseCode::Refused)];
    };

    if let Err(e) = authorize_transfer(pipeline, message, peer) {
        warn!(%peer, zone = %question.qname, error = %e, "AXFR refused");
        return vec![Message::error(message.header.id, OpCode::Query, ResponseCode::Refused)];
    }

    crate::zone::axfr::build_transfer(&zone, message.header.id)
}

fn handle_ixfr(pipeline: &Arc<Pipeline>, message: &Message, peer: IpAddr) -> Vec<Message> {
    let question = message.question().expect("matched on question.qtype above").clone();
    let Some(zone) = pipeline.zone_store.find_for_name(&question.qname) else {
        return vec![Message::error(message.header.id, OpCode::Query, ResponseCode::Refused)];
    };

    if let Err(e) = authorize_transfer(pipeline, message, peer) {
        warn!(%peer, zone = %question.qname, error = %e, "IXFR refused");
        return vec![Message::error(message.header.id, OpCode::Query, ResponseCode::Refused)];
    }

    let client_serial = message
        .authorities
        .iter()
        .find_map(|r| match &r.rdata {
            RData::Soa(soa) => Some(soa.serial),
            _ => None,
        })
        .unwrap_or(0);

    match build_ixfr(&zone, client_serial, message.header.id) {
        IxfrResponse::UpToDate(m) | IxfrResponse::Incremental(m) | IxfrResponse::FallBackToAxfr(m) => m,
    }
}

/// RFC 2136 UPDATE: the question section names the zone, the answer
/// section carries prerequisites, and the authority section carries the
/// update operations (despite the generic field names our `Message`
/// type uses for every other opcode).
fn handle_update(pipeline: &Arc<Pipeline>, message: &Message, peer: IpAddr) -> Vec<Message> {
    let Some(question) = message.question() else {
        return vec![Message::error(message.header.id, OpCode::Update, ResponseCode::FormErr)];
    };
    let zone_name = question.qname.clone();

    if let Err(e) = authorize_update(pipeline, message) {
        warn!(%peer, zone = %zone_name, error = %e, "DDNS update refused");
        let rcode = crate::error::ServerError::Zone(e).to_rcode();
        return vec![Message::error(message.header.id, OpCode::Update, rcode)];
    }

    let Some(zone) = pipeline.zone_store.get(&zone_name) else {
        return vec![Message::error(message.header.id, OpCode::Update, ResponseCode::NotAuth)];
    };

    let prereqs = prerequisites_from_section(&message.answers);
    let updates = update_ops_from_section(&message.authorities);

    match apply_update(&zone, &prereqs, updates) {
        Ok(_serial) => vec![Message::response(message.header.id, OpCode::Update)],
        Err(e) => {
            warn!(zone = %zone_name, error = %e, "DDNS update rejected");
            let rcode = crate::error::ServerError::Zone(e).to_rcode();
            vec![Message::error(message.header.id, OpCode::Update, rcode)]
        }
    }
}

fn prerequisites_from_section(records: &[ResourceRecord]) -> Vec<Prerequisite> {
    records
        .iter()
        .map(|r| {
            let rtype = r.record_type();
            match (r.dns_class, rtype) {
                (DnsClass::Any, RecordType::ANY) => Prerequisite::NameInUse { name: r.name.clone() },
                (DnsClass::Unknown(254), RecordType::ANY) => Prerequisite::NameNotInUse { name: r.name.clone() },
                (DnsClass::Any, _) => Prerequisite::RrsetExists { name: r.name.clone(), rtype },
                (DnsClass::Unknown(254), _) => Prerequisite::RrsetDoesNotExist { name: r.name.clone(), rtype },
                _ => Prerequisite::RrsetExistsWithData { name: r.name.clone(), rtype, rdata: r.rdata.clone() },
            }
        })
        .collect()
}

fn update_ops_from_section(records: &[ResourceRecord]) -> Vec<UpdateOp> {
    records
        .iter()
        .map(|r| {
            let rtype = r.record_type();
            match (r.dns_class, rtype) {
                (DnsClass::Any, RecordType::ANY) => UpdateOp::DeleteAll { name: r.name.clone() },
                (DnsClass::Any, _) => UpdateOp::DeleteRrset { name: r.name.clone(), rtype },
                (DnsClass::Unknown(254), _) => UpdateOp::DeleteRr(ResourceRecord::new(r.name.clone(), 0, r.rdata.clone())),
                _ => UpdateOp::Add(ResourceRecord::new(r.name.clone(), r.ttl, r.rdata.clone())),
            }
        })
        .collect()
}

fn authorize_transfer(pipeline: &Arc<Pipeline>, message: &Message, peer: IpAddr) -> Result<(), ZoneError> {
    if pipeline.config.transfer_allowed_by_acl(peer) {
        return Ok(());
    }
    verify_tsig(pipeline, message)
}

/// Dynamic updates always require TSIG; there is no ACL bypass for
/// mutating a zone, only for read-only transfers.
fn authorize_update(pipeline: &Arc<Pipeline>, message: &Message) -> Result<(), ZoneError> {
    verify_tsig(pipeline, message)
}

fn verify_tsig(pipeline: &Arc<Pipeline>, message: &Message) -> Result<(), ZoneError> {
    let (stripped, tsig_rr, raw_tsig) = extract_tsig(message).ok_or(ZoneError::NotAuthorised)?;
    let key_name = tsig_rr.name.to_string();
    let key_name = key_name.trim_end_matches('.');
    let key = pipeline.tsig_keys.get(key_name).ok_or(ZoneError::TsigFailed("unknown key"))?;

    let message_bytes = stripped.encode(Some(u16::MAX)).map_err(|_| ZoneError::TsigFailed("could not recompute signed bytes"))?;
    let tsig_record = TsigRecord {
        key_name: &tsig_rr.name,
        algorithm_name: &raw_tsig.algorithm_name,
        time_signed: raw_tsig.time_signed,
        mac: &raw_tsig.mac,
    };
    verify(&tsig_record, &message_bytes, &key, &pipeline.transfer_replay_guard)
}

/// Pulls the TSIG RR (RFC 8945 places it last in the additional
/// section) out of `message`, returning the message with it stripped
/// (for MAC recomputation) alongside the RR itself and its decoded
/// RDATA.
fn extract_tsig(message: &Message) -> Option<(Message, ResourceRecord, RawTsig)> {
    let last = message.additionals.last()?;
    if last.record_type() != RecordType::Unknown(250) {
        return None;
    }
    let RData::Unknown { data, .. } = &last.rdata else { return None };
    let raw_tsig = parse_tsig_rdata(data).ok()?;

    let mut stripped = message.clone();
    let tsig_rr = stripped.additionals.pop().expect("checked non-empty above");
    Some((stripped, tsig_rr, raw_tsig))
}
