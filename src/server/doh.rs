// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNS-over-HTTPS (RFC 8484): binary GET/POST at the configured path,
//! plus a JSON debug surface for the same endpoint. TLS is assumed to be
//! terminated by a fronting proxy; this listener speaks plain HTTP.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, Request, Transport};
use crate::wire::{Message, RData};

const CONTENT_TYPE_MESSAGE: &str = "application/dns-message";
const CONTENT_TYPE_JSON: &str = "application/dns-json";

#[derive(Deserialize)]
struct BinaryGetQuery {
    dns: String,
}

#[derive(Deserialize)]
struct JsonGetQuery {
    name: String,
    #[serde(rename = "type", default)]
    rtype: Option<String>,
}

/// The JSON GET surface accepts a mnemonic (`AAAA`) or a bare number for
/// `type`; only the common mnemonics are recognised, everything else
/// falls back to `A`.
fn qtype_from_mnemonic(name: &str) -> u16 {
    use crate::wire::record_type::RecordType;
    let rtype = match name.to_ascii_uppercase().as_str() {
        "A" => RecordType::A,
        "AAAA" => RecordType::AAAA,
        "NS" => RecordType::NS,
        "CNAME" => RecordType::CNAME,
        "SOA" => RecordType::SOA,
        "PTR" => RecordType::PTR,
        "MX" => RecordType::MX,
        "TXT" => RecordType::TXT,
        "SRV" => RecordType::SRV,
        "CAA" => RecordType::CAA,
        "DNSKEY" => RecordType::DNSKEY,
        "DS" => RecordType::DS,
        "NSEC" => RecordType::NSEC,
        "NSEC3" => RecordType::NSEC3,
        "RRSIG" => RecordType::RRSIG,
        "ANY" => RecordType::ANY,
        _ => RecordType::A,
    };
    rtype.to_u16()
}

fn client_addr(req: &HttpRequest) -> IpAddr {
    req.peer_addr().map(|a| a.ip()).unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]))
}

async fn handle_get(pipeline: web::Data<Arc<Pipeline>>, req: HttpRequest, query: web::Query<BinaryGetQuery>) -> HttpResponse {
    let Ok(raw_message) = BASE64URL_NOPAD.decode(query.dns.as_bytes()) else {
        return HttpResponse::BadRequest().finish();
    };
    respond_binary(&pipeline, client_addr(&req), raw_message).await
}

async fn handle_post(pipeline: web::Data<Arc<Pipeline>>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    respond_binary(&pipeline, client_addr(&req), body.to_vec()).await
}

async fn respond_binary(pipeline: &Arc<Pipeline>, client_addr: IpAddr, raw_message: Vec<u8>) -> HttpResponse {
    if let Some(replies) = super::xfr::maybe_handle(pipeline, &raw_message, client_addr).await {
        let Some(first) = replies.into_iter().next() else {
            return HttpResponse::InternalServerError().finish();
        };
        return match first.encode(Some(u16::MAX)) {
            Ok(bytes) => HttpResponse::Ok().content_type(CONTENT_TYPE_MESSAGE).body(bytes),
            Err(_) => HttpResponse::InternalServerError().finish(),
        };
    }

    let request = Request { raw_message, client_addr, transport: Transport::DohBinary, received_at: Instant::now() };
    let response = super::resolve_and_log(pipeline, request).await;
    HttpResponse::Ok().content_type(CONTENT_TYPE_MESSAGE).body(response.bytes)
}

/// JSON debug surface (RFC 8484 §3's application/dns-json convention,
/// extended with a few fields beyond what a stock resolver's client
/// library expects back).
async fn handle_json(pipeline: web::Data<Arc<Pipeline>>, req: HttpRequest, query: web::Query<JsonGetQuery>) -> HttpResponse {
    let qtype = match query.rtype.as_deref() {
        Some(t) => t.parse::<u16>().unwrap_or_else(|_| qtype_from_mnemonic(t)),
        None => 1,
    };

    let Ok(qname) = crate::wire::Name::parse(&query.name) else {
        return HttpResponse::BadRequest().finish();
    };

    let mut msg = Message::query(rand::random());
    msg.add_question(crate::wire::record::Question::new(qname, crate::wire::record_type::RecordType::from_u16(qtype)));
    let Ok(raw_message) = msg.encode(Some(u16::MAX)) else {
        return HttpResponse::InternalServerError().finish();
    };

    let request = Request { raw_message, client_addr: client_addr(&req), transport: Transport::DohJson, received_at: Instant::now() };
    let response = super::resolve_and_log(&pipeline, request).await;
    let Ok(decoded) = Message::decode(&response.bytes) else {
        return HttpResponse::InternalServerError().finish();
    };

    HttpResponse::Ok().content_type(CONTENT_TYPE_JSON).json(to_json_response(&decoded))
}

#[derive(Serialize)]
struct JsonAnswer {
    name: String,
    #[serde(rename = "type")]
    rtype: u16,
    #[serde(rename = "TTL")]
    ttl: u32,
    data: String,
}

#[derive(Serialize)]
struct JsonQuestion {
    name: String,
    #[serde(rename = "type")]
    rtype: u16,
}

#[derive(Serialize)]
struct JsonMessage {
    #[serde(rename = "Status")]
    status: u8,
    #[serde(rename = "TC")]
    truncated: bool,
    #[serde(rename = "RD")]
    recursion_desired: bool,
    #[serde(rename = "RA")]
    recursion_available: bool,
    #[serde(rename = "AD")]
    authenticated_data: bool,
    #[serde(rename = "CD")]
    checking_disabled: bool,
    #[serde(rename = "Question")]
    question: Vec<JsonQuestion>,
    #[serde(rename = "Answer")]
    answer: Vec<JsonAnswer>,
}

fn to_json_response(message: &Message) -> JsonMessage {
    JsonMessage {
        status: message.header.response_code.to_u8(),
        truncated: message.header.truncated,
        recursion_desired: message.header.recursion_desired,
        recursion_available: message.header.recursion_available,
        authenticated_data: message.header.authentic_data,
        checking_disabled: message.header.checking_disabled,
        question: message.questions.iter().map(|q| JsonQuestion { name: q.qname.to_string(), rtype: q.qtype.to_u16() }).collect(),
        answer: message.answers.iter().map(|r| JsonAnswer { name: r.name.to_string(), rtype: r.record_type().to_u16(), ttl: r.ttl, data: rdata_to_string(&r.rdata) }).collect(),
    }
}

fn rdata_to_string(rdata: &RData) -> String {
    match rdata {
        RData::A(ip) => ip.to_string(),
        RData::Aaaa(ip) => ip.to_string(),
        RData::Ns(n) | RData::Cname(n) | RData::Ptr(n) => n.to_string(),
        RData::Mx { preference, exchange } => format!("{preference} {exchange}"),
        RData::Txt(chunks) => chunks.iter().map(|c| String::from_utf8_lossy(c)).collect::<Vec<_>>().join(""),
        RData::Soa(soa) => format!("{} {} {} {} {} {} {}", soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum),
        _ => String::new(),
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

pub async fn serve(pipeline: Arc<Pipeline>, bind_addr: std::net::SocketAddr, path: String) -> std::io::Result<()> {
    let data = web::Data::new(pipeline);
    let json_path = format!("{path}/json");

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route(&path, web::get().to(handle_get))
            .route(&path, web::post().to(handle_post))
            .route(&json_path, web::get().to(handle_json))
            .route("/healthz", web::get().to(health))
    })
    .bind(bind_addr)?
    .run()
    .await
}
