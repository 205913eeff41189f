// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNS-over-HTTPS upstream transport (RFC 8484): binary POST (and
//! base64url GET) plus the legacy `application/dns-json` response format.

use std::time::Duration;

use data_encoding::BASE64URL_NOPAD;
use serde::Deserialize;

use crate::error::UpstreamError;
use crate::wire::header::ResponseCode;
use crate::wire::name::Name;
use crate::wire::rdata::RData;
use crate::wire::record::{Question, ResourceRecord};
use crate::wire::record_type::RecordType;
use crate::wire::{Header, Message, MessageType, OpCode};

pub struct HttpsTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpsTransport {
    pub fn new(url: String, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { url, client }
    }

    pub async fn send_binary(&self, message: &Message) -> Result<Message, UpstreamError> {
        let bytes = message.encode(Some(u16::MAX)).map_err(|_| UpstreamError::Timeout(self.url.clone()))?;

        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/dns-message")
            .header("accept", "application/dns-message")
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_err(&self.url, &e))?;

        let body = response.bytes().await.map_err(|e| transport_err(&self.url, &e))?;
        Message::decode(&body).map_err(|_| UpstreamError::Transport {
            upstream: self.url.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed DoH response"),
        })
    }

    /// GET variant with the query base64url-encoded in `?dns=`.
    pub async fn send_binary_get(&self, message: &Message) -> Result<Message, UpstreamError> {
        let bytes = message.encode(Some(u16::MAX)).map_err(|_| UpstreamError::Timeout(self.url.clone()))?;
        let encoded = BASE64URL_NOPAD.encode(&bytes);
        let response = self
            .client
            .get(&self.url)
            .query(&[("dns", encoded)])
            .header("accept", "application/dns-message")
            .send()
            .await
            .map_err(|e| transport_err(&self.url, &e))?;
        let body = response.bytes().await.map_err(|e| transport_err(&self.url, &e))?;
        Message::decode(&body).map_err(|_| UpstreamError::Transport {
            upstream: self.url.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed DoH response"),
        })
    }

    /// JSON variant: translates the request into `{name, type, do?}` and the
    /// JSON answer back into a wire `Message`.
    pub async fn send_json(&self, message: &Message) -> Result<Message, UpstreamError> {
        let question = message.question().ok_or_else(|| UpstreamError::Transport {
            upstream: self.url.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no question to forward"),
        })?;
        let dnssec_ok = message.edns.map(|e| e.dnssec_ok).unwrap_or(false);

        let mut query = vec![
            ("name".to_string(), question.qname.to_string()),
            ("type".to_string(), question.qtype.to_u16().to_string()),
        ];
        if dnssec_ok {
            query.push(("do".to_string(), "true".to_string()));
        }

        let response = self
            .client
            .get(&self.url)
            .query(&query)
            .header("accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| transport_err(&self.url, &e))?;

        let json: DohJsonResponse = response.json().await.map_err(|e| transport_err(&self.url, &e))?;
        json_to_message(message.header.id, question.clone(), json)
    }
}

fn transport_err(upstream: &str, e: &reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        upstream: upstream.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    }
}

#[derive(Deserialize)]
struct DohJsonResponse {
    #[serde(rename = "Status")]
    status: u8,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohJsonRecord>,
}

#[derive(Deserialize)]
struct DohJsonRecord {
    name: String,
    #[serde(rename = "type")]
    rtype: u16,
    #[serde(rename = "TTL")]
    ttl: u32,
    data: String,
}

fn json_to_message(id: u16, question: Question, json: DohJsonResponse) -> Result<Message, UpstreamError> {
    let mut msg = Message::response(id, OpCode::Query);
    msg.header = Header::new(id, MessageType::Response, OpCode::Query);
    msg.header.response_code = ResponseCode::from_u8(json.status);
    msg.add_question(question);

    for rr in json.answer {
        let name = Name::parse(&rr.name).map_err(|_| UpstreamError::Transport {
            upstream: "doh-json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "bad owner name in JSON answer"),
        })?;
        let rtype = RecordType::from_u16(rr.rtype);
        let rdata = match rtype {
            RecordType::A => RData::A(rr.data.parse().map_err(|_| bad_rdata())?),
            RecordType::AAAA => RData::Aaaa(rr.data.parse().map_err(|_| bad_rdata())?),
            RecordType::CNAME => RData::Cname(Name::parse(&rr.data).map_err(|_| bad_rdata())?),
            RecordType::NS => RData::Ns(Name::parse(&rr.data).map_err(|_| bad_rdata())?),
            RecordType::TXT => RData::Txt(vec![rr.data.into_bytes()]),
            _ => RData::Unknown { rtype: rr.rtype, data: rr.data.into_bytes() },
        };
        msg.answers.push(ResourceRecord::new(name, rr.ttl, rdata));
    }
    Ok(msg)
}

fn bad_rdata() -> UpstreamError {
    UpstreamError::Transport {
        upstream: "doh-json".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, "unparsable RDATA in JSON answer"),
    }
}
