// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Server surfaces: one submodule per transport (UDP, TCP, DoT, DoQ,
//! DoH, plus the zone-transfer/DDNS path shared by the stream
//! transports), all converting their wire framing into the
//! [`crate::pipeline::Request`]/[`crate::pipeline::Response`] contract
//! and sharing one [`Arc<Pipeline>`].

pub mod dot;
pub mod doh;
pub mod doq;
pub mod tcp;
pub mod udp;
pub mod xfr;

use std::sync::Arc;

use tracing::info;

use crate::pipeline::{Pipeline, Request, Response};

/// Runs a decoded request through the pipeline, persists its query log
/// row, and emits the one-line summary every transport's listener shares.
async fn resolve_and_log(pipeline: &Arc<Pipeline>, request: Request) -> Response {
    let (response, log_entry) = pipeline.resolve(request).await;
    info!(
        client = %log_entry.client_display,
        qname = %log_entry.qname,
        qtype = log_entry.qtype,
        rcode = log_entry.rcode,
        blocked = log_entry.blocked,
        cached = log_entry.cached,
        response_time_ms = log_entry.response_time.as_millis() as u64,
        "query"
    );
    pipeline.persist_log(&log_entry).await;
    response
}
