// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error taxonomy for the resolver core.
//!
//! Every subsystem gets its own error enum; [`ServerError`] unifies them for
//! callers that need to convert a failure into a wire-level RCODE (see
//! [`crate::wire::ResponseCode`]).

use thiserror::Error;

use crate::wire::ResponseCode;

/// Errors raised while decoding or encoding DNS wire messages.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of buffer at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("compression pointer at offset {offset} points forward or out of bounds")]
    BadPointer { offset: usize },
    #[error("compression pointer loop detected at offset {offset}")]
    PointerLoop { offset: usize },
    #[error("label exceeds 63 octets")]
    LabelTooLong,
    #[error("name exceeds 255 octets")]
    NameTooLong,
    #[error("rdata length {0} does not match the record's declared type")]
    BadRdata(&'static str),
    #[error("message would exceed the maximum encodable size")]
    MessageTooLarge,
}

/// Errors raised by the response cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache entry expired")]
    Expired,
}

/// Errors raised by the upstream forwarding layer.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no upstreams configured")]
    NoUpstreams,
    #[error("all {attempted} candidate upstream(s) failed")]
    AllFailed { attempted: usize },
    #[error("upstream {0} timed out")]
    Timeout(String),
    #[error("transport error talking to {upstream}: {source}")]
    Transport {
        upstream: String,
        #[source]
        source: std::io::Error,
    },
    #[error("upstream {0} is temporarily disabled after repeated failures")]
    Disabled(String),
}

/// Errors raised by the authoritative zone engine.
#[derive(Debug, Error)]
pub enum ZoneError {
    #[error("zone {0} not found")]
    NotFound(String),
    #[error("zone {0} already exists")]
    AlreadyExists(String),
    #[error("TSIG verification failed: {0}")]
    TsigFailed(&'static str),
    #[error("transfer peer not authorised")]
    NotAuthorised,
    #[error("update prerequisite failed: {0}")]
    PrerequisiteFailed(String),
}

/// Errors raised by the DNSSEC validator.
#[derive(Debug, Error)]
pub enum DnssecError {
    #[error("no covering RRSIG found for the answered RRset")]
    NoSignature,
    #[error("RRSIG validity window does not include the current time")]
    NotYetValidOrExpired,
    #[error("signature verification failed")]
    BadSignature,
    #[error("DS chain of trust could not be established (depth {depth})")]
    ChainBroken { depth: u8 },
    #[error("algorithm {0} is not supported")]
    UnsupportedAlgorithm(u8),
    #[error("NSEC/NSEC3 denial-of-existence proof missing or invalid")]
    BadDenialProof,
}

/// Errors raised by the persistence / repository layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Top level error type, convertible to a wire RCODE for any request path.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("malformed request")]
    FormatError,
    #[error("policy denied the request: {0}")]
    PolicyDenied(&'static str),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Zone(#[from] ZoneError),
    #[error(transparent)]
    Dnssec(#[from] DnssecError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Maps an error to the RCODE that should be placed on the wire, per
    /// the taxonomy in the error-handling design.
    pub fn to_rcode(&self) -> ResponseCode {
        match self {
            Self::FormatError | Self::Codec(_) => ResponseCode::FormErr,
            Self::PolicyDenied(_) => ResponseCode::Refused,
            Self::Upstream(_) | Self::Dnssec(_) | Self::Storage(_) | Self::Internal(_) => {
                ResponseCode::ServFail
            }
            Self::Zone(ZoneError::NotAuthorised) => ResponseCode::NotAuth,
            Self::Zone(_) => ResponseCode::ServFail,
        }
    }
}

/// Config-loading failures; a non-zero process exit follows these (exit
/// code 1, see the environment section of the external interfaces).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}
