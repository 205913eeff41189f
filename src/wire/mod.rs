// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The DNS wire codec: pure parse/serialise functions, no I/O, no shared
//! state. Everything under this module operates on owned, canonicalised
//! in-memory types; wire format is only ever materialised by `encode`.

pub mod codec;
pub mod edns;
pub mod header;
pub mod message;
pub mod name;
pub mod rdata;
pub mod record;
pub mod record_type;

pub use edns::Edns;
pub use header::{Header, MessageType, OpCode, ResponseCode};
pub use message::Message;
pub use name::Name;
pub use rdata::{RData, Soa, SvcParam};
pub use record::{DnsClass, Question, ResourceRecord};
pub use record_type::RecordType;
