// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNSSEC validation: canonical RRset assembly, key parsing, and the
//! RRSIG/DS/NSEC verification procedures built on top of them.

pub mod canonical;
pub mod keys;
pub mod validator;

pub use validator::{ds_digest, validate_response, verify_rrset, walk_chain_of_trust, TrustAnchor, ValidationState};
