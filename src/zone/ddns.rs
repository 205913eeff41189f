// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Dynamic updates (RFC 2136, opcode UPDATE): prerequisite checks and
//! record mutations applied as one atomic batch per zone.

use std::sync::Arc;

use crate::error::ZoneError;
use crate::wire::record::ResourceRecord;
use crate::wire::record_type::RecordType;
use crate::wire::Name;
use crate::zone::store::{ChangeType, Zone};

/// A single RFC 2136 prerequisite, checked before any update is applied.
pub enum Prerequisite {
    /// RRset must exist (any RDATA), regardless of type-specific value.
    RrsetExists { name: Name, rtype: RecordType },
    /// RRset of this exact name/type/RDATA must exist.
    RrsetExistsWithData { name: Name, rtype: RecordType, rdata: crate::wire::RData },
    /// No RRset of this name/type may exist.
    RrsetDoesNotExist { name: Name, rtype: RecordType },
    /// The name must exist, with any type.
    NameInUse { name: Name },
    /// The name must not exist, with any type.
    NameNotInUse { name: Name },
}

/// One RFC 2136 update operation.
pub enum UpdateOp {
    Add(ResourceRecord),
    DeleteRrset { name: Name, rtype: RecordType },
    DeleteRr(ResourceRecord),
    DeleteAll { name: Name },
}

/// Checks every prerequisite against the zone's current state. All must
/// hold before any update in the batch is applied.
fn check_prerequisites(zone: &Arc<Zone>, prereqs: &[Prerequisite]) -> Result<(), ZoneError> {
    let all = zone.all_records();
    for p in prereqs {
        let ok = match p {
            Prerequisite::RrsetExists { name, rtype } => all.iter().any(|r| r.name == *name && r.record_type() == *rtype),
            Prerequisite::RrsetExistsWithData { name, rtype, rdata } => {
                all.iter().any(|r| r.name == *name && r.record_type() == *rtype && r.rdata == *rdata)
            }
            Prerequisite::RrsetDoesNotExist { name, rtype } => !all.iter().any(|r| r.name == *name && r.record_type() == *rtype),
            Prerequisite::NameInUse { name } => all.iter().any(|r| r.name == *name),
            Prerequisite::NameNotInUse { name } => !all.iter().any(|r| r.name == *name),
        };
        if !ok {
            return Err(ZoneError::PrerequisiteFailed(format!("{:?} not satisfied", prereq_name(p))));
        }
    }
    Ok(())
}

fn prereq_name(p: &Prerequisite) -> &'static str {
    match p {
        Prerequisite::RrsetExists { .. } => "RrsetExists",
        Prerequisite::RrsetExistsWithData { .. } => "RrsetExistsWithData",
        Prerequisite::RrsetDoesNotExist { .. } => "RrsetDoesNotExist",
        Prerequisite::NameInUse { .. } => "NameInUse",
        Prerequisite::NameNotInUse { .. } => "NameNotInUse",
    }
}

/// Applies an RFC 2136 update batch atomically: every prerequisite must
/// hold, then the whole set of record mutations it expands to is staged
/// against a single zone snapshot and swapped in once, so a failure
/// partway through can never leave some of the batch live while the rest
/// is refused. Callers are expected to have already authenticated the
/// request via mandatory TSIG before calling this.
pub fn apply_update(zone: &Arc<Zone>, prereqs: &[Prerequisite], updates: Vec<UpdateOp>) -> Result<u32, ZoneError> {
    check_prerequisites(zone, prereqs)?;

    let current = zone.all_records();
    let mut changes = Vec::new();
    for op in updates {
        match op {
            UpdateOp::Add(record) => changes.push((ChangeType::Add, record)),
            UpdateOp::DeleteRr(record) => changes.push((ChangeType::Delete, record)),
            UpdateOp::DeleteRrset { name, rtype } => {
                for record in current.iter().filter(|r| r.name == name && r.record_type() == rtype).cloned() {
                    changes.push((ChangeType::Delete, record));
                }
            }
            UpdateOp::DeleteAll { name } => {
                for record in current.iter().filter(|r| r.name == name).cloned() {
                    changes.push((ChangeType::Delete, record));
                }
            }
        }
    }

    match zone.apply_batch(changes)? {
        Some(serial) => Ok(serial),
        None => Ok(zone.serial()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::rdata::Soa;
    use crate::wire::RData;

    fn zone() -> Arc<Zone> {
        let origin = Name::parse("example.com").unwrap();
        let soa = Soa {
            mname: Name::parse("ns1.example.com").unwrap(),
            rname: Name::parse("hostmaster.example.com").unwrap(),
            serial: 1,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 300,
        };
        Arc::new(Zone::new(origin, soa))
    }

    #[test]
    fn update_applies_when_prerequisites_hold() {
        let z = zone();
        let name = Name::parse("host.example.com").unwrap();
        let record = ResourceRecord::new(name.clone(), 300, RData::A("1.2.3.4".parse().unwrap()));
        let result = apply_update(&z, &[Prerequisite::NameNotInUse { name: name.clone() }], vec![UpdateOp::Add(record)]);
        assert!(result.is_ok());
        assert!(z.all_records().iter().any(|r| r.name == name));
    }

    #[test]
    fn batch_is_staged_against_one_snapshot() {
        let z = zone();
        let name = Name::parse("host.example.com").unwrap();
        let first = ResourceRecord::new(name.clone(), 300, RData::A("1.2.3.4".parse().unwrap()));
        let second = ResourceRecord::new(name.clone(), 300, RData::A("5.6.7.8".parse().unwrap()));

        let starting_serial = z.serial();
        let result = apply_update(&z, &[], vec![UpdateOp::Add(first.clone()), UpdateOp::Add(second.clone())]);
        assert!(result.is_ok());

        // Both records from the batch are live, under a serial that moved
        // exactly once per update, not left partially applied.
        let records: Vec<_> = z.all_records().into_iter().filter(|r| r.name == name).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(z.serial(), starting_serial + 2);
        assert_eq!(z.changes_since(starting_serial).len(), 2);
    }

    #[test]
    fn update_refused_when_prerequisite_fails() {
        let z = zone();
        let name = Name::parse("host.example.com").unwrap();
        let result = apply_update(&z, &[Prerequisite::NameInUse { name: name.clone() }], vec![]);
        assert!(result.is_err());
    }
}
