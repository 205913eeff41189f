// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Authoritative zone store: one `Zone` per configured domain, each an
//! atomically-swapped snapshot so readers never block behind a writer.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::ZoneError;
use crate::wire::rdata::Soa;
use crate::wire::record::ResourceRecord;
use crate::wire::record_type::RecordType;
use crate::wire::Name;

const MAX_CNAME_HOPS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
    Add,
    Delete,
    Modify,
}

/// One serial's worth of mutation, retained for IXFR history.
#[derive(Clone, Debug)]
pub struct ZoneChange {
    pub serial: u32,
    pub change_type: ChangeType,
    pub record: ResourceRecord,
}

/// The result of an authoritative lookup within a zone.
pub enum AuthLookup {
    /// Exact qtype match; possibly preceded by a CNAME chain.
    Answer { chain: Vec<ResourceRecord>, records: Vec<ResourceRecord> },
    /// Name exists but not with this qtype: NOERROR + SOA in authority.
    NoData { soa: ResourceRecord },
    /// Name does not exist anywhere in the zone: NXDOMAIN + SOA in authority.
    NxDomain { soa: ResourceRecord },
}

/// An immutable snapshot of one zone's records, keyed by (lower-cased
/// owner name, record type) so lookups never need to scan.
#[derive(Clone, Debug)]
struct ZoneSnapshot {
    soa: Soa,
    enabled: bool,
    records: HashMap<(Name, RecordType), Vec<ResourceRecord>>,
    changes: Vec<ZoneChange>,
}

impl ZoneSnapshot {
    fn soa_record(&self, origin: &Name) -> ResourceRecord {
        ResourceRecord::new(origin.clone(), self.soa.minimum, crate::wire::RData::Soa(self.soa.clone()))
    }
}

/// One authoritative zone. Reads are lock-free against the current
/// snapshot; writes take the mutation lock, bump the serial, and swap.
pub struct Zone {
    pub origin: Name,
    snapshot: ArcSwap<ZoneSnapshot>,
    write_lock: Mutex<()>,
}

impl Zone {
    pub fn new(origin: Name, soa: Soa) -> Self {
        let snapshot = ZoneSnapshot { soa, enabled: true, records: HashMap::new(), changes: Vec::new() };
        Self { origin, snapshot: ArcSwap::new(Arc::new(snapshot)), write_lock: Mutex::new(()) }
    }

    pub fn enabled(&self) -> bool {
        self.snapshot.load().enabled
    }

    pub fn serial(&self) -> u32 {
        self.snapshot.load().soa.serial
    }

    pub fn soa(&self) -> Soa {
        self.snapshot.load().soa.clone()
    }

    /// Resolves `qname`/`qtype` against this zone, per §4.6: follows
    /// CNAME chains up to [`MAX_CNAME_HOPS`], treats the bare zone name
    /// as the apex, and distinguishes NODATA from NXDOMAIN.
    pub fn lookup(&self, qname: &Name, qtype: RecordType) -> AuthLookup {
        let snap = self.snapshot.load();
        let soa_rr = snap.soa_record(&self.origin);

        let mut current = qname.clone();
        let mut chain = Vec::new();
        for _ in 0..=MAX_CNAME_HOPS {
            if qtype != RecordType::CNAME {
                if let Some(records) = snap.records.get(&(current.clone(), qtype)) {
                    return AuthLookup::Answer { chain, records: records.clone() };
                }
            }
            match snap.records.get(&(current.clone(), RecordType::CNAME)) {
                Some(records) if qtype != RecordType::CNAME => {
                    let Some(cname) = records.first() else { break };
                    chain.push(cname.clone());
                    let crate::wire::RData::Cname(target) = &cname.rdata else { break };
                    current = target.clone();
                    continue;
                }
                _ => break,
            }
        }

        if qtype == RecordType::CNAME {
            if let Some(records) = snap.records.get(&(current, RecordType::CNAME)) {
                return AuthLookup::Answer { chain: Vec::new(), records: records.clone() };
            }
        }

        if name_exists(&snap, &current) {
            AuthLookup::NoData { soa: soa_rr }
        } else if chain.is_empty() {
            AuthLookup::NxDomain { soa: soa_rr }
        } else {
            // The chain ended outside this zone or at a dangling target;
            // treat as NODATA since the original qname does resolve here.
            AuthLookup::NoData { soa: soa_rr }
        }
    }

    /// All enabled records in the zone, SOA excluded, for AXFR/IXFR
    /// streaming and repository listing.
    pub fn all_records(&self) -> Vec<ResourceRecord> {
        self.snapshot.load().records.values().flatten().cloned().collect()
    }

    pub fn changes_since(&self, serial: u32) -> Vec<ZoneChange> {
        self.snapshot.load().changes.iter().filter(|c| c.serial > serial).cloned().collect()
    }

    /// Applies one mutation, bumping the serial and recording history.
    /// Takes the write lock so concurrent mutations serialise.
    pub fn apply(&self, change_type: ChangeType, record: ResourceRecord) -> Result<u32, ZoneError> {
        let _guard = self.write_lock.lock();
        let mut next: ZoneSnapshot = (**self.snapshot.load()).clone();
        let key = (record.name.clone(), record.record_type());

        match change_type {
            ChangeType::Add => {
                next.records.entry(key).or_default().push(record.clone());
            }
            ChangeType::Delete => {
                if let Some(bucket) = next.records.get_mut(&key) {
                    bucket.retain(|r| r.rdata != record.rdata);
                    if bucket.is_empty() {
                        next.records.remove(&key);
                    }
                }
            }
            ChangeType::Modify => {
                next.records.insert(key, vec![record.clone()]);
            }
        }

        next.soa.serial = next.soa.serial.wrapping_add(1).max(1);
        let serial = next.soa.serial;
        next.changes.push(ZoneChange { serial, change_type, record });

        self.snapshot.store(Arc::new(next));
        Ok(serial)
    }

    /// Applies every change in one held write lock and a single snapshot
    /// swap, so a batch of RFC 2136 update operations is atomic: either
    /// every change lands together, or (on an error partway through) none
    /// of them are ever visible to a reader. Returns the serial after the
    /// last applied change, or `None` if `changes` was empty.
    pub fn apply_batch(&self, changes: Vec<(ChangeType, ResourceRecord)>) -> Result<Option<u32>, ZoneError> {
        let _guard = self.write_lock.lock();
        let mut next: ZoneSnapshot = (**self.snapshot.load()).clone();
        let mut last_serial = None;

        for (change_type, record) in changes {
            let key = (record.name.clone(), record.record_type());
            match change_type {
                ChangeType::Add => {
                    next.records.entry(key).or_default().push(record.clone());
                }
                ChangeType::Delete => {
                    if let Some(bucket) = next.records.get_mut(&key) {
                        bucket.retain(|r| r.rdata != record.rdata);
                        if bucket.is_empty() {
                            next.records.remove(&key);
                        }
                    }
                }
                ChangeType::Modify => {
                    next.records.insert(key, vec![record.clone()]);
                }
            }

            next.soa.serial = next.soa.serial.wrapping_add(1).max(1);
            let serial = next.soa.serial;
            next.changes.push(ZoneChange { serial, change_type, record });
            last_serial = Some(serial);
        }

        self.snapshot.store(Arc::new(next));
        Ok(last_serial)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let _guard = self.write_lock.lock();
        let mut next: ZoneSnapshot = (**self.snapshot.load()).clone();
        next.enabled = enabled;
        self.snapshot.store(Arc::new(next));
    }
}

fn name_exists(snap: &ZoneSnapshot, name: &Name) -> bool {
    snap.records.keys().any(|(n, _)| n == name)
}

/// The full set of authoritative zones, keyed by origin.
pub struct ZoneStore {
    zones: Mutex<HashMap<Name, Arc<Zone>>>,
}

impl ZoneStore {
    pub fn new() -> Self {
        Self { zones: Mutex::new(HashMap::new()) }
    }

    pub fn insert(&self, zone: Zone) {
        self.zones.lock().insert(zone.origin.clone(), Arc::new(zone));
    }

    pub fn remove(&self, origin: &Name) -> Option<Arc<Zone>> {
        self.zones.lock().remove(origin)
    }

    pub fn get(&self, origin: &Name) -> Option<Arc<Zone>> {
        self.zones.lock().get(origin).cloned()
    }

    /// Returns the most specific enabled zone that `qname` falls within,
    /// i.e. the zone whose origin has the most labels among matches.
    pub fn find_for_name(&self, qname: &Name) -> Option<Arc<Zone>> {
        self.zones
            .lock()
            .values()
            .filter(|z| z.enabled())
            .filter(|z| qname == &z.origin || qname.is_subdomain_of(&z.origin))
            .max_by_key(|z| z.origin.label_count())
            .cloned()
    }

    pub fn list(&self) -> Vec<Arc<Zone>> {
        self.zones.lock().values().cloned().collect()
    }
}

impl Default for ZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::RData;

    fn test_soa(serial: u32) -> Soa {
        Soa {
            mname: Name::parse("ns1.example.com").unwrap(),
            rname: Name::parse("hostmaster.example.com").unwrap(),
            serial,
            refresh: 3600,
            retry: 600,
            expire: 86400,
            minimum: 300,
        }
    }

    #[test]
    fn lookup_finds_exact_match() {
        let origin = Name::parse("example.com").unwrap();
        let zone = Zone::new(origin.clone(), test_soa(1));
        let name = Name::parse("www.example.com").unwrap();
        zone.apply(ChangeType::Add, ResourceRecord::new(name.clone(), 300, RData::A("1.2.3.4".parse().unwrap())))
            .unwrap();

        match zone.lookup(&name, RecordType::A) {
            AuthLookup::Answer { records, .. } => assert_eq!(records.len(), 1),
            _ => panic!("expected answer"),
        }
    }

    #[test]
    fn lookup_nodata_for_wrong_type() {
        let origin = Name::parse("example.com").unwrap();
        let zone = Zone::new(origin.clone(), test_soa(1));
        let name = Name::parse("www.example.com").unwrap();
        zone.apply(ChangeType::Add, ResourceRecord::new(name.clone(), 300, RData::A("1.2.3.4".parse().unwrap())))
            .unwrap();

        match zone.lookup(&name, RecordType::AAAA) {
            AuthLookup::NoData { .. } => {}
            _ => panic!("expected nodata"),
        }
    }

    #[test]
    fn lookup_nxdomain_for_missing_name() {
        let origin = Name::parse("example.com").unwrap();
        let zone = Zone::new(origin, test_soa(1));
        let missing = Name::parse("ghost.example.com").unwrap();
        match zone.lookup(&missing, RecordType::A) {
            AuthLookup::NxDomain { .. } => {}
            _ => panic!("expected nxdomain"),
        }
    }

    #[test]
    fn serial_increments_on_mutation() {
        let origin = Name::parse("example.com").unwrap();
        let zone = Zone::new(origin, test_soa(1));
        let name = Name::parse("www.example.com").unwrap();
        let s1 = zone.apply(ChangeType::Add, ResourceRecord::new(name.clone(), 300, RData::A("1.2.3.4".parse().unwrap()))).unwrap();
        let s2 = zone.apply(ChangeType::Add, ResourceRecord::new(name, 300, RData::A("1.2.3.5".parse().unwrap()))).unwrap();
        assert!(s2 > s1);
    }

    #[test]
    fn cname_chain_is_followed() {
        let origin = Name::parse("example.com").unwrap();
        let zone = Zone::new(origin, test_soa(1));
        let alias = Name::parse("alias.example.com").unwrap();
        let target = Name::parse("target.example.com").unwrap();
        zone.apply(ChangeType::Add, ResourceRecord::new(alias.clone(), 300, RData::Cname(target.clone()))).unwrap();
        zone.apply(ChangeType::Add, ResourceRecord::new(target, 300, RData::A("9.9.9.9".parse().unwrap()))).unwrap();

        match zone.lookup(&alias, RecordType::A) {
            AuthLookup::Answer { chain, records } => {
                assert_eq!(chain.len(), 1);
                assert_eq!(records.len(), 1);
            }
            _ => panic!("expected answer via cname chain"),
        }
    }

    #[test]
    fn apply_batch_is_visible_as_one_swap() {
        let origin = Name::parse("example.com").unwrap();
        let zone = Zone::new(origin, test_soa(1));
        let a = Name::parse("a.example.com").unwrap();
        let b = Name::parse("b.example.com").unwrap();

        let serial = zone
            .apply_batch(vec![
                (ChangeType::Add, ResourceRecord::new(a.clone(), 300, RData::A("1.1.1.1".parse().unwrap()))),
                (ChangeType::Add, ResourceRecord::new(b.clone(), 300, RData::A("2.2.2.2".parse().unwrap()))),
            ])
            .unwrap();

        assert_eq!(serial, Some(zone.serial()));
        assert!(matches!(zone.lookup(&a, RecordType::A), AuthLookup::Answer { .. }));
        assert!(matches!(zone.lookup(&b, RecordType::A), AuthLookup::Answer { .. }));
        assert_eq!(zone.changes_since(1).len(), 2);
    }
}
