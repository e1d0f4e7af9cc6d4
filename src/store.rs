// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Thread-safe in-memory table of DNS resource records.
//!
//! Records are grouped by `(type, name)`. A group holds every record added for that
//! key, in insertion order, so a name can carry several addresses and answers
//! come back round-robin capable. Re-adding an existing value creates a duplicate;
//! callers replace a value by removing the group first.
//!
//! Names are normalized to lowercase fully-qualified form before storage and lookup,
//! so `"Host"`, `"host"` and `"host."` all address the same group.
//!
//! # Locking
//!
//! Point lookups take the shared lock; mutations and full listings take the
//! exclusive lock. Query traffic is read-heavy and cluster changes are rare.
//!
//! # Example
//!
//! ```rust
//! use kube_local_dns::store::RecordStore;
//! use hickory_proto::rr::RecordType;
//!
//! let store = RecordStore::default();
//! store.add_a("web.example.com", "10.0.0.1").unwrap();
//!
//! let records = store.get_resource_record("web.example.com.", RecordType::A).unwrap();
//! assert_eq!(records.len(), 1);
//! ```

use crate::constants::{DEFAULT_RECORD_TTL_SECS, MAX_DOMAIN_NAME_LEN, MAX_LABEL_LEN};
use crate::dns_errors::StoreError;
use hickory_proto::rr::rdata::{A, AAAA, CNAME};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};

type Groups = HashMap<RecordType, HashMap<String, Vec<Record>>>;

/// In-memory resource record table.
#[derive(Debug)]
pub struct RecordStore {
    records: RwLock<Groups>,
    ttl: u32,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_TTL_SECS)
    }
}

impl RecordStore {
    /// Create an empty store whose records all carry `ttl`.
    #[must_use]
    pub fn new(ttl: u32) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Add an A record.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a legal domain name or `ipv4` is not
    /// an IPv4 literal.
    pub fn add_a(&self, name: &str, ipv4: &str) -> Result<(), StoreError> {
        let (key, owner) = normalize_name(name)?;
        let addr = parse_address(name, ipv4)?;
        let IpAddr::V4(addr) = addr else {
            return Err(family_mismatch(name, RecordType::A, ipv4));
        };
        self.insert_address_v4(key, owner, addr);
        Ok(())
    }

    /// Add an AAAA record.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a legal domain name or `ipv6` is not
    /// an IPv6 literal.
    pub fn add_aaaa(&self, name: &str, ipv6: &str) -> Result<(), StoreError> {
        let (key, owner) = normalize_name(name)?;
        let addr = parse_address(name, ipv6)?;
        let IpAddr::V6(addr) = addr else {
            return Err(family_mismatch(name, RecordType::AAAA, ipv6));
        };
        self.insert_address_v6(key, owner, addr);
        Ok(())
    }

    /// Add an A or AAAA record depending on the family of `ip`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or `ip` does not parse.
    pub fn add_host(&self, name: &str, ip: &str) -> Result<(), StoreError> {
        match parse_address(name, ip)? {
            IpAddr::V4(_) => self.add_a(name, ip),
            IpAddr::V6(_) => self.add_aaaa(name, ip),
        }
    }

    /// Add a CNAME record pointing `name` at `target`.
    ///
    /// A target given without a trailing dot is coerced to fully-qualified form.
    ///
    /// # Errors
    ///
    /// Returns an error if either name is not a legal domain name.
    pub fn add_cname(&self, name: &str, target: &str) -> Result<(), StoreError> {
        let (key, owner) = normalize_name(name)?;
        if !target.ends_with('.') {
            warn!(
                host = %name,
                target = %target,
                "CNAME target is not fully qualified; appending root label"
            );
        }
        let (_, target_name) = normalize_name(target)?;
        let record = Record::from_rdata(owner, self.ttl, RData::CNAME(CNAME(target_name)));
        self.insert(RecordType::CNAME, key, record);
        Ok(())
    }

    /// Remove every record of `record_type` for `name`.
    ///
    /// Removing a group that does not exist is a no-op. Emptied groups are pruned
    /// at both levels so absence of a key always means "no records".
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a legal domain name.
    pub fn remove_resource_record(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<(), StoreError> {
        let (key, _) = normalize_name(name)?;
        let mut records = self.records.write();
        if let Some(by_name) = records.get_mut(&record_type) {
            if let Some(removed) = by_name.remove(&key) {
                debug!(
                    host = %key,
                    record_type = %record_type,
                    count = removed.len(),
                    "Removed resource records"
                );
            }
            if by_name.is_empty() {
                records.remove(&record_type);
            }
        }
        Ok(())
    }

    /// Exact-match lookup of the records for `(name, record_type)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no records exist for the key, or a
    /// validation error when the name is malformed.
    pub fn get_resource_record(
        &self,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<Record>, StoreError> {
        let (key, _) = normalize_name(name)?;
        let records = self.records.read();
        records
            .get(&record_type)
            .and_then(|by_name| by_name.get(&key))
            .cloned()
            .ok_or(StoreError::NotFound {
                name: key,
                record_type,
            })
    }

    /// Flatten the whole store. Order is unspecified.
    #[must_use]
    pub fn list_rrs(&self) -> Vec<Record> {
        let records = self.records.write();
        records
            .values()
            .flat_map(HashMap::values)
            .flatten()
            .cloned()
            .collect()
    }

    /// Returns true if any group of `record_type` exists.
    #[must_use]
    pub fn has_type(&self, record_type: RecordType) -> bool {
        self.records.read().contains_key(&record_type)
    }

    fn insert_address_v4(&self, key: String, owner: Name, addr: Ipv4Addr) {
        let record = Record::from_rdata(owner, self.ttl, RData::A(A(addr)));
        self.insert(RecordType::A, key, record);
    }

    fn insert_address_v6(&self, key: String, owner: Name, addr: Ipv6Addr) {
        let record = Record::from_rdata(owner, self.ttl, RData::AAAA(AAAA(addr)));
        self.insert(RecordType::AAAA, key, record);
    }

    fn insert(&self, record_type: RecordType, key: String, record: Record) {
        debug!(host = %key, record_type = %record_type, "Adding resource record");
        self.records
            .write()
            .entry(record_type)
            .or_default()
            .entry(key)
            .or_default()
            .push(record);
    }
}

/// Normalize `name` to lowercase FQDN form and validate its syntax.
///
/// Returns the map key together with the parsed [`Name`].
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] when the name is empty, too long, or has a
/// label that is empty, too long, or contains characters outside letters, digits,
/// `-` and `_`. A single leading `*` label is accepted for wildcard hosts.
pub fn normalize_name(name: &str) -> Result<(String, Name), StoreError> {
    let invalid = |reason: &str| StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(invalid("name is empty"));
    }
    if trimmed.len() > MAX_DOMAIN_NAME_LEN {
        return Err(invalid("name exceeds 253 characters"));
    }

    for (index, label) in trimmed.split('.').enumerate() {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label exceeds 63 characters"));
        }
        if label == "*" && index == 0 {
            continue;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("label starts or ends with '-'"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid("label contains illegal characters"));
        }
    }

    let key = format!("{}.", trimmed.to_ascii_lowercase());
    let parsed = Name::from_ascii(&key).map_err(|e| invalid(&e.to_string()))?;
    Ok((key, parsed))
}

fn parse_address(name: &str, value: &str) -> Result<IpAddr, StoreError> {
    value.trim().parse().map_err(|_| StoreError::InvalidAddress {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn family_mismatch(name: &str, expected: RecordType, value: &str) -> StoreError {
    StoreError::AddressFamilyMismatch {
        name: name.to_string(),
        expected,
        value: value.to_string(),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
