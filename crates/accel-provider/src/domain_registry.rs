// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Opset versions observed by one provider instance.

use crate::ProviderError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Append-only map from operator domain to opset version.
///
/// The first graph a provider sees fixes the version of each of its
/// domains. A later graph importing a different version of a recorded
/// domain is a fatal error.
#[derive(Debug, Default)]
pub struct DomainVersionRegistry {
    versions: Mutex<HashMap<String, i64>>,
}

impl DomainVersionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `domain` at `version`, or checks it against the recorded one.
    pub fn record(&self, domain: &str, version: i64) -> Result<(), ProviderError> {
        self.record_all(&BTreeMap::from([(domain.to_string(), version)]))
    }

    /// Records every entry of a graph's domain map.
    ///
    /// All entries are checked before any is inserted, so a conflict leaves
    /// the registry unchanged.
    pub fn record_all(&self, domains: &BTreeMap<String, i64>) -> Result<(), ProviderError> {
        let mut versions = self
            .versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (domain, &observed) in domains {
            if let Some(&recorded) = versions.get(domain) {
                if recorded != observed {
                    return Err(ProviderError::InconsistentDomainVersion {
                        domain: domain.clone(),
                        recorded,
                        observed,
                    });
                }
            }
        }

        for (domain, &version) in domains {
            if !versions.contains_key(domain) {
                tracing::debug!("recording opset {version} for domain '{domain}'");
                versions.insert(domain.clone(), version);
            }
        }
        Ok(())
    }

    pub fn get(&self, domain: &str) -> Option<i64> {
        self.versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(domain)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let r = DomainVersionRegistry::new();
        r.record("", 17).unwrap();
        assert_eq!(r.get(""), Some(17));
        assert_eq!(r.get("com.example"), None);
    }

    #[test]
    fn test_same_version_is_ok() {
        let r = DomainVersionRegistry::new();
        r.record("", 17).unwrap();
        r.record("", 17).unwrap();
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_conflict_is_fatal() {
        let r = DomainVersionRegistry::new();
        r.record("", 13).unwrap();
        let err = r.record("", 17).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::InconsistentDomainVersion {
                recorded: 13,
                observed: 17,
                ..
            }
        ));
        assert!(err.to_string().contains("one provider instance"));
        assert_eq!(r.get(""), Some(13));
    }

    #[test]
    fn test_record_all() {
        let r = DomainVersionRegistry::new();
        let mut map = BTreeMap::new();
        map.insert(String::new(), 17);
        map.insert("com.example".to_string(), 1);
        r.record_all(&map).unwrap();
        assert_eq!(r.len(), 2);

        map.insert("com.example".to_string(), 2);
        assert!(r.record_all(&map).is_err());
    }

    #[test]
    fn test_conflict_leaves_registry_unchanged() {
        let r = DomainVersionRegistry::new();
        r.record("com.late", 1).unwrap();

        // "" and "ai.early" sort before the conflicting "com.late".
        let mut map = BTreeMap::new();
        map.insert(String::new(), 17);
        map.insert("ai.early".to_string(), 3);
        map.insert("com.late".to_string(), 2);
        assert!(r.record_all(&map).is_err());

        assert_eq!(r.len(), 1);
        assert_eq!(r.get(""), None);
        assert_eq!(r.get("ai.early"), None);
        assert_eq!(r.get("com.late"), Some(1));
    }
}
