//! Natural-key identity resolution.
//!
//! Local ids differ between devices and change when an entity is
//! re-imported. References are therefore stored by natural key, and the
//! cached local id of every reference is re-derived from the current store
//! contents on every run. Nothing here is persisted between runs.

use crate::config::SyncKinds;
use crate::error::Result;
use boothsync_storage::{EntityRecord, LocalStateStore};
use boothsync_types::{EntityKind, LocalId, NaturalKey};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Outcome of looking up a natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(LocalId),
    /// No local entity has this key (yet).
    Missing,
    /// Several local entities share this key. Never guessed.
    Unresolved(Vec<LocalId>),
}

/// Link between a natural key and the ids that stand for it during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMapping {
    pub natural_key: NaturalKey,
    pub local_id: LocalId,
    /// Id the uploading device used for the same entity, when known.
    pub remote_referenced_id: Option<LocalId>,
}

/// Result of rewriting one record's references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewrite {
    pub mappings: Vec<IdentityMapping>,
    /// Targets that could not be resolved because of duplicates.
    pub conflicts: BTreeMap<NaturalKey, Vec<LocalId>>,
    /// True if any cached local id changed.
    pub changed: bool,
}

/// A conflict found during a full identity pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceConflict {
    /// The entity holding the reference.
    pub referrer: NaturalKey,
    pub target: NaturalKey,
    pub candidates: Vec<LocalId>,
}

/// Summary of a full identity pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records whose references were rewritten and saved.
    pub rewritten: Vec<NaturalKey>,
    pub mappings: Vec<IdentityMapping>,
    pub conflicts: Vec<ReferenceConflict>,
}

/// Resolves natural keys against a local store.
///
/// Lookups are cached for the lifetime of the resolver, so create one per
/// pass.
pub struct IdentityResolver<'a> {
    store: &'a dyn LocalStateStore,
    cache: HashMap<NaturalKey, Resolution>,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a dyn LocalStateStore) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// Looks up the local id of `(kind, name)`.
    pub fn resolve(&mut self, kind: EntityKind, name: &str) -> Result<Resolution> {
        let key = NaturalKey::new(kind, name);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let mut ids: Vec<LocalId> = self
            .store
            .find_by_name(kind, name)?
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        ids.sort();
        let resolution = match ids.as_slice() {
            [] => Resolution::Missing,
            [id] => Resolution::Resolved(*id),
            _ => Resolution::Unresolved(ids),
        };
        self.cache.insert(key, resolution.clone());
        Ok(resolution)
    }

    /// Forgets cached lookups, e.g. after the store changed.
    pub fn invalidate(&mut self, key: &NaturalKey) {
        self.cache.remove(key);
    }

    /// Points every reference of `record` at the current local id of its
    /// target.
    ///
    /// Missing targets and duplicated targets are left unresolved
    /// (`local_id = None`) so a stale id can never survive. `remote_ids`
    /// supplies the uploader's ids for the mappings.
    pub fn rewrite_references(
        &mut self,
        record: &mut EntityRecord,
        remote_ids: &BTreeMap<NaturalKey, LocalId>,
    ) -> Result<Rewrite> {
        let mut rewrite = Rewrite::default();
        for reference in &mut record.references {
            let target = reference.target();
            let new_id = match self.resolve(reference.kind, &reference.name)? {
                Resolution::Resolved(id) => {
                    rewrite.mappings.push(IdentityMapping {
                        natural_key: target.clone(),
                        local_id: id,
                        remote_referenced_id: remote_ids.get(&target).copied(),
                    });
                    Some(id)
                }
                Resolution::Missing => None,
                Resolution::Unresolved(candidates) => {
                    rewrite.conflicts.insert(target.clone(), candidates);
                    None
                }
            };
            if reference.local_id != new_id {
                debug!(
                    "{} -> {}: local id {:?} -> {:?}",
                    record.name, target, reference.local_id, new_id
                );
                reference.local_id = new_id;
                rewrite.changed = true;
            }
        }
        Ok(rewrite)
    }

    /// Rewrites references across every enabled kind and saves the records
    /// that changed. Version and modification stamps are left alone; local
    /// ids are not part of the content hash.
    pub fn reconcile_all(&mut self, kinds: &SyncKinds) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for kind in kinds.enabled() {
            for mut record in self.store.list(kind)? {
                if record.references.is_empty() {
                    continue;
                }
                let rewrite = self.rewrite_references(&mut record, &BTreeMap::new())?;
                let referrer = record.natural_key();
                for (target, candidates) in rewrite.conflicts {
                    warn!(
                        "{} references {} which has duplicates {:?}",
                        referrer, target, candidates
                    );
                    report.conflicts.push(ReferenceConflict {
                        referrer: referrer.clone(),
                        target,
                        candidates,
                    });
                }
                report.mappings.extend(rewrite.mappings);
                if rewrite.changed {
                    self.store.upsert(record)?;
                    report.rewritten.push(referrer);
                }
            }
        }
        Ok(report)
    }
}
