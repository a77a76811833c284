//! Entity records and their secondary indices.
//!
//! The [`EntityRegistry`] owns the set of live entity identifiers and, for each
//! one, an [`EntityRecord`] with a display name and a tag set. Two [`Index`]es
//! (`entities_by_name`, `entities_by_tag`) are kept in lockstep with every
//! name and tag mutation so lookups never scan the whole registry.
//!
//! Insertion and removal are crate-private: only the
//! [`Manager`](crate::manager::Manager) adds or deletes entities, because those
//! mutations fire lifecycle hooks. Metadata setters are public.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::index::{Index, Values};
use crate::EcsError;

/// Name given to entities that were never named.
pub const DEFAULT_ENTITY_NAME: &str = "unnamed entity";

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Metadata for one live entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    id: Identifier,
    name: String,
    tags: BTreeSet<String>,
}

impl EntityRecord {
    /// The entity's identifier.
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag set, in sorted order.
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// Live entities plus name and tag indices.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    records: HashMap<Identifier, EntityRecord>,
    /// Name -> entities carrying it.
    by_name: Index<String, Identifier>,
    /// Tag -> entities carrying it.
    by_tag: Index<String, Identifier>,
    default_name: String,
}

impl EntityRegistry {
    /// Create an empty registry whose entities start out named `default_name`.
    pub fn new(default_name: impl Into<String>) -> Self {
        Self {
            records: HashMap::new(),
            by_name: Index::new(),
            by_tag: Index::new(),
            default_name: default_name.into(),
        }
    }

    /// Register `id` with the default name and no tags.
    ///
    /// Returns `false` (and changes nothing) if `id` is already live.
    pub(crate) fn insert(&mut self, id: Identifier) -> bool {
        if self.records.contains_key(&id) {
            return false;
        }
        self.by_name.add(self.default_name.clone(), id.clone());
        self.records.insert(
            id.clone(),
            EntityRecord {
                id,
                name: self.default_name.clone(),
                tags: BTreeSet::new(),
            },
        );
        true
    }

    /// Unregister `id`, dropping it from both indices.
    pub(crate) fn remove(&mut self, id: &str) -> Option<EntityRecord> {
        let record = self.records.remove(id)?;
        self.by_name.delete(record.name.as_str(), id);
        for tag in &record.tags {
            self.by_tag.delete(tag.as_str(), id);
        }
        Some(record)
    }

    // -- reads --------------------------------------------------------------

    /// Whether `id` is a live entity.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no entity is live.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live entity identifiers, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.records.keys()
    }

    /// Full record of `id`.
    pub fn record(&self, id: &str) -> Option<&EntityRecord> {
        self.records.get(id)
    }

    /// Display name of `id`.
    pub fn get_name_of(&self, id: &str) -> Option<&str> {
        self.records.get(id).map(|record| record.name.as_str())
    }

    /// Tag set of `id`.
    pub fn get_tags_of(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.records.get(id).map(|record| &record.tags)
    }

    /// Tags of `id`; empty for an unknown entity.
    pub fn tags(&self, id: &str) -> impl Iterator<Item = &str> + '_ {
        self.records
            .get(id)
            .into_iter()
            .flat_map(|record| record.tags.iter().map(String::as_str))
    }

    /// Entities currently named `name`.
    pub fn entities_named(&self, name: &str) -> Values<'_, Identifier> {
        self.by_name.values(name)
    }

    /// Entities currently tagged `tag`.
    pub fn entities_tagged(&self, tag: &str) -> Values<'_, Identifier> {
        self.by_tag.values(tag)
    }

    /// The name index.
    pub fn name_index(&self) -> &Index<String, Identifier> {
        &self.by_name
    }

    /// The tag index.
    pub fn tag_index(&self) -> &Index<String, Identifier> {
        &self.by_tag
    }

    // -- metadata writes ----------------------------------------------------

    /// Rename `id`, moving it between name buckets. Renaming to the current
    /// name is a no-op.
    pub fn set_name_of(&mut self, id: &str, name: impl Into<String>) -> Result<(), EcsError> {
        let name = name.into();
        let record = lookup(&mut self.records, id)?;
        if record.name == name {
            return Ok(());
        }
        let old = std::mem::replace(&mut record.name, name.clone());
        let key = record.id.clone();
        self.by_name.delete(old.as_str(), id);
        self.by_name.add(name, key);
        Ok(())
    }

    /// Add `tags` to `id`. Returns how many were not already present.
    pub fn add_tags_to<I, T>(&mut self, id: &str, tags: I) -> Result<usize, EcsError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let record = lookup(&mut self.records, id)?;
        let key = record.id.clone();
        let mut added = 0;
        for tag in tags {
            let tag = tag.into();
            if record.tags.insert(tag.clone()) {
                self.by_tag.add(tag, key.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove `tags` from `id`. Returns how many were actually present.
    pub fn delete_tags_of<I, T>(&mut self, id: &str, tags: I) -> Result<usize, EcsError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let record = lookup(&mut self.records, id)?;
        let mut removed = 0;
        for tag in tags {
            let tag = tag.as_ref();
            if record.tags.remove(tag) {
                self.by_tag.delete(tag, id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every tag from `id`. Returns how many were removed.
    pub fn clear_tags_of(&mut self, id: &str) -> Result<usize, EcsError> {
        let record = lookup(&mut self.records, id)?;
        let tags = std::mem::take(&mut record.tags);
        for tag in &tags {
            self.by_tag.delete(tag.as_str(), id);
        }
        Ok(tags.len())
    }
}

fn lookup<'a>(
    records: &'a mut HashMap<Identifier, EntityRecord>,
    id: &str,
) -> Result<&'a mut EntityRecord, EcsError> {
    records.get_mut(id).ok_or_else(|| EcsError::UnknownEntity {
        entity: Identifier::from(id),
    })
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ENTITY_NAME)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
