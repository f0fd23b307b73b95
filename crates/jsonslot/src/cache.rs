//! Per-type field metadata.
//!
//! A [`FieldMap`] maps wire names to [`Slot`] descriptors for one record
//! type. Maps are built from [`Record::schema`] the first time a type is
//! decoded, published into a process-wide table, and never mutated again.

use core::any::TypeId;
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use tracing::{debug, warn};

use crate::schema::{Kind, Record, Schema};

/// Where one wire name lands in its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Position accepted by [`Record::field_mut`].
    pub index: usize,
    /// Wire name.
    pub name: &'static str,
    /// Declared kind.
    pub kind: Kind,
    /// Whether the field is an `Option<T>`.
    pub nullable: bool,
}

/// Wire-name lookup table for one record type.
#[derive(Debug)]
pub struct FieldMap {
    type_name: &'static str,
    slots: HashMap<Box<[u8]>, Slot>,
}

impl FieldMap {
    /// Builds the table for `schema`.
    ///
    /// If two fields share a wire name the later one wins.
    #[must_use]
    pub fn build(schema: Schema) -> Self {
        let mut slots = HashMap::with_capacity(schema.fields.len());
        for (index, def) in schema.fields.iter().enumerate() {
            let slot = Slot {
                index,
                name: def.name,
                kind: def.kind,
                nullable: def.nullable,
            };
            if slots.insert(def.name.as_bytes().into(), slot).is_some() {
                warn!(
                    type_name = schema.type_name,
                    field = def.name,
                    "duplicate wire name"
                );
            }
        }
        Self {
            type_name: schema.type_name,
            slots,
        }
    }

    /// Looks a raw wire name up.
    #[must_use]
    pub fn get(&self, name: &[u8]) -> Option<Slot> {
        self.slots.get(name).copied()
    }

    /// Number of distinct wire names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the type declares no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rust name of the described type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

type Table = RwLock<HashMap<TypeId, Arc<FieldMap>>>;

static TYPES: OnceLock<Table> = OnceLock::new();

/// Returns the shared field map of `T`, building it on first use.
///
/// Concurrent first calls may each build a map, but only the first one to
/// take the write lock is published and every caller receives that one.
pub fn resolve<T: Record>() -> Arc<FieldMap> {
    let table = TYPES.get_or_init(Table::default);
    let key = TypeId::of::<T>();
    if let Some(map) = table
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&key)
    {
        return Arc::clone(map);
    }

    let built = Arc::new(FieldMap::build(T::schema()));
    let mut types = table.write().unwrap_or_else(PoisonError::into_inner);
    let map = types.entry(key).or_insert_with(|| {
        debug!(
            type_name = built.type_name(),
            fields = built.len(),
            "published field map"
        );
        Arc::clone(&built)
    });
    Arc::clone(map)
}

/// Decoder-local memo in front of the global table, so repeat decodes skip
/// the shared lock.
#[derive(Debug, Default)]
pub(crate) struct LocalCache {
    maps: HashMap<TypeId, Arc<FieldMap>>,
}

impl LocalCache {
    pub(crate) fn get(&mut self, record: &dyn Record) -> Arc<FieldMap> {
        Arc::clone(
            self.maps
                .entry(record.type_key())
                .or_insert_with(|| record.field_map()),
        )
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.maps.len()
    }
}
