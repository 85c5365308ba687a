//! Field type registry: kind and widest integer width of every field name.
//!
//! All `hf_*` declarations are generated from here, so every use of a name across
//! all messages has to agree on its kind.

use crate::model::{FieldKind, FieldSpec, ModelError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    pub kind: FieldKind,
    /// Widest width seen for integer fields.
    pub bits: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldTypeRegistry {
    fields: BTreeMap<String, FieldType>,
}

impl Default for FieldTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldTypeRegistry {
    /// Registry holding the 32-bit header fields `type`, `length` and `version`.
    pub fn new() -> Self {
        let mut fields = BTreeMap::new();
        for name in ["type", "length", "version"] {
            fields.insert(
                name.to_string(),
                FieldType {
                    kind: FieldKind::IntDecimal,
                    bits: Some(32),
                },
            );
        }
        FieldTypeRegistry { fields }
    }

    /// Record one use of `name`. Integer widths widen; kinds must agree.
    pub fn register(
        &mut self,
        name: &str,
        kind: FieldKind,
        bits: Option<u32>,
    ) -> Result<(), ModelError> {
        match self.fields.get_mut(name) {
            Some(existing) => {
                if existing.kind != kind {
                    return Err(ModelError::TypeConflict {
                        field: name.to_string(),
                        previous: existing.kind,
                        current: kind,
                    });
                }
                existing.bits = match (existing.bits, bits) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
            }
            None => {
                self.fields.insert(name.to_string(), FieldType { kind, bits });
            }
        }
        Ok(())
    }

    pub fn register_spec(&mut self, spec: &FieldSpec) -> Result<(), ModelError> {
        self.register(&spec.name, spec.kind, spec.width_bits)
    }

    pub fn get(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
