//! Value dictionaries: symbolic names for integer constants, used to render enumerated
//! fields (`val_to_str`).

use crate::model::ModelError;
use std::collections::BTreeMap;

/// Name of the built-in dictionary listing every message identifier.
pub const MESSAGE_TYPE_DICTIONARY: &str = "type";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dictionary {
    /// Constant names listed in the input, in declaration order.
    Inline(Vec<String>),
    /// Entries provided by `dict_<name>-inl.h` at build time of the dissector.
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictionaryTable {
    tables: BTreeMap<String, Dictionary>,
}

impl DictionaryTable {
    /// Table with the message-type dictionary and the given external dictionaries.
    pub fn new<I, S>(external: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tables = BTreeMap::new();
        tables.insert(
            MESSAGE_TYPE_DICTIONARY.to_string(),
            Dictionary::Inline(Vec::new()),
        );
        for name in external {
            tables.insert(name.into(), Dictionary::External);
        }
        DictionaryTable { tables }
    }

    /// Start a new inline dictionary. Redefining one discards its earlier entries.
    pub fn define(&mut self, name: &str) -> Result<(), ModelError> {
        if let Some(Dictionary::External) = self.tables.get(name) {
            return Err(ModelError::ExternalDictionary(name.to_string()));
        }
        self.tables
            .insert(name.to_string(), Dictionary::Inline(Vec::new()));
        Ok(())
    }

    pub fn push(&mut self, name: &str, constant: impl Into<String>) -> Result<(), ModelError> {
        match self.tables.get_mut(name) {
            Some(Dictionary::Inline(entries)) => {
                entries.push(constant.into());
                Ok(())
            }
            Some(Dictionary::External) => Err(ModelError::ExternalDictionary(name.to_string())),
            None => Err(ModelError::UnknownDictionary(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Dictionary> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Entries of an inline dictionary.
    pub fn entries(&self, name: &str) -> Option<&[String]> {
        match self.tables.get(name)? {
            Dictionary::Inline(entries) => Some(entries),
            Dictionary::External => None,
        }
    }

    /// Inline dictionaries sorted by name.
    pub fn inline(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tables.iter().filter_map(|(name, d)| match d {
            Dictionary::Inline(entries) => Some((name.as_str(), entries.as_slice())),
            Dictionary::External => None,
        })
    }

    /// External dictionaries sorted by name.
    pub fn external(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().filter_map(|(name, d)| match d {
            Dictionary::External => Some(name.as_str()),
            Dictionary::Inline(_) => None,
        })
    }
}
