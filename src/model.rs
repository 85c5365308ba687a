//! Protocol model: messages, their variants, dictionaries and field types.
//!
//! Built once by [`crate::parser::Parser`] and read-only afterwards.

use crate::config::GeneratorConfig;
use crate::dictionary::DictionaryTable;
use crate::registry::FieldTypeRegistry;
use crate::variant::PacketVariant;
use std::collections::BTreeMap;
use std::fmt;

/// Display/storage class of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKind {
    IntDecimal,
    IntHex,
    IntOctal,
    String,
    Blob,
}

impl FieldKind {
    pub fn is_number(self) -> bool {
        matches!(self, FieldKind::IntDecimal | FieldKind::IntHex | FieldKind::IntOctal)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::IntDecimal => "decimal integer",
            FieldKind::IntHex => "hexadecimal integer",
            FieldKind::IntOctal => "octal integer",
            FieldKind::String => "string",
            FieldKind::Blob => "blob",
        };
        f.write_str(s)
    }
}

/// Byte length of a field: a constant or the value of an earlier field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLength {
    Literal(u32),
    Symbol(String),
}

impl fmt::Display for FieldLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldLength::Literal(n) => write!(f, "{}", n),
            FieldLength::Symbol(s) => f.write_str(s),
        }
    }
}

/// One field of a variant. `length == None` marks an open-ended field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub width_bits: Option<u32>,
    pub length: Option<FieldLength>,
}

impl FieldSpec {
    pub fn int(name: impl Into<String>, kind: FieldKind, bits: u32) -> Self {
        debug_assert!(kind.is_number());
        FieldSpec {
            name: name.into(),
            kind,
            width_bits: Some(bits),
            length: Some(FieldLength::Literal(bits / 8)),
        }
    }

    pub fn string(name: impl Into<String>, length: Option<FieldLength>) -> Self {
        FieldSpec {
            name: name.into(),
            kind: FieldKind::String,
            width_bits: None,
            length,
        }
    }

    pub fn blob(name: impl Into<String>, length: Option<FieldLength>) -> Self {
        FieldSpec {
            name: name.into(),
            kind: FieldKind::Blob,
            width_bits: None,
            length,
        }
    }

    /// Width in bytes of an integer field.
    pub fn int_bytes(&self) -> Option<u32> {
        match (&self.length, self.kind.is_number()) {
            (Some(FieldLength::Literal(n)), true) => Some(*n),
            _ => None,
        }
    }
}

/// Suffix of the hidden length field preceding `NAME`/`STDSTRING` strings.
pub const STRLEN_SUFFIX: &str = "__strlen";

pub fn is_length_helper(name: &str) -> bool {
    name.contains(STRLEN_SUFFIX)
}

/// Structural errors in the protocol description.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("cannot add field {field} after a field with unspecified length ({open_field})")]
    FieldAfterOpenEnded { field: String, open_field: String },
    #[error("variant already has condition on {existing}, cannot add condition on {variable}")]
    DuplicateCondition { existing: String, variable: String },
    #[error("type for {field} was {previous}, but now it is {current}")]
    TypeConflict {
        field: String,
        previous: FieldKind,
        current: FieldKind,
    },
    #[error("dictionary {0} is supplied externally and cannot be defined inline")]
    ExternalDictionary(String),
    #[error("unknown dictionary {0}")]
    UnknownDictionary(String),
}

/// All variants of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    pub identifier: String,
    pub variants: Vec<PacketVariant>,
}

impl MessageDefinition {
    pub fn new(identifier: impl Into<String>) -> Self {
        MessageDefinition {
            identifier: identifier.into(),
            variants: Vec::new(),
        }
    }
}

/// Aggregate root produced by the parser.
#[derive(Debug, Clone)]
pub struct ProtocolModel {
    pub config: GeneratorConfig,
    pub messages: BTreeMap<String, MessageDefinition>,
    pub dictionaries: DictionaryTable,
    pub field_types: FieldTypeRegistry,
}

impl ProtocolModel {
    pub fn get_message(&self, identifier: &str) -> Option<&MessageDefinition> {
        self.messages.get(identifier)
    }

    /// Messages in identifier order.
    pub fn messages(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.messages.values()
    }

    /// True if values of `field` are rendered through a dictionary lookup.
    pub fn has_dictionary(&self, field: &str) -> bool {
        self.dictionaries.contains(field)
    }
}
