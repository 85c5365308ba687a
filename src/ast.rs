//! Syntax tree of a single `///` dissection line.

use crate::model::FieldLength;

/// One whitespace-separated token of a variant line: `name[condition][:type]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldToken {
    pub name: String,
    /// Raw comparison text following the name, e.g. `==3`.
    pub condition: Option<String>,
    pub type_tag: Option<TypeTag>,
}

/// Type tag after the `:` separator.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeTag {
    /// `8`, `16`, `32` or `64`.
    Int(u32),
    /// `NAME` / `STRING8`: string preceded by an 8-bit length.
    NameString,
    /// `STDSTRING` / `STRING32`: string preceded by a 32-bit length.
    GeneralString,
    /// `STRING`, `STRING[n]`, `STRING[field]`.
    String(Option<FieldLength>),
    /// `BYTES`, `BYTES[n]`, `BYTES[field]`, `nB` and `(annotation)`.
    Bytes(Option<FieldLength>),
}

/// Supported integer widths in bits.
pub const INT_WIDTHS: [u32; 4] = [8, 16, 32, 64];

/// Classification of one normalized input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line<'a> {
    Blank,
    /// `#define NAME [VALUE...]`
    Define { name: &'a str, has_value: bool },
    /// `/// field values: NAME`
    DictionaryHeader { name: &'a str },
    /// `/// tok tok ...`
    Variant { tokens: Vec<&'a str> },
    Other,
}
