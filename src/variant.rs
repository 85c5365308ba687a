//! Layout engine: field offsets and length classes of one packet variant.
//!
//! Fields are appended in declaration order through [`VariantBuilder`]. Constant
//! lengths advance an integer offset, symbolic lengths (`STRING[len]`) append `+len`
//! terms to the offset expression, and an open-ended field closes the variant.
//!
//! Lengths come in two flavours: *absolute* lengths count the whole packet including
//! the `type:32 length:32` prefix, *payload* lengths are what the header's `length`
//! word holds (absolute minus [`LENGTH_PREFIX_SIZE`]). Generated conditions compare
//! against the latter.

use crate::config::{GeneratorConfig, LENGTH_PREFIX_SIZE};
use crate::model::{FieldLength, FieldSpec, ModelError};
use std::fmt;

/// Offset of a field: a constant plus the values of earlier length fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offset {
    pub base: u32,
    pub terms: Vec<String>,
}

impl Offset {
    pub fn constant(base: u32) -> Self {
        Offset {
            base,
            terms: Vec::new(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    fn advance(&mut self, length: &FieldLength) {
        match length {
            FieldLength::Literal(n) => self.base = self.base.saturating_add(*n),
            FieldLength::Symbol(s) => self.terms.push(s.clone()),
        }
    }

    /// Same expression shifted back by `n` bytes.
    pub fn minus(&self, n: u32) -> Offset {
        Offset {
            base: self.base.saturating_sub(n),
            terms: self.terms.clone(),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for term in &self.terms {
            write!(f, "+{}", term)?;
        }
        Ok(())
    }
}

/// A field together with its computed offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaidOutField {
    pub spec: FieldSpec,
    pub offset: Offset,
}

/// Condition declared on a variant line, e.g. `version==2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub variable: String,
    /// Comparison text appended to the variable, e.g. `==2`.
    pub expression: String,
}

impl Condition {
    pub fn new(variable: impl Into<String>, expression: impl Into<String>) -> Self {
        Condition {
            variable: variable.into(),
            expression: expression.into(),
        }
    }
}

/// Test selecting a variant at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantCondition {
    Explicit(Condition),
    /// Payload length equals the value.
    ExactLength(u32),
    Always,
    /// Payload length is at least the value.
    MinLength(u32),
}

impl VariantCondition {
    /// Name of the value the condition reads: `length`, `1` or a field.
    pub fn variable(&self) -> &str {
        match self {
            VariantCondition::Explicit(c) => &c.variable,
            VariantCondition::ExactLength(_) | VariantCondition::MinLength(_) => "length",
            VariantCondition::Always => "1",
        }
    }
}

impl fmt::Display for VariantCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantCondition::Explicit(c) => write!(f, "{}{}", c.variable, c.expression),
            VariantCondition::ExactLength(n) => write!(f, "length == {}", n),
            VariantCondition::Always => f.write_str("1"),
            VariantCondition::MinLength(n) => write!(f, "length >= {}", n),
        }
    }
}

/// Accumulates fields of one variant; [`VariantBuilder::finish`] yields the
/// immutable [`PacketVariant`].
#[derive(Debug, Clone)]
pub struct VariantBuilder {
    header_size: u32,
    fields: Vec<LaidOutField>,
    position: Offset,
    min_payload: u32,
    payload: Option<u32>,
    open_field: Option<String>,
    condition: Option<Condition>,
}

impl VariantBuilder {
    /// Builder for a variant of `message`; fields start right after its header.
    pub fn for_message(message: &str, config: &GeneratorConfig) -> Self {
        Self::new(config.header_size(message))
    }

    /// Builder whose first field starts at absolute offset `header_size`.
    pub fn new(header_size: u32) -> Self {
        let extra = header_size.saturating_sub(LENGTH_PREFIX_SIZE);
        VariantBuilder {
            header_size,
            fields: Vec::new(),
            position: Offset::constant(header_size),
            min_payload: extra,
            payload: Some(extra),
            open_field: None,
            condition: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.open_field.is_some()
    }

    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Append a field at the current position.
    pub fn append_field(&mut self, spec: FieldSpec) -> Result<(), ModelError> {
        if let Some(open_field) = &self.open_field {
            return Err(ModelError::FieldAfterOpenEnded {
                field: spec.name,
                open_field: open_field.clone(),
            });
        }
        let offset = self.position.clone();
        match &spec.length {
            None => {
                self.open_field = Some(spec.name.clone());
                self.payload = None;
            }
            Some(length @ FieldLength::Literal(n)) => {
                self.position.advance(length);
                self.min_payload = self.min_payload.saturating_add(*n);
                if let Some(p) = self.payload.as_mut() {
                    *p = p.saturating_add(*n);
                }
            }
            Some(length @ FieldLength::Symbol(_)) => {
                self.position.advance(length);
                self.payload = None;
            }
        }
        self.fields.push(LaidOutField { spec, offset });
        Ok(())
    }

    pub fn set_condition(&mut self, condition: Condition) -> Result<(), ModelError> {
        if let Some(existing) = &self.condition {
            return Err(ModelError::DuplicateCondition {
                existing: existing.variable.clone(),
                variable: condition.variable,
            });
        }
        self.condition = Some(condition);
        Ok(())
    }

    pub fn finish(self) -> PacketVariant {
        PacketVariant {
            header_size: self.header_size,
            fields: self.fields,
            end: self.position,
            min_payload: self.min_payload,
            payload: self.payload,
            has_open_ended_field: self.open_field.is_some(),
            condition: self.condition,
        }
    }
}

/// One concrete field layout of a message.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketVariant {
    header_size: u32,
    fields: Vec<LaidOutField>,
    end: Offset,
    min_payload: u32,
    payload: Option<u32>,
    has_open_ended_field: bool,
    condition: Option<Condition>,
}

impl PacketVariant {
    pub fn fields(&self) -> &[LaidOutField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&LaidOutField> {
        self.fields.iter().find(|f| f.spec.name == name)
    }

    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    pub fn has_open_ended_field(&self) -> bool {
        self.has_open_ended_field
    }

    pub fn explicit_condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Packet size including the header when every field has a constant length.
    pub fn total_length(&self) -> Option<u32> {
        self.payload.map(|p| p.saturating_add(LENGTH_PREFIX_SIZE))
    }

    /// Smallest possible packet size including the header.
    pub fn min_length(&self) -> u32 {
        self.min_payload.saturating_add(LENGTH_PREFIX_SIZE)
    }

    pub fn payload_length(&self) -> Option<u32> {
        self.payload
    }

    pub fn min_payload_length(&self) -> u32 {
        self.min_payload
    }

    /// Payload length expression of a variant ending with symbolic lengths, e.g.
    /// `5+name__strlen`. `None` for constant-length and open-ended variants.
    pub fn symbolic_payload_length(&self) -> Option<Offset> {
        if self.payload.is_some() || self.has_open_ended_field {
            return None;
        }
        Some(self.end.minus(LENGTH_PREFIX_SIZE))
    }

    /// Condition inferred from lengths alone, ignoring any declared condition.
    pub fn length_guard(&self) -> VariantCondition {
        match self.payload {
            Some(n) => VariantCondition::ExactLength(n),
            None if self.min_payload == 0 => VariantCondition::Always,
            None => VariantCondition::MinLength(self.min_payload),
        }
    }

    /// Condition used to select this variant: the declared one if any, otherwise
    /// the length guard.
    pub fn condition(&self) -> VariantCondition {
        match &self.condition {
            Some(c) => VariantCondition::Explicit(c.clone()),
            None => self.length_guard(),
        }
    }
}
