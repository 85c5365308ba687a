//! Parse annotated protocol headers into a [`ProtocolModel`].
//!
//! The input is read line by line:
//!
//! ```text
//! #define CLTOMA_FUSE_LOOKUP (PROTO_BASE+406)
//! /// msgid:32 inode:32 name:NAME uid:32 gid:32
//! /// field values: status
//! #define STATUS_OK 0
//! ```
//!
//! A `#define` of a command name starts a message, each following `///` line adds one
//! variant of it, and `/// field values: NAME` starts a dictionary terminated by a blank
//! line. Field tokens and type tags are parsed with the PEST grammar in `grammar.pest`.
//! The first error aborts the whole parse.

use crate::ast::{FieldToken, Line, TypeTag, INT_WIDTHS};
use crate::config::GeneratorConfig;
use crate::dictionary::{DictionaryTable, MESSAGE_TYPE_DICTIONARY};
use crate::model::{
    FieldKind, FieldLength, FieldSpec, MessageDefinition, ModelError, ProtocolModel,
    STRLEN_SUFFIX,
};
use crate::registry::FieldTypeRegistry;
use crate::variant::{Condition, VariantBuilder};
use log::{debug, info, warn};
use pest::Parser as _;
use pest_derive::Parser as PestParser;
use std::collections::BTreeMap;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct DissectionParser;

const DEFINE: &str = "#define";
const VARIANT_MARKER: &str = "///";
const DICTIONARY_HEADER: [&str; 3] = ["///", "field", "values:"];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("invalid field token \"{token}\": {reason}")]
    InvalidToken { token: String, reason: String },
    #[error("cannot parse type \"{tag}\" in {field}")]
    UnknownTypeTag { field: String, tag: String },
    #[error("unsupported integer width {bits} for {field} (expected 8, 16, 32 or 64)")]
    UnsupportedIntWidth { field: String, bits: String },
    #[error("invalid length \"{length}\" for {field}")]
    InvalidLength { field: String, length: String },
    #[error("field {0} has neither a condition nor a type")]
    MissingType(String),
    #[error("no command name defined before the dissection info")]
    NoCurrentMessage,
    #[error("cannot parse dictionary entry for field {0}")]
    BadDictionaryEntry(String),
    #[error("dictionary header without a field name")]
    MissingDictionaryName,
}

/// A fatal error, with the offending line and the message being defined.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot parse line {line_number} \"{line}\" for command {}: {kind}", .message.as_deref().unwrap_or("(none)"))]
pub struct ParseError {
    pub line_number: usize,
    pub line: String,
    pub message: Option<String>,
    #[source]
    pub kind: ParseErrorKind,
}

/// What the parser is currently building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseContext {
    Idle,
    InMessage(String),
    InDictionary(String),
}

/// Incremental line parser; [`Parser::finish`] hands over the completed model.
#[derive(Debug)]
pub struct Parser {
    config: GeneratorConfig,
    context: ParseContext,
    messages: BTreeMap<String, MessageDefinition>,
    dictionaries: DictionaryTable,
    field_types: FieldTypeRegistry,
    line_number: usize,
}

impl Parser {
    pub fn new(config: GeneratorConfig) -> Self {
        let dictionaries = DictionaryTable::new(config.external_dictionaries.iter().cloned());
        Parser {
            config,
            context: ParseContext::Idle,
            messages: BTreeMap::new(),
            dictionaries,
            field_types: FieldTypeRegistry::new(),
            line_number: 0,
        }
    }

    pub fn context(&self) -> &ParseContext {
        &self.context
    }

    /// Process one input line (with or without its line terminator).
    pub fn feed_line(&mut self, raw: &str) -> Result<(), ParseError> {
        self.line_number += 1;
        let line = normalize(raw);
        self.process(&line).map_err(|kind| ParseError {
            line_number: self.line_number,
            line: raw.trim_end_matches(['\r', '\n']).to_string(),
            message: match &self.context {
                ParseContext::InMessage(m) => Some(m.clone()),
                _ => None,
            },
            kind,
        })
    }

    fn process(&mut self, line: &str) -> Result<(), ParseErrorKind> {
        let classified = classify(line);
        if let ParseContext::InDictionary(dictionary) = &self.context {
            let dictionary = dictionary.clone();
            return match classified {
                Line::Blank => {
                    self.context = ParseContext::Idle;
                    Ok(())
                }
                Line::Define {
                    name,
                    has_value: true,
                } => {
                    self.dictionaries.push(&dictionary, name)?;
                    Ok(())
                }
                _ => Err(ParseErrorKind::BadDictionaryEntry(dictionary)),
            };
        }
        match classified {
            Line::Blank | Line::Other => Ok(()),
            Line::DictionaryHeader { name } => {
                if name.is_empty() {
                    return Err(ParseErrorKind::MissingDictionaryName);
                }
                self.dictionaries.define(name)?;
                debug!("dictionary {}", name);
                self.context = ParseContext::InDictionary(name.to_string());
                Ok(())
            }
            Line::Define {
                name,
                has_value: true,
            } if self.config.is_command_name(name) => self.start_message(name),
            Line::Define { .. } => Ok(()),
            Line::Variant { tokens } => {
                let message = match &self.context {
                    ParseContext::InMessage(m) => m.clone(),
                    _ => return Err(ParseErrorKind::NoCurrentMessage),
                };
                self.add_variant(&message, &tokens)
            }
        }
    }

    fn start_message(&mut self, name: &str) -> Result<(), ParseErrorKind> {
        let previous = self
            .messages
            .insert(name.to_string(), MessageDefinition::new(name));
        match previous {
            Some(old) => warn!(
                "{} redefined, dropping {} earlier variant(s)",
                name,
                old.variants.len()
            ),
            None => self.dictionaries.push(MESSAGE_TYPE_DICTIONARY, name)?,
        }
        debug!("message {}", name);
        self.context = ParseContext::InMessage(name.to_string());
        Ok(())
    }

    fn add_variant(&mut self, message: &str, tokens: &[&str]) -> Result<(), ParseErrorKind> {
        let mut builder = VariantBuilder::for_message(message, &self.config);
        for token in tokens {
            if *token == "-" {
                break;
            }
            let field = parse_field_token(token)?;
            if let Some(expression) = &field.condition {
                builder.set_condition(Condition::new(&field.name, expression))?;
            }
            if let Some(tag) = field.type_tag {
                self.append_field(&mut builder, &field.name, tag)?;
            }
        }
        if self.config.is_extended(message) && !builder.has_condition() {
            builder.set_condition(Condition::new("version", " == 0"))?;
        }
        let variant = builder.finish();
        debug!(
            "{} variant: {} field(s), condition ({})",
            message,
            variant.fields().len(),
            variant.condition()
        );
        if let Some(definition) = self.messages.get_mut(message) {
            definition.variants.push(variant);
        }
        Ok(())
    }

    fn append_field(
        &mut self,
        builder: &mut VariantBuilder,
        name: &str,
        tag: TypeTag,
    ) -> Result<(), ParseErrorKind> {
        let spec = match tag {
            TypeTag::Int(bits) => FieldSpec::int(name, self.int_kind(name), bits),
            TypeTag::NameString => prefixed_string(builder, name, 8)?,
            TypeTag::GeneralString => prefixed_string(builder, name, 32)?,
            TypeTag::String(length) => FieldSpec::string(name, length),
            TypeTag::Bytes(length) => FieldSpec::blob(name, length),
        };
        builder.append_field(spec.clone())?;
        self.field_types.register_spec(&spec)?;
        Ok(())
    }

    fn int_kind(&self, name: &str) -> FieldKind {
        if self.config.is_hex_field(name) {
            FieldKind::IntHex
        } else if self.config.is_oct_field(name) {
            FieldKind::IntOctal
        } else {
            FieldKind::IntDecimal
        }
    }

    /// Complete the model.
    pub fn finish(self) -> ProtocolModel {
        let variants: usize = self.messages.values().map(|m| m.variants.len()).sum();
        for message in self.messages.values().filter(|m| m.variants.is_empty()) {
            warn!("no dissection info for {}", message.identifier);
        }
        info!(
            "parsed {} message(s), {} variant(s), {} field type(s)",
            self.messages.len(),
            variants,
            self.field_types.len()
        );
        ProtocolModel {
            config: self.config,
            messages: self.messages,
            dictionaries: self.dictionaries,
            field_types: self.field_types,
        }
    }
}

/// Append the hidden length field of a length-prefixed string and return the string.
fn prefixed_string(
    builder: &mut VariantBuilder,
    name: &str,
    prefix_bits: u32,
) -> Result<FieldSpec, ModelError> {
    let helper = format!("{}{}", name, STRLEN_SUFFIX);
    builder.append_field(FieldSpec::int(&helper, FieldKind::IntDecimal, prefix_bits))?;
    Ok(FieldSpec::string(name, Some(FieldLength::Symbol(helper))))
}

/// Parse a whole source text with the default configuration.
pub fn parse(source: &str) -> Result<ProtocolModel, ParseError> {
    parse_with_config(source, GeneratorConfig::default())
}

pub fn parse_with_config(
    source: &str,
    config: GeneratorConfig,
) -> Result<ProtocolModel, ParseError> {
    let mut parser = Parser::new(config);
    for line in source.lines() {
        parser.feed_line(line)?;
    }
    Ok(parser.finish())
}

/// Strip `//` comments (but not `///` markers), normalize `# define`, and collapse
/// `:(free text)` type annotations to `:BYTES`.
pub fn normalize(raw: &str) -> String {
    let line = strip_comment(raw.trim_end_matches(['\r', '\n']));
    let line = match line.strip_prefix('#') {
        Some(rest) => format!("#{}", rest.trim_start_matches(' ')),
        None => line.to_string(),
    };
    collapse_annotations(&line)
}

fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] != b'/' || bytes[i + 1] != b'/' {
            continue;
        }
        let before_ok = i == 0 || bytes[i - 1] != b'/';
        let after_ok = i + 2 == bytes.len() || bytes[i + 2] != b'/';
        if before_ok && after_ok {
            return &line[..i];
        }
    }
    line
}

fn collapse_annotations(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find(":(") {
        let Some(close) = rest[pos..].find(')') else {
            break;
        };
        out.push_str(&rest[..pos]);
        out.push_str(":BYTES");
        rest = &rest[pos + close + 1..];
    }
    out.push_str(rest);
    out
}

/// Classify a normalized line.
pub fn classify(line: &str) -> Line<'_> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return Line::Blank;
    };
    if tokens.len() >= 3 && tokens[..3] == DICTIONARY_HEADER {
        return Line::DictionaryHeader {
            name: tokens.get(3).copied().unwrap_or(""),
        };
    }
    if first == DEFINE {
        return match tokens.get(1) {
            Some(&name) => Line::Define {
                name,
                has_value: tokens.len() > 2,
            },
            None => Line::Other,
        };
    }
    if first == VARIANT_MARKER {
        return Line::Variant {
            tokens: tokens[1..].to_vec(),
        };
    }
    Line::Other
}

/// Parse one `name[condition][:type]` token.
pub fn parse_field_token(token: &str) -> Result<FieldToken, ParseErrorKind> {
    let invalid = |reason: String| ParseErrorKind::InvalidToken {
        token: token.to_string(),
        reason,
    };
    let pair = DissectionParser::parse(Rule::field_token, token)
        .map_err(|e| invalid(e.variant.message().to_string()))?
        .next()
        .ok_or_else(|| invalid("empty token".to_string()))?;
    let mut name = String::new();
    let mut condition = None;
    let mut type_text = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::field_name => name = inner.as_str().to_string(),
            Rule::condition => condition = Some(inner.as_str().to_string()),
            Rule::type_text => type_text = Some(inner.as_str()),
            _ => {}
        }
    }
    let type_tag = type_text.map(|t| parse_type_tag(&name, t)).transpose()?;
    if condition.is_none() && type_tag.is_none() {
        return Err(ParseErrorKind::MissingType(name));
    }
    Ok(FieldToken {
        name,
        condition,
        type_tag,
    })
}

/// Parse the type tag of `field`, e.g. `32`, `NAME`, `BYTES[len]` or `35B`.
pub fn parse_type_tag(field: &str, text: &str) -> Result<TypeTag, ParseErrorKind> {
    let unknown = || ParseErrorKind::UnknownTypeTag {
        field: field.to_string(),
        tag: text.to_string(),
    };
    let pair = DissectionParser::parse(Rule::type_tag, text)
        .map_err(|_| unknown())?
        .next()
        .ok_or_else(unknown)?;
    let inner = pair
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or_else(unknown)?;
    match inner.as_rule() {
        Rule::short_bytes => {
            let number = inner.into_inner().next().ok_or_else(unknown)?;
            Ok(TypeTag::Bytes(Some(literal_length(field, number.as_str())?)))
        }
        Rule::int_width => {
            let bits = INT_WIDTHS
                .iter()
                .copied()
                .find(|b| b.to_string() == inner.as_str())
                .ok_or_else(|| ParseErrorKind::UnsupportedIntWidth {
                    field: field.to_string(),
                    bits: inner.as_str().to_string(),
                })?;
            Ok(TypeTag::Int(bits))
        }
        Rule::name_string => Ok(TypeTag::NameString),
        Rule::general_string => Ok(TypeTag::GeneralString),
        Rule::string_type => Ok(TypeTag::String(build_length(field, inner)?)),
        Rule::bytes_type => Ok(TypeTag::Bytes(build_length(field, inner)?)),
        _ => Err(unknown()),
    }
}

fn build_length(
    field: &str,
    pair: pest::iterators::Pair<Rule>,
) -> Result<Option<FieldLength>, ParseErrorKind> {
    let Some(spec) = pair.into_inner().next() else {
        return Ok(None);
    };
    let inner = spec
        .into_inner()
        .next()
        .ok_or_else(|| ParseErrorKind::InvalidLength {
            field: field.to_string(),
            length: String::new(),
        })?;
    match inner.as_rule() {
        Rule::number => literal_length(field, inner.as_str()).map(Some),
        _ => Ok(Some(FieldLength::Symbol(inner.as_str().to_string()))),
    }
}

fn literal_length(field: &str, text: &str) -> Result<FieldLength, ParseErrorKind> {
    text.parse::<u32>()
        .map(FieldLength::Literal)
        .map_err(|_| ParseErrorKind::InvalidLength {
            field: field.to_string(),
            length: text.to_string(),
        })
}
