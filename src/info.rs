//! One-line summary of a decoded variant (the Info column).
//!
//! Produces a printf-style template (the body of a C string literal) and the C
//! expressions filling it. Chunk identifiers are folded into compact tokens such as
//! `chunk_xor_1_of_2_000000000000026F_00000001` or `old:chunk_000000000000026F_00000001`.

use crate::model::{is_length_helper, FieldKind, ProtocolModel};
use crate::variant::PacketVariant;
use std::collections::BTreeSet;

/// Dictionary used to label chunk types in the compact chunk token.
const CHUNK_TYPE_DICTIONARY: &str = "chunktype";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoSummary {
    pub format: String,
    pub args: Vec<String>,
}

impl InfoSummary {
    pub fn is_empty(&self) -> bool {
        self.format.is_empty()
    }
}

/// Template and arguments summarizing `variant`.
pub fn summarize(variant: &PacketVariant, model: &ProtocolModel) -> InfoSummary {
    let config = &model.config;
    let mut summary = InfoSummary::default();
    let mut numbers: BTreeSet<&str> = variant
        .fields()
        .iter()
        .filter(|f| f.spec.kind.is_number())
        .map(|f| f.spec.name.as_str())
        .collect();

    if model.has_dictionary(CHUNK_TYPE_DICTIONARY) {
        for prefix in &config.chunk_prefixes {
            let names = chunk_fields(prefix, &["id", "version", "type"]);
            if !names.iter().all(|n| numbers.contains(n.as_str())) {
                continue;
            }
            summary.format += &format!(" {}chunk_%s_%016lX_%08X", chunk_label(prefix));
            summary.args.push(format!(
                "val_to_str({}chunktype, dictionary_{}, \"UNKNOWN(%02X)\")",
                prefix, CHUNK_TYPE_DICTIONARY
            ));
            summary.args.push(format!("{}chunkid", prefix));
            summary.args.push(format!("{}chunkversion", prefix));
            for n in &names {
                numbers.remove(n.as_str());
            }
        }
    }
    for prefix in &config.chunk_prefixes {
        let names = chunk_fields(prefix, &["id", "version"]);
        if !names.iter().all(|n| numbers.contains(n.as_str())) {
            continue;
        }
        summary.format += &format!(" {}chunk_%016lX_%08X", chunk_label(prefix));
        summary.args.push(format!("{}chunkid", prefix));
        summary.args.push(format!("{}chunkversion", prefix));
        for n in &names {
            numbers.remove(n.as_str());
        }
    }

    for field in variant.fields() {
        let name = field.spec.name.as_str();
        if field.spec.kind == FieldKind::Blob || is_length_helper(name) {
            continue;
        }
        if field.spec.kind == FieldKind::String {
            if let Some(length) = &field.spec.length {
                summary.format += &format!(r#" {}:\"%.*s\""#, name);
                summary.args.push(format!("(int){}", length));
                summary.args.push(name.to_string());
            }
            continue;
        }
        if !numbers.contains(name) {
            continue;
        }
        if model.has_dictionary(name) {
            summary.format += &format!(" {}:%s", name);
            summary.args.push(format!(
                "val_to_str({0}, dictionary_{0}, \"UNKNOWN(%d)\")",
                name
            ));
        } else {
            let spec = match field.spec.kind {
                FieldKind::IntHex => r#"0x%"G_GINT64_MODIFIER"X"#,
                FieldKind::IntOctal => r#"0o%03"G_GINT64_MODIFIER"o"#,
                _ => r#"%"G_GINT64_MODIFIER"u"#,
            };
            summary.format += &format!(" {}:{}", name, spec);
            summary.args.push(format!("(guint64){}", name));
        }
    }
    summary
}

fn chunk_fields(prefix: &str, suffixes: &[&str]) -> Vec<String> {
    suffixes
        .iter()
        .map(|s| format!("{}chunk{}", prefix, s))
        .collect()
}

fn chunk_label(prefix: &str) -> String {
    if prefix.is_empty() {
        String::new()
    } else {
        format!("{}:", prefix)
    }
}
