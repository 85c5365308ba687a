//! Emit Wireshark dissector C source from a [`ProtocolModel`].
//!
//! Layout of the generated file:
//!
//! 1. includes and global handles (`hf_<abbrev>_<field>` for every field, sorted)
//! 2. `value_string` dictionaries, inline ones first, then external inclusions
//! 3. for every message (sorted): one routine per variant and a dispatcher choosing
//!    between them
//! 4. the top-level message routine switching on the message type
//! 5. PDU reassembly, port handling and protocol registration
//!
//! Each variant routine checks the payload length *before* reading any field, so a
//! short packet never causes an out-of-bounds read. Malformed traffic only adds an
//! `[ERROR: ...]` note to the Info column.

use crate::config::LENGTH_PREFIX_SIZE;
use crate::info::summarize;
use crate::model::{is_length_helper, FieldKind, MessageDefinition, ProtocolModel};
use crate::registry::FieldType;
use crate::variant::{LaidOutField, PacketVariant};
use log::{debug, info};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Field exposing the undecoded payload of messages without dissection info.
const DATA_FIELD: &str = "data";

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Format: {0}")]
    Fmt(#[from] std::fmt::Error),
    #[error("{message}: condition on {field}, which no variant declares")]
    UnknownConditionField { message: String, field: String },
    #[error("{message}: condition field {field} is not an integer")]
    ConditionFieldNotInteger { message: String, field: String },
    #[error("{message}: condition field {field} has a variable offset ({offset})")]
    ConditionFieldNotFixed {
        message: String,
        field: String,
        offset: String,
    },
    #[error("field data is declared as {0}, but messages without dissection info need it as a blob")]
    DataFieldConflict(FieldKind),
    #[error("no accessor for {bytes}-byte integer {field}")]
    UnsupportedWidth { field: String, bytes: u32 },
}

/// Generate the complete dissector source.
pub fn generate(model: &ProtocolModel) -> Result<String, GenerateError> {
    let mut generator = Generator::new(model);
    generator.write_all()?;
    info!(
        "generated {} bytes for {} message(s)",
        generator.out.len(),
        model.messages.len()
    );
    Ok(generator.out)
}

/// Name of the C routine dissecting variant `index` of `message`.
pub fn variant_routine_name(message: &str, index: usize) -> String {
    format!("dissect_{}_variant_{}", message, index)
}

/// Big-endian accessor reading an integer of `bytes` bytes.
pub fn int_getter(bytes: u32) -> Option<&'static str> {
    match bytes {
        1 => Some("tvb_get_guint8"),
        2 => Some("tvb_get_ntohs"),
        4 => Some("tvb_get_ntohl"),
        8 => Some("tvb_get_ntoh64"),
        _ => None,
    }
}

fn getter_for(field: &LaidOutField, bytes: u32) -> Result<&'static str, GenerateError> {
    int_getter(bytes).ok_or_else(|| GenerateError::UnsupportedWidth {
        field: field.spec.name.clone(),
        bytes,
    })
}

fn wireshark_type(field: &FieldType) -> String {
    match field.kind {
        FieldKind::IntDecimal | FieldKind::IntHex | FieldKind::IntOctal => match field.bits {
            Some(bits) => format!("FT_UINT{}", bits),
            None => "FT_UINT".to_string(),
        },
        FieldKind::String => "FT_STRING".to_string(),
        FieldKind::Blob => "FT_BYTES".to_string(),
    }
}

fn wireshark_base(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::IntDecimal => "BASE_DEC",
        FieldKind::IntHex => "BASE_HEX",
        FieldKind::IntOctal => "BASE_OCT",
        FieldKind::String | FieldKind::Blob => "BASE_NONE",
    }
}

fn encoding(kind: FieldKind) -> &'static str {
    if kind.is_number() {
        "ENC_BIG_ENDIAN"
    } else {
        "ENC_NA"
    }
}

struct Generator<'a> {
    model: &'a ProtocolModel,
    abbrev: &'a str,
    out: String,
}

impl<'a> Generator<'a> {
    fn new(model: &'a ProtocolModel) -> Self {
        Generator {
            model,
            abbrev: &model.config.abbrev,
            out: String::new(),
        }
    }

    fn write_all(&mut self) -> Result<(), GenerateError> {
        let model = self.model;
        let fields = self.field_table()?;
        self.write_includes()?;
        self.write_globals(&fields)?;
        self.write_dictionaries()?;
        for message in model.messages() {
            self.write_message(message)?;
        }
        self.write_message_dispatch()?;
        self.write_registration(&fields)?;
        Ok(())
    }

    /// Registered fields plus `data` when some message has no variants.
    fn field_table(&self) -> Result<Vec<(String, FieldType)>, GenerateError> {
        let mut fields: Vec<(String, FieldType)> = self
            .model
            .field_types
            .iter()
            .map(|(name, t)| (name.to_string(), *t))
            .collect();
        let needs_data = self.model.messages().any(|m| m.variants.is_empty());
        if needs_data {
            match self.model.field_types.get(DATA_FIELD) {
                Some(t) if t.kind != FieldKind::Blob => {
                    return Err(GenerateError::DataFieldConflict(t.kind));
                }
                Some(_) => {}
                None => {
                    fields.push((
                        DATA_FIELD.to_string(),
                        FieldType {
                            kind: FieldKind::Blob,
                            bits: None,
                        },
                    ));
                    fields.sort_by(|a, b| a.0.cmp(&b.0));
                }
            }
        }
        Ok(fields)
    }

    fn write_includes(&mut self) -> Result<(), GenerateError> {
        writeln!(self.out, "#include \"config.h\"")?;
        for header in [
            "<glib.h>",
            "<epan/dissectors/packet-tcp.h>",
            "<epan/packet.h>",
            "<epan/packet_info.h>",
            "<epan/prefs.h>",
            "<epan/tvbuff.h>",
            "<epan/value_string.h>",
        ] {
            writeln!(self.out, "#include {}", header)?;
        }
        writeln!(self.out, "#include \"includes.h\"")?;
        Ok(())
    }

    fn write_globals(&mut self, fields: &[(String, FieldType)]) -> Result<(), GenerateError> {
        let a = self.abbrev;
        writeln!(self.out, "static dissector_handle_t {}_handle;", a)?;
        writeln!(self.out, "static int proto_{} = -1;", a)?;
        writeln!(self.out, "static gint ett_{} = -1;", a)?;
        writeln!(self.out, "static range_t *tcp_ports_{} = NULL;", a)?;
        for (name, _) in fields {
            writeln!(self.out, "static int hf_{}_{} = -1;", a, name)?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn write_dictionaries(&mut self) -> Result<(), GenerateError> {
        let model = self.model;
        for (name, entries) in model.dictionaries.inline() {
            writeln!(self.out, "static const value_string dictionary_{}[] = {{", name)?;
            for entry in entries {
                writeln!(self.out, "    {{{0}, \"{0}\"}},", entry)?;
            }
            writeln!(self.out, "    {{0, NULL}}")?;
            writeln!(self.out, "}};")?;
        }
        for name in model.dictionaries.external() {
            writeln!(self.out)?;
            writeln!(self.out, "static const value_string dictionary_{}[] = {{", name)?;
            writeln!(self.out, "#   include \"dict_{}-inl.h\"", name)?;
            writeln!(self.out, "    {{0, NULL}}")?;
            writeln!(self.out, "}};")?;
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn write_message(&mut self, message: &'a MessageDefinition) -> Result<(), GenerateError> {
        let id = &message.identifier;
        debug!("generating {} ({} variant(s))", id, message.variants.len());
        writeln!(
            self.out,
            "/**************    dissections of {}    **************/",
            id
        )?;
        for (n, variant) in message.variants.iter().enumerate() {
            self.write_variant(&variant_routine_name(id, n), variant)?;
        }
        self.write_dispatcher(message)
    }

    fn write_variant(&mut self, func: &str, variant: &PacketVariant) -> Result<(), GenerateError> {
        writeln!(self.out, "static void {}(", func)?;
        writeln!(self.out, "        tvbuff_t *tvb, guint32 length,")?;
        writeln!(self.out, "        packet_info *pinfo, proto_tree *tree) {{")?;

        for field in variant.fields() {
            if let Some(bytes) = field.spec.int_bytes() {
                writeln!(self.out, "    guint{} {};", bytes * 8, field.spec.name)?;
            } else if field.spec.kind == FieldKind::String && field.spec.length.is_some() {
                writeln!(self.out, "    const char *{};", field.spec.name)?;
            }
        }

        // Validate before reading anything.
        let guard = variant.length_guard();
        writeln!(self.out, "    if (!({})) {{", guard)?;
        writeln!(self.out, "        col_append_str(pinfo->cinfo, COL_INFO,")?;
        writeln!(
            self.out,
            "                \" [ERROR: PACKET LENGTH MISMATCH, EXPECTED {}]\");",
            guard
        )?;
        writeln!(self.out, "        return;")?;
        writeln!(self.out, "    }}")?;

        for field in variant.fields() {
            if let Some(bytes) = field.spec.int_bytes() {
                let getter = getter_for(field, bytes)?;
                writeln!(
                    self.out,
                    "    {} = {}(tvb, {});",
                    field.spec.name, getter, field.offset
                )?;
            } else if field.spec.kind == FieldKind::String {
                if let Some(length) = &field.spec.length {
                    writeln!(
                        self.out,
                        "    {} = (const char*)tvb_get_ptr(tvb, {}, {});",
                        field.spec.name, field.offset, length
                    )?;
                }
            }
        }

        if let Some(expected) = variant.symbolic_payload_length() {
            writeln!(self.out, "    if (length != (guint32)({})) {{", expected)?;
            writeln!(self.out, "        col_append_fstr(pinfo->cinfo, COL_INFO,")?;
            writeln!(
                self.out,
                "                \" [ERROR: PACKET LENGTH MISMATCH, EXPECTED {}, WHICH IS %lu]\",",
                expected
            )?;
            writeln!(self.out, "                (unsigned long)({}));", expected)?;
            writeln!(self.out, "    }}")?;
        }

        let summary = summarize(variant, self.model);
        if !summary.is_empty() {
            writeln!(self.out, "    col_append_fstr(pinfo->cinfo, COL_INFO,")?;
            writeln!(self.out, "            \"{}\",", summary.format)?;
            writeln!(self.out, "            {});", summary.args.join(", "))?;
        }

        writeln!(self.out, "    if (tree) {{")?;
        let variable = variant.payload_length().is_none();
        for field in variant.fields() {
            if is_length_helper(&field.spec.name) {
                continue;
            }
            self.write_tree_item(field, variable)?;
        }
        writeln!(self.out, "    }}")?;
        writeln!(self.out, "    (void)tvb;")?;
        writeln!(self.out, "    (void)tree;")?;
        writeln!(self.out, "    (void)length;")?;
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        Ok(())
    }

    fn write_tree_item(&mut self, field: &LaidOutField, variable: bool) -> Result<(), GenerateError> {
        let length = field
            .spec
            .length
            .as_ref()
            .map(|l| l.to_string());
        if variable {
            writeln!(
                self.out,
                "        if (length + {} < (guint32)({}+{})) return;",
                LENGTH_PREFIX_SIZE,
                field.offset,
                length.as_deref().unwrap_or("0")
            )?;
        }
        let hf = format!("hf_{}_{}", self.abbrev, field.spec.name);
        let enc = encoding(field.spec.kind);
        match length {
            Some(length) => writeln!(
                self.out,
                "        proto_tree_add_item(tree, {}, tvb, {}, {}, {});",
                hf, field.offset, length, enc
            )?,
            // Open-ended: whatever is left of the buffer.
            None => writeln!(
                self.out,
                "        if (length + {} > {}) proto_tree_add_item(tree, {}, tvb, {}, -1, {});",
                LENGTH_PREFIX_SIZE, field.offset, hf, field.offset, enc
            )?,
        }
        Ok(())
    }

    fn write_dispatcher(&mut self, message: &'a MessageDefinition) -> Result<(), GenerateError> {
        let id = &message.identifier;
        let a = self.abbrev;
        writeln!(self.out, "static void dissect_{}(", id)?;
        writeln!(self.out, "        tvbuff_t *tvb, guint32 length, guint32 version,")?;
        writeln!(self.out, "        packet_info *pinfo, proto_tree *tree) {{")?;
        if message.variants.is_empty() {
            let header = self.model.config.header_size(id);
            writeln!(
                self.out,
                "    col_append_str(pinfo->cinfo, COL_INFO, \" (info not available)\");"
            )?;
            writeln!(
                self.out,
                "    if (length > {}) {{",
                header.saturating_sub(LENGTH_PREFIX_SIZE)
            )?;
            writeln!(
                self.out,
                "        proto_tree_add_item(tree, hf_{}_{}, tvb, {}, -1, ENC_NA);",
                a, DATA_FIELD, header
            )?;
            writeln!(self.out, "    }}")?;
        } else {
            for field in self.condition_fields(message)? {
                let bytes = field.spec.int_bytes().unwrap_or(0);
                let getter = getter_for(field, bytes)?;
                writeln!(
                    self.out,
                    "    guint{} {} = {}(tvb, {});",
                    bytes * 8,
                    field.spec.name,
                    getter,
                    field.offset
                )?;
            }
            let mut tried = Vec::with_capacity(message.variants.len());
            for (n, variant) in message.variants.iter().enumerate() {
                let condition = format!("({})", variant.condition());
                writeln!(self.out, "    if {} {{", condition)?;
                writeln!(
                    self.out,
                    "        {}(tvb, length, pinfo, tree);",
                    variant_routine_name(id, n)
                )?;
                writeln!(self.out, "        return;")?;
                writeln!(self.out, "    }}")?;
                tried.push(condition);
            }
            writeln!(self.out, "    col_append_str(pinfo->cinfo, COL_INFO,")?;
            writeln!(
                self.out,
                "            \" [ERROR: UNKNOWN VARIANT, EXPECTED {}]\");",
                tried.join(" OR ")
            )?;
        }
        writeln!(self.out, "    (void)version;")?;
        writeln!(self.out, "}}")?;
        writeln!(self.out)?;
        Ok(())
    }

    /// Fields the dispatcher has to read to evaluate variant conditions, in name order.
    fn condition_fields(
        &self,
        message: &'a MessageDefinition,
    ) -> Result<Vec<&'a LaidOutField>, GenerateError> {
        let names: BTreeSet<String> = message
            .variants
            .iter()
            .map(|v| v.condition().variable().to_string())
            .filter(|name| !matches!(name.as_str(), "1" | "length" | "version"))
            .collect();
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let field = message
                .variants
                .iter()
                .find_map(|v| v.field(&name))
                .ok_or_else(|| GenerateError::UnknownConditionField {
                    message: message.identifier.clone(),
                    field: name.clone(),
                })?;
            if field.spec.int_bytes().and_then(int_getter).is_none() {
                return Err(GenerateError::ConditionFieldNotInteger {
                    message: message.identifier.clone(),
                    field: name,
                });
            }
            if !field.offset.is_constant() {
                return Err(GenerateError::ConditionFieldNotFixed {
                    message: message.identifier.clone(),
                    field: name,
                    offset: field.offset.to_string(),
                });
            }
            fields.push(field);
        }
        Ok(fields)
    }

    fn write_message_dispatch(&mut self) -> Result<(), GenerateError> {
        let model = self.model;
        let config = &model.config;
        let (lo, hi) = config.extended_type_range;
        let head = MESSAGE_DISPATCH_TEMPLATE
            .replace("@ABBREV@", self.abbrev)
            .replace("@SHORT_NAME@", &config.short_name)
            .replace("@EXT_LO@", &lo.to_string())
            .replace("@EXT_HI@", &hi.to_string());
        self.out.push_str(&head);
        for message in model.messages() {
            writeln!(self.out, "        case {}:", message.identifier)?;
            writeln!(
                self.out,
                "            dissect_{}(tvb, length, version, pinfo, {}_tree);",
                message.identifier, self.abbrev
            )?;
            writeln!(self.out, "            break;")?;
        }
        writeln!(self.out, "    }}")?;
        writeln!(self.out, "}}")?;
        Ok(())
    }

    fn write_registration(&mut self, fields: &[(String, FieldType)]) -> Result<(), GenerateError> {
        let model = self.model;
        let config = &model.config;
        let head = REGISTRATION_TEMPLATE.replace("@ABBREV@", self.abbrev);
        self.out.push_str(&head);
        for (name, field) in fields {
            let vals = if model.has_dictionary(name) {
                format!("VALS(dictionary_{})", name)
            } else {
                "NULL".to_string()
            };
            writeln!(self.out, "        {{&hf_{}_{}, {{", self.abbrev, name)?;
            writeln!(self.out, "            \"{0}\", \"{1}.{0}\",", name, self.abbrev)?;
            writeln!(
                self.out,
                "            {}, {}, {}, 0, NULL, HFILL}}",
                wireshark_type(field),
                wireshark_base(field.kind),
                vals
            )?;
            writeln!(self.out, "        }},")?;
        }
        let tail = REGISTRATION_TAIL_TEMPLATE
            .replace("@ABBREV@", self.abbrev)
            .replace("@PROTOCOL_NAME@", &config.protocol_name)
            .replace("@SHORT_NAME@", &config.short_name)
            .replace("@TCP_PORTS@", &config.tcp_ports);
        self.out.push_str(&tail);
        Ok(())
    }
}

const MESSAGE_DISPATCH_TEMPLATE: &str = r#"
static void dissect_@ABBREV@_message(tvbuff_t *tvb, packet_info *pinfo, proto_tree *tree) {
    proto_item *ti = NULL;
    proto_tree *@ABBREV@_tree = NULL;
    guint32 type = 0;
    guint32 length = 0;
    guint32 version = 0;

    type = tvb_get_ntohl(tvb, 0);
    length = tvb_get_ntohl(tvb, 4);
    if (type >= @EXT_LO@ && type <= @EXT_HI@) {
        version = tvb_get_ntohl(tvb, 8);
    }

    col_set_str(pinfo->cinfo, COL_PROTOCOL, "@SHORT_NAME@");
    col_clear(pinfo->cinfo, COL_INFO);
    col_add_fstr(pinfo->cinfo, COL_INFO, "%-30s",
                 val_to_str(type, dictionary_type, "UNKNOWN(0x%02x)"));

    if (tree) {
        ti = proto_tree_add_item(tree, proto_@ABBREV@, tvb, 0, -1, ENC_NA);
        proto_item_append_text(ti, ", %s",
                val_to_str(type, dictionary_type, "UNKNOWN(0x%02x)"));

        @ABBREV@_tree = proto_item_add_subtree(ti, ett_@ABBREV@);
        proto_tree_add_item(@ABBREV@_tree, hf_@ABBREV@_type, tvb, 0, 4, ENC_BIG_ENDIAN);
        proto_tree_add_item(@ABBREV@_tree, hf_@ABBREV@_length, tvb, 4, 4, ENC_BIG_ENDIAN);
        if (type >= @EXT_LO@ && type <= @EXT_HI@) {
            proto_tree_add_item(@ABBREV@_tree, hf_@ABBREV@_version, tvb, 8, 4, ENC_BIG_ENDIAN);
        }
    }

    switch(type) {
"#;

const REGISTRATION_TEMPLATE: &str = r#"
static guint @ABBREV@_get_message_length(packet_info *pinfo, tvbuff_t *tvb, int offset) {
    (void)pinfo;
    (void)tvb;
    return (guint)(tvb_get_ntohl(tvb, offset + 4) + 8);
}

static void dissect_@ABBREV@(tvbuff_t *tvb, packet_info *pinfo, proto_tree *tree) {
    col_clear(pinfo->cinfo, COL_INFO);
    tcp_dissect_pdus(tvb, pinfo, tree, TRUE, 8, @ABBREV@_get_message_length, dissect_@ABBREV@_message, NULL);
}

static void register_tcp_port(guint32 port, gpointer ptr _U_) {
    if (port != 0) {
        dissector_add_uint("tcp.port", port, @ABBREV@_handle);
    }
}

static void unregister_tcp_port(guint32 port, gpointer ptr _U_)
{
    if (port != 0) {
        dissector_delete_uint("tcp.port", port, @ABBREV@_handle);
    }
}

void proto_reg_handoff_@ABBREV@(void) {
    static gboolean @ABBREV@_initialized = FALSE;
    static range_t *tcp_ports_@ABBREV@_copy  = NULL;

    if (!@ABBREV@_initialized) {
        @ABBREV@_handle = create_dissector_handle(dissect_@ABBREV@, proto_@ABBREV@);
        @ABBREV@_initialized = TRUE;
    } else {
        if (tcp_ports_@ABBREV@_copy != NULL) {
            range_foreach(tcp_ports_@ABBREV@_copy, unregister_tcp_port, NULL);
            g_free(tcp_ports_@ABBREV@_copy);
        }
    }
    tcp_ports_@ABBREV@_copy = range_copy(wmem_epan_scope(), tcp_ports_@ABBREV@);
    range_foreach(tcp_ports_@ABBREV@_copy, register_tcp_port, NULL);
}

void proto_register_@ABBREV@(void) {
    module_t *@ABBREV@_module = NULL;

    /* Subtree */
    static gint *ett[] = { &ett_@ABBREV@ };

    /* Fields */
    static hf_register_info hf[] = {
"#;

const REGISTRATION_TAIL_TEMPLATE: &str = r#"};
    proto_@ABBREV@ = proto_register_protocol("@PROTOCOL_NAME@", "@SHORT_NAME@", "@ABBREV@");
    proto_register_field_array(proto_@ABBREV@, hf, array_length(hf));
    proto_register_subtree_array(ett, array_length(ett));
    range_convert_str(wmem_epan_scope(), &tcp_ports_@ABBREV@, "@TCP_PORTS@", MAX_TCP_PORT);
    @ABBREV@_module = prefs_register_protocol(proto_@ABBREV@, proto_reg_handoff_@ABBREV@);
    prefs_register_range_preference(@ABBREV@_module, "tcp_ports",
                 "@SHORT_NAME@ TCP Ports",
                 "The TCP ports for the @PROTOCOL_NAME@",
                 &tcp_ports_@ABBREV@, 65535);
}
"#;
