//! DSL tests: header syntax (parse success/failure) and the resulting layout semantics
//! (offsets, lengths, conditions, dictionaries, field types).

use dissectgen::dictionary::Dictionary;
use dissectgen::{
    parse, FieldKind, FieldLength, ModelError, ParseErrorKind, VariantCondition,
};

fn parse_err(src: &str) -> ParseErrorKind {
    parse(src).expect_err("parse should fail").kind
}

// ==================== Messages and variants ====================

#[test]
fn empty_input_has_no_messages() {
    let model = parse("").expect("empty input");
    assert_eq!(model.messages().count(), 0);
    assert!(model.dictionaries.entries("type").unwrap().is_empty());
}

#[test]
fn name_string_variant_layout() {
    let model = parse("#define CLTOMA_FOO 1\n/// type:8 name:NAME\n").expect("parse");
    let message = model.get_message("CLTOMA_FOO").expect("message");
    assert_eq!(message.variants.len(), 1);
    let v = &message.variants[0];

    let names: Vec<&str> = v.fields().iter().map(|f| f.spec.name.as_str()).collect();
    assert_eq!(names, vec!["type", "name__strlen", "name"]);
    assert_eq!(v.field("type").unwrap().spec.int_bytes(), Some(1));
    assert_eq!(v.field("name__strlen").unwrap().spec.width_bits, Some(8));
    assert_eq!(
        v.field("name").unwrap().spec.length,
        Some(FieldLength::Symbol("name__strlen".into()))
    );

    assert_eq!(v.total_length(), None);
    assert_eq!(v.min_length(), 10);
    assert_eq!(v.min_payload_length(), 2);
    assert_eq!(v.condition(), VariantCondition::MinLength(2));
}

#[test]
fn constant_layout_offsets() {
    let model = parse("#define CLTOMA_FUSE_GETATTR 400\n/// msgid:32 inode:32 uid:32 gid:32\n")
        .expect("parse");
    let v = &model.get_message("CLTOMA_FUSE_GETATTR").unwrap().variants[0];
    let offsets: Vec<String> = v.fields().iter().map(|f| f.offset.to_string()).collect();
    assert_eq!(offsets, vec!["8", "12", "16", "20"]);
    assert_eq!(v.total_length(), Some(24));
    assert_eq!(v.payload_length(), Some(16));
    assert_eq!(v.condition().to_string(), "length == 16");
}

#[test]
fn symbolic_offsets_accumulate() {
    let src = "#define CLTOMA_FUSE_RENAME 410\n\
               /// msgid:32 name_src:NAME name_dst:STDSTRING uid:32\n";
    let model = parse(src).expect("parse");
    let v = &model.get_message("CLTOMA_FUSE_RENAME").unwrap().variants[0];
    assert_eq!(v.field("name_src").unwrap().offset.to_string(), "13");
    assert_eq!(
        v.field("name_dst__strlen").unwrap().offset.to_string(),
        "13+name_src__strlen"
    );
    assert_eq!(
        v.field("uid").unwrap().offset.to_string(),
        "17+name_src__strlen+name_dst__strlen"
    );
    assert!(!v.field("uid").unwrap().offset.is_constant());
    // 4 + 1 + 4 + 4 bytes of fixed payload
    assert_eq!(v.min_payload_length(), 13);
    assert_eq!(
        v.symbolic_payload_length().unwrap().to_string(),
        "13+name_src__strlen+name_dst__strlen"
    );
}

#[test]
fn explicit_lengths() {
    let src = "#define MATOCL_FUSE_GETATTR 401\n\
               /// msgid:32 size:16 attr:35B label:STRING[16] blob:BYTES[size]\n";
    let model = parse(src).expect("parse");
    let v = &model.get_message("MATOCL_FUSE_GETATTR").unwrap().variants[0];
    assert_eq!(v.field("attr").unwrap().spec.kind, FieldKind::Blob);
    assert_eq!(v.field("label").unwrap().offset.to_string(), "49");
    assert_eq!(v.field("blob").unwrap().offset.to_string(), "65");
    assert_eq!(v.min_payload_length(), 57);
    assert_eq!(v.total_length(), None);
}

#[test]
fn open_ended_field_closes_variant() {
    let model = parse("#define CSTOCL_READ_DATA 201\n/// chunkid:64 data:BYTES\n").expect("parse");
    let v = &model.get_message("CSTOCL_READ_DATA").unwrap().variants[0];
    assert!(v.has_open_ended_field());
    assert_eq!(v.total_length(), None);
    assert_eq!(v.min_length(), 16);
    assert_eq!(v.condition(), VariantCondition::MinLength(8));
    assert!(v.symbolic_payload_length().is_none());

    let err = parse_err("#define CSTOCL_READ_DATA 201\n/// data:BYTES crc:32\n");
    assert_eq!(
        err,
        ParseErrorKind::Model(ModelError::FieldAfterOpenEnded {
            field: "crc".into(),
            open_field: "data".into()
        })
    );
}

#[test]
fn open_ended_only_variant_matches_anything() {
    let model = parse("#define ANTOAN_ECHO 5\n/// text:STRING\n").expect("parse");
    let v = &model.get_message("ANTOAN_ECHO").unwrap().variants[0];
    assert_eq!(v.condition(), VariantCondition::Always);
    assert_eq!(v.condition().to_string(), "1");
}

#[test]
fn annotations_are_opaque_bytes() {
    let src = "#define MATOCL_FUSE_READ_CHUNK 433\n\
               /// msgid:32 chunkid:64 locations:(N * [ ip:32 port:16 ])\n";
    let model = parse(src).expect("parse");
    let v = &model.get_message("MATOCL_FUSE_READ_CHUNK").unwrap().variants[0];
    assert_eq!(v.fields().len(), 3);
    let locations = v.field("locations").unwrap();
    assert_eq!(locations.spec.kind, FieldKind::Blob);
    assert!(locations.spec.length.is_none());
    assert!(v.field("ip").is_none());
}

#[test]
fn variants_keep_declaration_order() {
    let src = "#define MATOCL_FUSE_LOOKUP 407\n/// msgid:32 status:8\n/// msgid:32 inode:32 attr:35B\n";
    let model = parse(src).expect("parse");
    let m = model.get_message("MATOCL_FUSE_LOOKUP").unwrap();
    let conditions: Vec<String> = m.variants.iter().map(|v| v.condition().to_string()).collect();
    assert_eq!(conditions, vec!["length == 5", "length == 43"]);
}

#[test]
fn non_command_defines_are_ignored() {
    let src = "#define PROTO_BASE 0\n#define MFS_ROOT_ID 1\n#define _HEADER_H_\n\
               #define CLTOMA_FOO (PROTO_BASE+1)\n/// a:8\n";
    let model = parse(src).expect("parse");
    let names: Vec<&str> = model.messages().map(|m| m.identifier.as_str()).collect();
    assert_eq!(names, vec!["CLTOMA_FOO"]);
    assert_eq!(model.dictionaries.entries("type").unwrap(), &["CLTOMA_FOO"]);
}

#[test]
fn message_without_variants_is_kept() {
    let model = parse("#define MATOCL_FOO 1\n").expect("parse");
    assert!(model.get_message("MATOCL_FOO").unwrap().variants.is_empty());
}

#[test]
fn redefined_message_keeps_last_definition() {
    let src = "\
// 0x05F6
#define LIZ_CLTOMA_CHUNKS_HEALTH (1000U + 526U)
/// regularonly:8

// 0x05F7
#define LIZ_MATOCL_CHUNKS_HEALTH (1000U + 527U)
/// regularonly:8 data:(ChunksAvailabilityState ChunksReplicationState)

// 0x05F6
#define LIZ_CLTOMA_CHUNKS_HEALTH (1000U + 526U)
/// regularonly:8

// 0x05F7
#define LIZ_MATOCL_CHUNKS_HEALTH (1000U + 527U)
// G - All goals count. Goal 1-9 + xor2-10 + goal 0 = 19
/// regularonly:8 tables:(availability:[G * safe:64, G * lost:64], replication:G * [C * chunks:64])
";
    let model = parse(src).expect("redefinitions are accepted");
    assert_eq!(model.messages().count(), 2);
    assert_eq!(
        model.dictionaries.entries("type").unwrap(),
        &["LIZ_CLTOMA_CHUNKS_HEALTH", "LIZ_MATOCL_CHUNKS_HEALTH"]
    );

    let request = model.get_message("LIZ_CLTOMA_CHUNKS_HEALTH").unwrap();
    assert_eq!(request.variants.len(), 1);

    let reply = model.get_message("LIZ_MATOCL_CHUNKS_HEALTH").unwrap();
    assert_eq!(reply.variants.len(), 1);
    let v = &reply.variants[0];
    assert!(v.field("data").is_none());
    let tables = v.field("tables").expect("second definition wins");
    assert_eq!(tables.spec.kind, FieldKind::Blob);
    assert_eq!(tables.offset.to_string(), "13");
}

// ==================== Extended (LIZ_) messages ====================

#[test]
fn extended_header_shifts_fields() {
    let model = parse("#define LIZ_CLTOMA_FOO 1001\n/// msgid:32 a:8\n").expect("parse");
    let v = &model.get_message("LIZ_CLTOMA_FOO").unwrap().variants[0];
    assert_eq!(v.header_size(), 12);
    assert_eq!(v.field("msgid").unwrap().offset.to_string(), "12");
    assert_eq!(v.total_length(), Some(17));
    assert_eq!(v.payload_length(), Some(9));
    assert_eq!(v.condition().to_string(), "version == 0");
    assert_eq!(v.length_guard().to_string(), "length == 9");
}

#[test]
fn extended_explicit_condition_wins() {
    let src = "#define LIZ_CLTOMA_FUSE_GETDIR 1300\n\
               /// version==1 msgid:32\n\
               /// version==2 msgid:32 firstentry:64\n";
    let model = parse(src).expect("parse");
    let m = model.get_message("LIZ_CLTOMA_FUSE_GETDIR").unwrap();
    assert_eq!(m.variants[0].condition().to_string(), "version==1");
    assert_eq!(m.variants[1].condition().to_string(), "version==2");
    assert_eq!(m.variants[1].condition().variable(), "version");
}

// ==================== Conditions ====================

#[test]
fn condition_with_type_declares_field() {
    let model = parse("#define CSTOCS_GET_CHUNKBLOCKS 500\n/// rver==1:8 chunkid:64\n").expect("parse");
    let v = &model.get_message("CSTOCS_GET_CHUNKBLOCKS").unwrap().variants[0];
    let cond = v.explicit_condition().expect("condition");
    assert_eq!(cond.variable, "rver");
    assert_eq!(cond.expression, "==1");
    assert_eq!(v.field("rver").unwrap().spec.kind, FieldKind::IntHex);
}

#[test]
fn second_condition_is_fatal() {
    let err = parse_err("#define CLTOMA_FOO 1\n/// a==1:8 b==2:8\n");
    assert_eq!(
        err,
        ParseErrorKind::Model(ModelError::DuplicateCondition {
            existing: "a".into(),
            variable: "b".into()
        })
    );
}

// ==================== Field types ====================

#[test]
fn same_field_same_type_across_variants() {
    let src = "#define CLTOMA_A 1\n/// mode:8\n#define CLTOMA_B 2\n/// inode:32 mode:8\n";
    let model = parse(src).expect("parse");
    let t = model.field_types.get("mode").expect("mode registered");
    assert_eq!(t.kind, FieldKind::IntOctal);
    assert_eq!(t.bits, Some(8));
}

#[test]
fn integer_widths_widen() {
    let src = "#define CLTOMA_A 1\n/// size:16\n#define CLTOMA_B 2\n/// size:64\n";
    let model = parse(src).expect("parse");
    assert_eq!(model.field_types.get("size").unwrap().bits, Some(64));
}

#[test]
fn same_field_conflicting_type_is_fatal() {
    let src = "#define CLTOMA_A 1\n/// mode:8\n#define CLTOMA_B 2\n/// mode:NAME\n";
    let err = parse(src).expect_err("type conflict");
    assert_eq!(err.line_number, 4);
    assert_eq!(err.message.as_deref(), Some("CLTOMA_B"));
    assert_eq!(
        err.kind,
        ParseErrorKind::Model(ModelError::TypeConflict {
            field: "mode".into(),
            previous: FieldKind::IntOctal,
            current: FieldKind::String
        })
    );
}

#[test]
fn display_classes() {
    let src = "#define CLTOMA_A 1\n/// ip:32 umask:16 inode:32 copychunkid:64\n";
    let model = parse(src).expect("parse");
    let kind = |n: &str| model.field_types.get(n).unwrap().kind;
    assert_eq!(kind("ip"), FieldKind::IntHex);
    assert_eq!(kind("umask"), FieldKind::IntOctal);
    assert_eq!(kind("inode"), FieldKind::IntDecimal);
    assert_eq!(kind("copychunkid"), FieldKind::IntHex);
}

#[test]
fn string_helpers_are_not_registered() {
    let model = parse("#define CLTOMA_A 1\n/// name:NAME\n").expect("parse");
    assert!(model.field_types.contains("name"));
    assert!(!model.field_types.contains("name__strlen"));
}

#[test]
fn bad_tokens_are_fatal() {
    assert!(matches!(
        parse_err("#define CLTOMA_A 1\n/// a:12\n"),
        ParseErrorKind::UnsupportedIntWidth { .. }
    ));
    assert!(matches!(
        parse_err("#define CLTOMA_A 1\n/// a:08\n"),
        ParseErrorKind::UnsupportedIntWidth { .. }
    ));
    assert!(matches!(
        parse_err("#define CLTOMA_A 1\n/// a:FLOAT\n"),
        ParseErrorKind::UnknownTypeTag { .. }
    ));
    assert!(matches!(
        parse_err("#define CLTOMA_A 1\n/// a\n"),
        ParseErrorKind::MissingType(_)
    ));
    assert!(matches!(
        parse_err("#define CLTOMA_A 1\n/// a:STRING[]\n"),
        ParseErrorKind::UnknownTypeTag { .. }
    ));
}

// ==================== Dictionaries ====================

#[test]
fn inline_dictionary_keeps_order() {
    let src = "/// field values: status\n\
               #define STATUS_OK 0 // OK\n\
               #define ERROR_EPERM 1\n\
               #define ERROR_ENOTDIR 2\n\
               \n\
               #define MATOCL_FUSE_STATUS 3\n/// status:8\n";
    let model = parse(src).expect("parse");
    assert_eq!(
        model.dictionaries.entries("status").unwrap(),
        &["STATUS_OK", "ERROR_EPERM", "ERROR_ENOTDIR"]
    );
    assert!(model.has_dictionary("status"));
    assert!(!model.has_dictionary("msgid"));
}

#[test]
fn external_dictionaries_are_predefined() {
    let model = parse("").expect("parse");
    assert_eq!(model.dictionaries.get("goal"), Some(&Dictionary::External));
    assert_eq!(model.dictionaries.get("chunktype"), Some(&Dictionary::External));
    let external: Vec<&str> = model.dictionaries.external().collect();
    assert_eq!(external, vec!["chunktype", "goal"]);
}

#[test]
fn dictionary_errors() {
    assert_eq!(
        parse_err("/// field values: goal\n"),
        ParseErrorKind::Model(ModelError::ExternalDictionary("goal".into()))
    );
    assert_eq!(
        parse_err("/// field values:\n"),
        ParseErrorKind::MissingDictionaryName
    );
}

#[test]
fn message_type_dictionary_lists_all_messages() {
    let src = "#define MATOCL_B 2\n/// a:8\n#define CLTOMA_A 1\n";
    let model = parse(src).expect("parse");
    assert_eq!(model.dictionaries.entries("type").unwrap(), &["MATOCL_B", "CLTOMA_A"]);
    // messages iterate sorted by identifier
    let names: Vec<&str> = model.messages().map(|m| m.identifier.as_str()).collect();
    assert_eq!(names, vec!["CLTOMA_A", "MATOCL_B"]);
}
