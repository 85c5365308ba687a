//! # dissectgen: packet dissectors from annotated protocol headers
//!
//! Reads a C header in which message codes are `#define`d and each message is followed
//! by one `///` line per encoding variant, and generates a Wireshark dissector in C:
//! one routine per variant, a dispatcher choosing the variant at decode time, an Info
//! column summary and the protocol registration boilerplate.
//!
//! ## DSL structure
//!
//! - **Messages**: `#define CLTOMA_FUSE_READ (PROTO_BASE + 432)` (command naming
//!   convention `[LIZ_]XXTOYY_NAME`, see [`GeneratorConfig`])
//! - **Variants**: `/// msgid:32 inode:32 name:NAME` lines following the message
//! - **Dictionaries**: `/// field values: status` followed by `#define` entries up to
//!   the next blank line
//!
//! ## Field tokens
//!
//! `name[condition][:type]`, where `type` is one of
//!
//! - `8`, `16`, `32`, `64`: big-endian unsigned integers
//! - `NAME`/`STRING8`, `STDSTRING`/`STRING32`: strings with an 8/32-bit length prefix
//! - `STRING`, `STRING[n]`, `STRING[field]`
//! - `BYTES`, `BYTES[n]`, `BYTES[field]`, `nB`, `(free text)`
//!
//! A condition such as `version==2` or `length>=12` selects the variant; `-` ends the
//! field list.
//!
//! ## Example DSL
//!
//! ```text
//! #define LIZ_CLTOCS_READ 1200
//! /// version==0 chunkid:64 chunkversion:32 chunktype:8 offset:32 size:32
//!
//! /// field values: status
//! #define STATUS_OK 0
//! #define ERROR_EPERM 1
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! let source = std::fs::read_to_string("MFSCommunication.h").unwrap();
//! let model = dissectgen::parse(&source).unwrap();
//! let c_source = dissectgen::generate(&model).unwrap();
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod dictionary;
pub mod info;
pub mod model;
pub mod parser;
pub mod registry;
pub mod variant;

pub use codegen::{generate, GenerateError};
pub use config::{ConfigError, GeneratorConfig};
pub use model::{FieldKind, FieldLength, FieldSpec, MessageDefinition, ModelError, ProtocolModel};
pub use parser::{parse, parse_with_config, ParseError, ParseErrorKind, Parser};
pub use variant::{Condition, PacketVariant, VariantBuilder, VariantCondition};
