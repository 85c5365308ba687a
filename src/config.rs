//! Generator configuration: protocol naming conventions and field display classes.
//!
//! Every knob has a default matching the LizardFS wire protocol, so an empty YAML
//! document (or no configuration at all) produces the stock dissector.
//!
//! ```yaml
//! protocol_name: LizardFS Protocol
//! short_name: LizardFS
//! abbrev: lizardfs
//! tcp_ports: 9419-9422
//! hex_fields: [vershex, rver, ip, crc]
//! oct_fields: [mode, modemask, umask]
//! ```

use serde::Deserialize;
use std::path::Path;

/// Size of the `type:32 length:32` prefix every message starts with.
pub const LENGTH_PREFIX_SIZE: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Long protocol name passed to `proto_register_protocol`.
    pub protocol_name: String,
    /// Short name shown in the protocol column.
    pub short_name: String,
    /// Filter prefix and C identifier stem (`hf_<abbrev>_<field>`).
    pub abbrev: String,
    /// Default TCP port range preference, e.g. `9419-9422`.
    pub tcp_ports: String,
    /// Prefix marking messages that carry an extra 32-bit `version` word.
    pub extended_prefix: String,
    /// Extra header bytes carried by extended messages.
    pub extended_header_size: u32,
    /// Inclusive range of message type codes whose header carries `version`.
    pub extended_type_range: (u32, u32),
    /// Role codes allowed on both sides of `TO` in message identifiers.
    pub roles: Vec<String>,
    /// Prefixes of `chunkid`/`chunkversion`/`chunktype` groups, e.g. `copychunkid`.
    pub chunk_prefixes: Vec<String>,
    pub hex_fields: Vec<String>,
    pub oct_fields: Vec<String>,
    /// Dictionaries whose entries come from `dict_<name>-inl.h` instead of the input.
    pub external_dictionaries: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let chunk_prefixes: Vec<String> = ["", "old", "new", "copy"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut hex_fields: Vec<String> = ["vershex", "rver", "ip", "crc"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for prefix in &chunk_prefixes {
            hex_fields.push(format!("{}chunkid", prefix));
            hex_fields.push(format!("{}chunkversion", prefix));
        }
        GeneratorConfig {
            protocol_name: "LizardFS Protocol".to_string(),
            short_name: "LizardFS".to_string(),
            abbrev: "lizardfs".to_string(),
            tcp_ports: "9419-9422".to_string(),
            extended_prefix: "LIZ_".to_string(),
            extended_header_size: 4,
            extended_type_range: (1000, 2000),
            roles: ["AN", "CS", "CL", "MA", "ML", "TS"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            chunk_prefixes,
            hex_fields,
            oct_fields: ["mode", "modemask", "umask"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            external_dictionaries: ["chunktype", "goal"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl GeneratorConfig {
    /// Parse a YAML document; missing keys keep their defaults.
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: GeneratorConfig = if source.trim().is_empty() {
            GeneratorConfig::default()
        } else {
            serde_yaml::from_str(source)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let is_c_ident = |s: &str| {
            !s.is_empty()
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !s.starts_with(|c: char| c.is_ascii_digit())
        };
        if !is_c_ident(&self.abbrev) {
            return Err(ConfigError::Invalid(format!(
                "abbrev '{}' is not a valid C identifier",
                self.abbrev
            )));
        }
        if self.roles.is_empty() {
            return Err(ConfigError::Invalid("roles must not be empty".to_string()));
        }
        let (lo, hi) = self.extended_type_range;
        if lo > hi {
            return Err(ConfigError::Invalid(format!(
                "extended_type_range ({}, {}) is empty",
                lo, hi
            )));
        }
        Ok(())
    }

    /// True when `message` carries the extended prefix (and so the extra version word).
    pub fn is_extended(&self, message: &str) -> bool {
        !self.extended_prefix.is_empty() && message.starts_with(&self.extended_prefix)
    }

    /// Absolute offset of the first variant field of `message`.
    pub fn header_size(&self, message: &str) -> u32 {
        LENGTH_PREFIX_SIZE.saturating_add(self.extra_header_size(message))
    }

    /// Header bytes beyond the length prefix, counted in the payload length.
    pub fn extra_header_size(&self, message: &str) -> u32 {
        if self.is_extended(message) {
            self.extended_header_size
        } else {
            0
        }
    }

    /// `[EXT](ROLE)TO(ROLE)_[A-Z0-9_]+`
    pub fn is_command_name(&self, ident: &str) -> bool {
        let rest = ident.strip_prefix(&self.extended_prefix).unwrap_or(ident);
        let Some(rest) = self.strip_role(rest) else {
            return false;
        };
        let Some(rest) = rest.strip_prefix("TO") else {
            return false;
        };
        let Some(rest) = self.strip_role(rest) else {
            return false;
        };
        match rest.strip_prefix('_') {
            Some(tail) => {
                !tail.is_empty()
                    && tail
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
            }
            None => false,
        }
    }

    fn strip_role<'a>(&self, s: &'a str) -> Option<&'a str> {
        self.roles.iter().find_map(|role| s.strip_prefix(role.as_str()))
    }

    pub fn is_hex_field(&self, name: &str) -> bool {
        self.hex_fields.iter().any(|f| f == name)
    }

    pub fn is_oct_field(&self, name: &str) -> bool {
        self.oct_fields.iter().any(|f| f == name)
    }

    pub fn is_external_dictionary(&self, name: &str) -> bool {
        self.external_dictionaries.iter().any(|f| f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_follow_convention() {
        let config = GeneratorConfig::default();
        assert!(config.is_command_name("CLTOMA_FUSE_LOOKUP"));
        assert!(config.is_command_name("LIZ_CSTOCL_READ_DATA"));
        assert!(config.is_command_name("ANTOAN_NOP"));
        assert!(!config.is_command_name("ERROR_ENOENT"));
        assert!(!config.is_command_name("CLTOMA_"));
        assert!(!config.is_command_name("CLTOXX_FOO"));
        assert!(!config.is_command_name("CLTOMA_fuse"));
    }

    #[test]
    fn extended_messages_have_bigger_header() {
        let config = GeneratorConfig::default();
        assert_eq!(config.header_size("CLTOMA_FOO"), 8);
        assert_eq!(config.header_size("LIZ_CLTOMA_FOO"), 12);
        assert_eq!(config.extra_header_size("LIZ_CLTOMA_FOO"), 4);
    }

    #[test]
    fn chunk_fields_are_hex_by_default() {
        let config = GeneratorConfig::default();
        assert!(config.is_hex_field("chunkid"));
        assert!(config.is_hex_field("copychunkversion"));
        assert!(config.is_oct_field("umask"));
        assert!(!config.is_hex_field("inode"));
    }

    #[test]
    fn yaml_overrides_keep_other_defaults() {
        let config = GeneratorConfig::from_yaml("abbrev: moosefs\ntcp_ports: 9420-9421\n")
            .expect("config");
        assert_eq!(config.abbrev, "moosefs");
        assert_eq!(config.tcp_ports, "9420-9421");
        assert_eq!(config.extended_prefix, "LIZ_");
    }

    #[test]
    fn huge_extended_header_saturates() {
        let config = GeneratorConfig::from_yaml("extended_header_size: 4294967295\n").expect("config");
        assert_eq!(config.header_size("LIZ_CLTOMA_FOO"), u32::MAX);
        assert_eq!(config.header_size("CLTOMA_FOO"), 8);
    }

    #[test]
    fn yaml_rejects_bad_abbrev() {
        let err = GeneratorConfig::from_yaml("abbrev: \"my-proto\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{}", err);
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        assert!(GeneratorConfig::from_yaml("no_such_key: 1\n").is_err());
    }
}
