use serde::Deserialize;

use crate::midi::channel::{self, ChannelId};
use crate::BackendError;

/// On/off option value, written as `"on"` / `"off"` in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Switch {
    On,
    #[default]
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        matches!(self, Switch::On)
    }
}

/// Whether transmitted (N)RPN runs end with the null-function trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpnTx {
    Short,
    #[default]
    Long,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendOptions {
    /// Enumerate visible devices to the log at startup.
    #[serde(default)]
    pub list: Switch,
    /// Log every incoming event with its resolved channel and value.
    #[serde(default)]
    pub detect: Switch,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub name: String,
    /// Input device, by numeric id or name prefix.
    #[serde(default)]
    pub read: Option<String>,
    /// Output device, by numeric id or name prefix.
    #[serde(default)]
    pub write: Option<String>,
    #[serde(default, rename = "epn-tx")]
    pub epn_tx: EpnTx,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendOptions,
    #[serde(default)]
    pub instance: Vec<InstanceConfig>,
    #[serde(default)]
    pub mapping: Vec<MappingConfig>,
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Split a mapping endpoint `<instance>.ch<N>.<type><C>` into the instance
/// name and channel identifier.
pub fn parse_endpoint(spec: &str) -> Result<(&str, ChannelId), BackendError> {
    let (name, channel_spec) = spec.split_once('.').ok_or_else(|| {
        BackendError::Parse(format!(
            "endpoint {spec} does not conform to <instance>.ch<X>.<type><Y>"
        ))
    })?;
    let channel = channel::parse_channel_spec(channel_spec)?;
    Ok((name, channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::channel::ControlType;
    use std::io::Write;

    #[test]
    fn loads_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[backend]
list = "on"
detect = "off"

[[instance]]
name = "keys"
read = "0"
epn-tx = "short"

[[instance]]
name = "synth"
write = "Loop"

[[mapping]]
from = "keys.ch0.cc1"
to = "synth.ch1.pitch"
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path().to_str().unwrap()).unwrap();
        assert!(config.backend.list.is_on());
        assert!(!config.backend.detect.is_on());
        assert_eq!(config.instance.len(), 2);
        assert_eq!(config.instance[0].name, "keys");
        assert_eq!(config.instance[0].read.as_deref(), Some("0"));
        assert_eq!(config.instance[0].epn_tx, EpnTx::Short);
        assert_eq!(config.instance[1].epn_tx, EpnTx::Long);
        assert_eq!(config.mapping.len(), 1);
    }

    #[test]
    fn defaults_are_off_and_long() {
        let config: Config = toml::from_str("").unwrap();
        assert!(!config.backend.list.is_on());
        assert!(!config.backend.detect.is_on());
        assert!(config.instance.is_empty());
    }

    #[test]
    fn rejects_unknown_options() {
        assert!(toml::from_str::<Config>("[backend]\nverbose = \"on\"\n").is_err());
        assert!(
            toml::from_str::<Config>("[[instance]]\nname = \"a\"\nport = 1\n").is_err()
        );
    }

    #[test]
    fn rejects_bad_switch_values() {
        assert!(toml::from_str::<Config>("[backend]\nlist = \"maybe\"\n").is_err());
    }

    #[test]
    fn parses_endpoints() {
        let (name, channel) = parse_endpoint("keys.ch2.nrpn130").unwrap();
        assert_eq!(name, "keys");
        assert_eq!(channel.kind, ControlType::Nrpn);
        assert_eq!(channel.channel, 2);
        assert_eq!(channel.control, 130);

        assert!(parse_endpoint("keys").is_err());
        assert!(parse_endpoint("keys.ch16.cc1").is_err());
    }
}
