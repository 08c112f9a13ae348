// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::enclosure::EnclosureFilter;
use crate::error::ConfigError;
use crate::state::channel_file_path;
use crate::sync::Channel;

/// Section whose keys every channel inherits
pub const DEFAULTS_SECTION: &str = "*";

const CONFIG_FILE_NAME: &str = ".podspoolrc";
const CHANNEL_DIR_NAME: &str = ".podspool";

/// Keys accepted in a channel section, all optional before merging
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    pub url: Option<String>,
    pub spool: Option<PathBuf>,
    pub filename: Option<String>,
    pub playlist: Option<PathBuf>,
    pub filter: Option<String>,
    pub user_agent: Option<String>,
}

impl ChannelSection {
    fn or(self, defaults: &ChannelSection) -> Self {
        Self {
            url: self.url.or_else(|| defaults.url.clone()),
            spool: self.spool.or_else(|| defaults.spool.clone()),
            filename: self.filename.or_else(|| defaults.filename.clone()),
            playlist: self.playlist.or_else(|| defaults.playlist.clone()),
            filter: self.filter.or_else(|| defaults.filter.clone()),
            user_agent: self.user_agent.or_else(|| defaults.user_agent.clone()),
        }
    }
}

/// Channel settings after defaults are applied and mandatory keys checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub identifier: String,
    pub url: String,
    pub spool: PathBuf,
    pub filename: Option<String>,
    pub playlist: Option<PathBuf>,
    pub filter: Option<String>,
    pub user_agent: Option<String>,
}

impl ChannelConfig {
    /// Build the channel definition used by the synchronizer.
    ///
    /// The state file is placed in `channel_dir` and named after the
    /// channel identifier.
    pub fn to_channel(&self, channel_dir: &Path) -> Result<Channel, ConfigError> {
        let filter = self
            .filter
            .as_deref()
            .map(|pattern| EnclosureFilter::new(pattern, false))
            .transpose()?;

        Ok(Channel {
            identifier: self.identifier.clone(),
            url: self.url.clone(),
            spool_directory: self.spool.clone(),
            filename_pattern: self.filename.clone(),
            filter,
            state_file: channel_file_path(channel_dir, &self.identifier),
        })
    }
}

/// The parsed configuration file.
///
/// Each table is one channel keyed by its identifier, except for the
/// optional `["*"]` table which holds defaults. Channels keep file order.
/// Sections are validated when a channel is resolved, so one bad section
/// only affects its own channel.
#[derive(Debug, Clone, Default)]
pub struct Config {
    defaults: Option<toml::Value>,
    channels: Vec<(String, toml::Value)>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config = Self::default();
        for (identifier, value) in table {
            if identifier == DEFAULTS_SECTION {
                config.defaults = Some(value);
            } else {
                config.channels.push((identifier, value));
            }
        }

        tracing::debug!(path = %path.display(), channels = config.channels.len(), "loaded configuration");
        Ok(config)
    }

    /// Channel identifiers in file order
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(identifier, _)| identifier.as_str())
    }

    /// Look up a channel, check its keys and merge in the defaults
    pub fn resolve(&self, identifier: &str) -> Result<ChannelConfig, ConfigError> {
        let value = self
            .channels
            .iter()
            .find(|(name, _)| name == identifier)
            .map(|(_, value)| value)
            .ok_or_else(|| ConfigError::UnknownChannel(identifier.to_string()))?;

        let defaults = match &self.defaults {
            Some(defaults) => parse_section(DEFAULTS_SECTION, defaults)?,
            None => ChannelSection::default(),
        };
        let section = parse_section(identifier, value)?.or(&defaults);

        let url = section
            .url
            .ok_or_else(|| ConfigError::MissingUrl(identifier.to_string()))?;
        let spool = section
            .spool
            .ok_or_else(|| ConfigError::MissingSpoolDirectory(identifier.to_string()))?;

        Ok(ChannelConfig {
            identifier: identifier.to_string(),
            url,
            spool,
            filename: section.filename,
            playlist: section.playlist,
            filter: section.filter,
            user_agent: section.user_agent,
        })
    }
}

fn parse_section(identifier: &str, value: &toml::Value) -> Result<ChannelSection, ConfigError> {
    value
        .clone()
        .try_into()
        .map_err(|e| ConfigError::InvalidSection {
            identifier: identifier.to_string(),
            source: e,
        })
}

/// `~/.podspoolrc`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

/// `~/.podspool`, where channel state files are kept
pub fn default_channel_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CHANNEL_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
["*"]
spool = "/home/user/podcasts"
filename = "%(channel_title) - %(title).mp3"

[zeta]
url = "https://example.com/zeta.xml"

[alpha]
url = "https://example.com/alpha.xml"
spool = "/srv/alpha"
filter = "\\.mp3$"
playlist = "/srv/alpha.m3u"
user_agent = "custom/1.0"
"#;

    fn parse(content: &str) -> Result<Config, ConfigError> {
        Config::parse(content, Path::new("podspoolrc"))
    }

    #[test]
    fn channels_keep_file_order() {
        let config = parse(SAMPLE).unwrap();

        assert_eq!(config.identifiers().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let config = parse(SAMPLE).unwrap();

        let zeta = config.resolve("zeta").unwrap();
        assert_eq!(zeta.spool, PathBuf::from("/home/user/podcasts"));
        assert_eq!(zeta.filename.as_deref(), Some("%(channel_title) - %(title).mp3"));
        assert_eq!(zeta.filter, None);

        let alpha = config.resolve("alpha").unwrap();
        assert_eq!(alpha.spool, PathBuf::from("/srv/alpha"));
        assert_eq!(alpha.filter.as_deref(), Some(r"\.mp3$"));
        assert_eq!(alpha.playlist, Some(PathBuf::from("/srv/alpha.m3u")));
        assert_eq!(alpha.user_agent.as_deref(), Some("custom/1.0"));
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let config = parse(SAMPLE).unwrap();

        assert!(matches!(
            config.resolve("missing"),
            Err(ConfigError::UnknownChannel(ref id)) if id == "missing"
        ));
        assert!(matches!(
            config.resolve(DEFAULTS_SECTION),
            Err(ConfigError::UnknownChannel(_))
        ));
    }

    #[test]
    fn url_and_spool_are_mandatory() {
        let config = parse("[a]\nspool = \"/tmp\"\n[b]\nurl = \"https://example.com/b.xml\"\n").unwrap();

        assert!(matches!(config.resolve("a"), Err(ConfigError::MissingUrl(_))));
        assert!(matches!(
            config.resolve("b"),
            Err(ConfigError::MissingSpoolDirectory(_))
        ));
    }

    #[test]
    fn unknown_keys_only_fail_their_channel() {
        let config = parse(
            "[good]\nurl = \"https://example.com/good.xml\"\nspool = \"/tmp\"\n\
             [bad]\nurl = \"https://example.com/bad.xml\"\nspool = \"/tmp\"\nid3title = \"x\"\n",
        )
        .unwrap();

        assert_eq!(config.identifiers().collect::<Vec<_>>(), vec!["good", "bad"]);
        assert_eq!(config.resolve("good").unwrap().url, "https://example.com/good.xml");
        assert!(matches!(
            config.resolve("bad"),
            Err(ConfigError::InvalidSection { ref identifier, .. }) if identifier == "bad"
        ));
    }

    #[test]
    fn invalid_defaults_are_reported_on_resolve() {
        let config = parse("[\"*\"]\nspoool = \"/tmp\"\n[show]\nurl = \"u\"\nspool = \"/tmp\"\n").unwrap();

        assert!(matches!(
            config.resolve("show"),
            Err(ConfigError::InvalidSection { ref identifier, .. }) if identifier == DEFAULTS_SECTION
        ));
    }

    #[test]
    fn top_level_values_are_rejected_as_channels() {
        let config = parse("url = \"https://example.com/feed.xml\"\n").unwrap();

        assert!(matches!(
            config.resolve("url"),
            Err(ConfigError::InvalidSection { .. })
        ));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        assert!(matches!(
            parse("[show\nurl = 1"),
            Err(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("podspoolrc");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.identifiers().count(), 2);

        let missing = Config::load(&dir.path().join("missing"));
        assert!(matches!(missing, Err(ConfigError::ReadFailed { .. })));
    }

    #[test]
    fn to_channel_compiles_filter_and_state_path() {
        let config = parse(SAMPLE).unwrap();
        let alpha = config.resolve("alpha").unwrap();

        let channel = alpha.to_channel(Path::new("/home/user/.podspool")).unwrap();

        assert_eq!(channel.state_file, PathBuf::from("/home/user/.podspool/alpha.xml"));
        assert_eq!(channel.spool_directory, PathBuf::from("/srv/alpha"));
        assert!(channel.filter.as_ref().unwrap().matches("https://example.com/a.mp3"));
        assert!(!channel.filter.as_ref().unwrap().matches("https://example.com/a.ogg"));
    }

    #[test]
    fn invalid_filter_is_reported() {
        let config = parse("[show]\nurl = \"u\"\nspool = \"/tmp\"\nfilter = \"(\"\n").unwrap();

        let result = config.resolve("show").unwrap().to_channel(Path::new("/tmp"));

        assert!(matches!(result, Err(ConfigError::InvalidFilter { .. })));
    }
}
