// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use html_escape::encode_double_quoted_attribute;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::StateError;

const ROOT_ELEMENT: &[u8] = b"channel";
const ENCLOSURE_ELEMENT: &[u8] = b"enclosure";
const FORMAT_VERSION: &str = "1.0";

/// Persisted download ledger of one channel.
///
/// Maps enclosure URLs to the time they were downloaded. A `None` timestamp
/// marks an entry written without one; it still counts as downloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    /// When the feed was last retrieved successfully
    pub last_fetched: Option<String>,
    /// Downloaded enclosure URLs, sorted so that saved files are stable
    pub downloaded: BTreeMap<String, Option<String>>,
}

impl ChannelState {
    /// Load the state of a channel. A missing file yields an empty state.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let xml = match std::fs::read_to_string(path) {
            Ok(xml) => xml,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no channel file yet");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(StateError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        Self::from_xml(&xml).map_err(|e| match e {
            ParseProblem::Xml(source) => StateError::ParseFailed {
                path: path.to_path_buf(),
                source,
            },
            ParseProblem::Structure(reason) => StateError::Malformed {
                path: path.to_path_buf(),
                reason,
            },
        })
    }

    /// Atomically replace the channel file at `path` with this state.
    ///
    /// The document is written to a temporary file in the same directory and
    /// renamed over the destination. On any failure the temporary file is
    /// removed and the previous channel file is left as it was.
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let prefix = format!(
            "{}.",
            path.file_name()
                .map(|name| name.to_string_lossy())
                .unwrap_or_default()
        );

        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .tempfile_in(dir)
            .map_err(|e| StateError::TempFileFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let write_err = |e| StateError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        };
        tmp.write_all(self.to_xml().as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;

        tmp.persist(path).map_err(|e| StateError::RenameFailed {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        tracing::debug!(
            path = %path.display(),
            enclosures = self.downloaded.len(),
            "saved channel file"
        );
        Ok(())
    }

    /// Whether the enclosure at `url` has been handled before
    pub fn is_downloaded(&self, url: &str) -> bool {
        self.downloaded.contains_key(url)
    }

    /// Record `url` as downloaded at `timestamp`
    pub fn mark_downloaded(&mut self, url: &str, timestamp: String) {
        self.downloaded.insert(url.to_string(), Some(timestamp));
    }

    /// Serialize to the channel file format
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

        match &self.last_fetched {
            Some(fetched) => xml.push_str(&format!(
                "<channel version=\"{FORMAT_VERSION}\" rsslastfetched=\"{}\">\n",
                encode_double_quoted_attribute(fetched)
            )),
            None => xml.push_str(&format!("<channel version=\"{FORMAT_VERSION}\">\n")),
        }

        for (url, downloaded_at) in &self.downloaded {
            let url = encode_double_quoted_attribute(url);
            let line = match downloaded_at {
                Some(time) => format!(
                    "  <enclosure url=\"{url}\" downloadtime=\"{}\"/>\n",
                    encode_double_quoted_attribute(time)
                ),
                None => format!("  <enclosure url=\"{url}\"/>\n"),
            };
            xml.push_str(&line);
        }

        xml.push_str("</channel>\n");
        xml
    }

    fn from_xml(xml: &str) -> Result<Self, ParseProblem> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut state = Self::default();
        let mut seen_root = false;
        let mut depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(element) => {
                    state.visit(&element, depth, &mut seen_root)?;
                    depth += 1;
                }
                Event::Empty(element) => state.visit(&element, depth, &mut seen_root)?,
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(ParseProblem::Structure("missing channel element".to_string()));
        }
        if depth != 0 {
            return Err(ParseProblem::Structure("unclosed element".to_string()));
        }

        Ok(state)
    }

    fn visit(
        &mut self,
        element: &BytesStart<'_>,
        depth: usize,
        seen_root: &mut bool,
    ) -> Result<(), ParseProblem> {
        match depth {
            0 => {
                if element.name().as_ref() != ROOT_ELEMENT {
                    return Err(ParseProblem::Structure(format!(
                        "unexpected root element <{}>",
                        String::from_utf8_lossy(element.name().as_ref())
                    )));
                }
                *seen_root = true;
                self.last_fetched = attribute(element, "rsslastfetched")?;
            }
            1 if element.name().as_ref() == ENCLOSURE_ELEMENT => {
                let url = attribute(element, "url")?.ok_or_else(|| {
                    ParseProblem::Structure("enclosure without url attribute".to_string())
                })?;
                let downloaded_at = attribute(element, "downloadtime")?;
                self.downloaded.insert(url, downloaded_at);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Location of the channel file for `identifier` inside `channel_dir`
pub fn channel_file_path(channel_dir: &Path, identifier: &str) -> PathBuf {
    channel_dir.join(format!("{identifier}.xml"))
}

enum ParseProblem {
    Xml(quick_xml::Error),
    Structure(String),
}

impl From<quick_xml::Error> for ParseProblem {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e)
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, quick_xml::Error> {
    match element.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_state() -> ChannelState {
        let mut state = ChannelState {
            last_fetched: Some("Thu, 01 Oct 2015 09:53:38 GMT".to_string()),
            ..Default::default()
        };
        state.mark_downloaded(
            "https://example.com/ep1.mp3?a=1&b=\"2\"",
            "Fri, 02 Oct 2015 10:00:00 GMT".to_string(),
        );
        state
            .downloaded
            .insert("https://example.com/legacy.mp3".to_string(), None);
        state
    }

    #[test]
    fn load_missing_file_returns_empty_state() {
        let dir = tempdir().unwrap();
        let state = ChannelState::load(&dir.path().join("absent.xml")).unwrap();

        assert_eq!(state, ChannelState::default());
    }

    #[test]
    fn serializes_to_channel_file_format() {
        let xml = sample_state().to_xml();

        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <channel version=\"1.0\" rsslastfetched=\"Thu, 01 Oct 2015 09:53:38 GMT\">\n  \
             <enclosure url=\"https://example.com/ep1.mp3?a=1&amp;b=&quot;2&quot;\" downloadtime=\"Fri, 02 Oct 2015 10:00:00 GMT\"/>\n  \
             <enclosure url=\"https://example.com/legacy.mp3\"/>\n\
             </channel>\n"
        );
    }

    #[test]
    fn omits_last_fetched_when_never_fetched() {
        let xml = ChannelState::default().to_xml();

        assert!(xml.contains("<channel version=\"1.0\">"));
        assert!(!xml.contains("rsslastfetched"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");
        let state = sample_state();

        state.save(&path).unwrap();
        let loaded = ChannelState::load(&path).unwrap();

        assert_eq!(loaded, state);
        assert!(loaded.is_downloaded("https://example.com/ep1.mp3?a=1&b=\"2\""));
        assert!(loaded.is_downloaded("https://example.com/legacy.mp3"));
        assert!(!loaded.is_downloaded("https://example.com/ep1.mp3"));
    }

    #[test]
    fn repeated_save_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");

        sample_state().save(&path).unwrap();
        let first = std::fs::read(&path).unwrap();
        ChannelState::load(&path).unwrap().save(&path).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn save_leaves_no_temporary_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");

        sample_state().save(&path).unwrap();
        sample_state().save(&path).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn failed_save_keeps_destination_and_cleans_up() {
        let dir = tempdir().unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("show.xml");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"untouched").unwrap();

        let result = sample_state().save(&path);

        assert!(matches!(result, Err(StateError::RenameFailed { .. })));
        assert_eq!(std::fs::read(path.join("keep")).unwrap(), b"untouched");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope").join("show.xml");

        let result = sample_state().save(&path);

        assert!(matches!(result, Err(StateError::TempFileFailed { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn load_reads_hand_written_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");
        std::fs::write(
            &path,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<channel version="1.0" rsslastfetched="Mon, 01 Jan 2024 00:00:00 GMT">
  <enclosure url="http://example.com/a.mp3" downloadtime="Tue, 02 Jan 2024 00:00:00 GMT"/>
  <enclosure url="http://example.com/b.mp3"></enclosure>
</channel>
"#,
        )
        .unwrap();

        let state = ChannelState::load(&path).unwrap();

        assert_eq!(
            state.last_fetched.as_deref(),
            Some("Mon, 01 Jan 2024 00:00:00 GMT")
        );
        assert_eq!(state.downloaded.len(), 2);
        assert_eq!(
            state.downloaded["http://example.com/a.mp3"].as_deref(),
            Some("Tue, 02 Jan 2024 00:00:00 GMT")
        );
        assert_eq!(state.downloaded["http://example.com/b.mp3"], None);
    }

    #[test]
    fn load_rejects_malformed_xml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");
        std::fs::write(&path, "<channel><enclosure url=\"x\"></channel>").unwrap();

        assert!(matches!(
            ChannelState::load(&path),
            Err(StateError::ParseFailed { .. })
        ));
    }

    #[test]
    fn load_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");
        std::fs::write(
            &path,
            "<channel version=\"1.0\">\n  <enclosure url=\"http://example.com/a.mp3\"/>\n",
        )
        .unwrap();

        assert!(matches!(
            ChannelState::load(&path),
            Err(StateError::Malformed { ref reason, .. }) if reason == "unclosed element"
        ));
    }

    #[test]
    fn load_rejects_wrong_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");
        std::fs::write(&path, "<rss version=\"2.0\"/>").unwrap();

        assert!(matches!(
            ChannelState::load(&path),
            Err(StateError::Malformed { .. })
        ));
    }

    #[test]
    fn load_rejects_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("show.xml");
        std::fs::write(&path, "").unwrap();

        assert!(matches!(
            ChannelState::load(&path),
            Err(StateError::Malformed { .. })
        ));
    }

    #[test]
    fn channel_file_is_named_after_identifier() {
        assert_eq!(
            channel_file_path(Path::new("/home/me/.podspool"), "daily"),
            PathBuf::from("/home/me/.podspool/daily.xml")
        );
    }
}
