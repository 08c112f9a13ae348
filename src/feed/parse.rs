// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::bytes::Regex;
use rss::extension::Extension;

use crate::error::FeedError;

use super::entities::rewrite_html_entities;

/// Media RSS namespace, compared without a trailing slash
const MRSS_NAMESPACE: &str = "http://search.yahoo.com/mrss";

static RSS_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<rss\b[^>]*?\bversion\s*=\s*["']([^"']*)["']"#).expect("valid version regex")
});

/// RSS dialect announced by the root element. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedVersion {
    V0_91,
    V0_92,
    V2_0,
    Unknown,
}

impl FeedVersion {
    fn from_attr(version: &[u8]) -> Self {
        match version {
            b"2.0" => Self::V2_0,
            b"0.91" => Self::V0_91,
            b"0.92" => Self::V0_92,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FeedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::V0_91 => "0.91",
            Self::V0_92 => "0.92",
            Self::V2_0 => "2.0",
            Self::Unknown => "unknown",
        })
    }
}

/// Channel-level metadata of a feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

/// A single feed entry, in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub enclosure: Option<Enclosure>,
}

/// The media file attached to an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    /// Size in bytes as announced by the feed, 0 when unknown
    pub length: u64,
    pub mime_type: Option<String>,
}

/// A parsed feed together with the moment its bytes were retrieved
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub version: FeedVersion,
    pub channel: ChannelInfo,
    pub items: Vec<Item>,
    pub fetched_at: DateTime<Utc>,
}

/// Parse RSS feed XML bytes into a snapshot stamped with `fetched_at`
pub fn parse_feed(xml_bytes: &[u8], fetched_at: DateTime<Utc>) -> Result<FeedSnapshot, FeedError> {
    let document = rewrite_html_entities(xml_bytes);

    if root_element(&document).is_some_and(|root| root != b"rss") {
        return Err(FeedError::UnrecognizedRoot);
    }

    let channel = rss::Channel::read_from(document.as_ref()).map_err(|e| match e {
        rss::Error::InvalidStartTag => FeedError::UnrecognizedRoot,
        other => FeedError::ParseFailed(other),
    })?;

    let version = RSS_VERSION
        .captures(&document)
        .and_then(|caps| caps.get(1))
        .map_or(FeedVersion::Unknown, |m| FeedVersion::from_attr(m.as_bytes()));

    let media_prefixes = media_prefixes(channel.namespaces());

    let items = channel
        .items()
        .iter()
        .map(|item| parse_item(item, &media_prefixes))
        .collect();

    Ok(FeedSnapshot {
        version,
        channel: ChannelInfo {
            title: non_empty(channel.title()),
            link: non_empty(channel.link()),
            description: non_empty(channel.description()),
            language: channel.language().and_then(non_empty),
        },
        items,
        fetched_at,
    })
}

/// Name of the document's first element, if it gets that far
fn root_element(document: &[u8]) -> Option<Vec<u8>> {
    let mut reader = Reader::from_reader(document);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element) | Event::Empty(element)) => {
                return Some(element.name().as_ref().to_vec());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
        buf.clear();
    }
}

fn parse_item(item: &rss::Item, media_prefixes: &[&str]) -> Item {
    Item {
        title: item.title().map(String::from),
        link: item.link().map(String::from),
        description: item.description().map(String::from),
        pub_date: item.pub_date().map(String::from),
        enclosure: parse_enclosure(item, media_prefixes),
    }
}

/// Media RSS `content` wins over a plain `enclosure`; the plain element only
/// fills in what the media element left unset.
fn parse_enclosure(item: &rss::Item, media_prefixes: &[&str]) -> Option<Enclosure> {
    let media = media_content(item, media_prefixes);
    let plain = item.enclosure();

    let url = media
        .and_then(|m| m.attrs().get("url"))
        .and_then(|url| non_empty(url))
        .or_else(|| plain.and_then(|e| non_empty(e.url())))?;

    let length = media
        .and_then(|m| m.attrs().get("fileSize"))
        .map(|len| parse_length(len))
        .filter(|len| *len > 0)
        .or_else(|| plain.map(|e| parse_length(e.length())))
        .unwrap_or(0);

    let mime_type = media
        .and_then(|m| m.attrs().get("type"))
        .and_then(|t| non_empty(t))
        .or_else(|| plain.and_then(|e| non_empty(e.mime_type())));

    Some(Enclosure {
        url,
        length,
        mime_type,
    })
}

/// `media:content` directly under the item, or nested in a `media:group`
fn media_content<'a>(item: &'a rss::Item, media_prefixes: &[&str]) -> Option<&'a Extension> {
    media_prefixes
        .iter()
        .filter_map(|prefix| item.extensions().get(*prefix))
        .find_map(|elements| {
            elements
                .get("content")
                .and_then(|found| found.first())
                .or_else(|| {
                    elements
                        .get("group")
                        .and_then(|found| found.first())
                        .and_then(|group| child(group, "content"))
                })
        })
}

fn child<'a>(extension: &'a Extension, local_name: &str) -> Option<&'a Extension> {
    extension
        .children()
        .iter()
        .find(|(name, _)| name.rsplit(':').next() == Some(local_name))
        .and_then(|(_, found)| found.first())
}

fn media_prefixes(namespaces: &BTreeMap<String, String>) -> Vec<&str> {
    namespaces
        .iter()
        .filter(|(_, uri)| uri.trim_end_matches('/') == MRSS_NAMESPACE)
        .map(|(prefix, _)| prefix.as_str())
        .collect()
}

/// Negative or unparsable lengths count as unknown
fn parse_length(value: &str) -> u64 {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|len| u64::try_from(len).ok())
        .unwrap_or(0)
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Test Podcast</title>
    <link>https://example.com</link>
    <description>A test podcast for unit testing</description>
    <language>en-us</language>
    <item>
      <title>Episode 1</title>
      <link>https://example.com/1</link>
      <description>First episode</description>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
    </item>
    <item>
      <title>No media here</title>
    </item>
    <item>
      <title>Episode 2</title>
      <media:content url="https://cdn.example.com/ep2.ogg" fileSize="2048" type="audio/ogg"/>
      <enclosure url="https://example.com/ep2.mp3" length="999" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 3</title>
      <media:group>
        <media:content url="https://cdn.example.com/ep3.m4a"/>
      </media:group>
      <enclosure url="https://example.com/ep3.mp3" length="4096" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn parse(xml: &str) -> Result<FeedSnapshot, FeedError> {
        parse_feed(xml.as_bytes(), fetched_at())
    }

    #[test]
    fn parse_feed_extracts_channel_info() {
        let snapshot = parse(SAMPLE_FEED).unwrap();

        assert_eq!(snapshot.version, FeedVersion::V2_0);
        assert_eq!(snapshot.channel.title.as_deref(), Some("Test Podcast"));
        assert_eq!(snapshot.channel.link.as_deref(), Some("https://example.com"));
        assert_eq!(
            snapshot.channel.description.as_deref(),
            Some("A test podcast for unit testing")
        );
        assert_eq!(snapshot.channel.language.as_deref(), Some("en-us"));
        assert_eq!(snapshot.fetched_at, fetched_at());
    }

    #[test]
    fn parse_feed_keeps_items_in_document_order() {
        let snapshot = parse(SAMPLE_FEED).unwrap();

        let titles: Vec<_> = snapshot
            .items
            .iter()
            .map(|item| item.title.as_deref().unwrap())
            .collect();
        assert_eq!(titles, ["Episode 1", "No media here", "Episode 2", "Episode 3"]);
        assert!(snapshot.items[1].enclosure.is_none());
    }

    #[test]
    fn parse_feed_reads_plain_enclosure() {
        let snapshot = parse(SAMPLE_FEED).unwrap();
        let item = &snapshot.items[0];

        assert_eq!(item.link.as_deref(), Some("https://example.com/1"));
        assert_eq!(item.description.as_deref(), Some("First episode"));
        assert_eq!(
            item.pub_date.as_deref(),
            Some("Mon, 01 Jan 2024 12:00:00 +0000")
        );
        assert_eq!(
            item.enclosure,
            Some(Enclosure {
                url: "https://example.com/ep1.mp3".to_string(),
                length: 1234567,
                mime_type: Some("audio/mpeg".to_string()),
            })
        );
    }

    #[test]
    fn media_content_takes_precedence_over_enclosure() {
        let snapshot = parse(SAMPLE_FEED).unwrap();
        let enclosure = snapshot.items[2].enclosure.as_ref().unwrap();

        assert_eq!(enclosure.url, "https://cdn.example.com/ep2.ogg");
        assert_eq!(enclosure.length, 2048);
        assert_eq!(enclosure.mime_type.as_deref(), Some("audio/ogg"));
    }

    #[test]
    fn media_group_content_falls_back_to_enclosure_fields() {
        let snapshot = parse(SAMPLE_FEED).unwrap();
        let enclosure = snapshot.items[3].enclosure.as_ref().unwrap();

        assert_eq!(enclosure.url, "https://cdn.example.com/ep3.m4a");
        assert_eq!(enclosure.length, 4096);
        assert_eq!(enclosure.mime_type.as_deref(), Some("audio/mpeg"));
    }

    #[test]
    fn invalid_lengths_become_zero() {
        let feed = r#"<rss version="2.0"><channel><title>T</title>
            <item><enclosure url="http://x/a.mp3" length="-5" type="audio/mpeg"/></item>
            <item><enclosure url="http://x/b.mp3" length="huge" type="audio/mpeg"/></item>
            <item><enclosure url="http://x/c.mp3" type="audio/mpeg"/></item>
        </channel></rss>"#;
        let snapshot = parse(feed).unwrap();

        for item in &snapshot.items {
            assert_eq!(item.enclosure.as_ref().unwrap().length, 0);
        }
    }

    #[test]
    fn enclosure_without_url_is_ignored() {
        let feed = r#"<rss version="2.0"><channel><title>T</title>
            <item><title>Broken</title><enclosure length="10" type="audio/mpeg"/></item>
        </channel></rss>"#;
        let snapshot = parse(feed).unwrap();

        assert_eq!(snapshot.items.len(), 1);
        assert!(snapshot.items[0].enclosure.is_none());
    }

    #[test]
    fn undeclared_html_entities_are_resolved() {
        let feed = r#"<rss version="2.0"><channel><title>Caf&eacute;&nbsp;Talk</title>
            <item><title>Tom &amp; Jerry&hellip;</title></item>
        </channel></rss>"#;
        let snapshot = parse(feed).unwrap();

        assert_eq!(snapshot.channel.title.as_deref(), Some("Café\u{a0}Talk"));
        assert_eq!(snapshot.items[0].title.as_deref(), Some("Tom & Jerry…"));
    }

    #[test]
    fn detects_feed_versions() {
        let old = r#"<rss version="0.91"><channel><title>T</title></channel></rss>"#;
        let newer = r#"<rss version='0.92'><channel><title>T</title></channel></rss>"#;
        let odd = r#"<rss version="3.0"><channel><title>T</title></channel></rss>"#;
        let missing = r#"<rss><channel><title>T</title></channel></rss>"#;

        assert_eq!(parse(old).unwrap().version, FeedVersion::V0_91);
        assert_eq!(parse(newer).unwrap().version, FeedVersion::V0_92);
        assert_eq!(parse(odd).unwrap().version, FeedVersion::Unknown);
        assert_eq!(parse(missing).unwrap().version, FeedVersion::Unknown);
        assert_eq!(FeedVersion::Unknown.to_string(), "unknown");
    }

    #[test]
    fn rejects_unrecognized_root_element() {
        let atom = r#"<?xml version="1.0"?><feed xmlns="http://www.w3.org/2005/Atom"><title>A</title></feed>"#;

        assert!(matches!(parse(atom), Err(FeedError::UnrecognizedRoot)));
    }

    #[test]
    fn rejects_rdf_root_element() {
        let rdf = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel><title>RDF</title></channel>
  <item><title>One</title><link>https://example.com/1</link></item>
</rdf:RDF>"#;

        assert!(matches!(parse(rdf), Err(FeedError::UnrecognizedRoot)));
    }

    #[test]
    fn rejects_malformed_xml() {
        let broken = r#"<rss version="2.0"><channel><title>T</title><item></channel>"#;

        assert!(parse(broken).is_err());
    }

    #[test]
    fn empty_channel_fields_are_none() {
        let feed = r#"<rss version="2.0"><channel><title></title></channel></rss>"#;
        let snapshot = parse(feed).unwrap();

        assert_eq!(snapshot.channel, ChannelInfo::default());
        assert!(snapshot.items.is_empty());
    }
}
