// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use crate::date::parse_rfc822_date;
use crate::feed::{ChannelInfo, Item};

/// Longest field name kept while reading a `%(name)` token
const MAX_FIELD_NAME_LENGTH: usize = 79;

/// Characters that never survive into a generated filename
const FORBIDDEN_CHARS: &[char] = &[
    '/', '\\', '?', '%', '*', ':', '|', '"', '<', '>', ',', '\'', '\n', '\t', '\r',
];

/// Work out where an item's enclosure is stored.
///
/// With a non-empty pattern the filename is the expanded template; otherwise
/// it is taken from the last path segment of the enclosure URL. Either way
/// the result is sanitized and placed directly inside `spool_dir`.
pub fn resolve_filename(
    spool_dir: &Path,
    pattern: Option<&str>,
    channel: &ChannelInfo,
    item: &Item,
) -> PathBuf {
    let raw = match pattern.filter(|pattern| !pattern.is_empty()) {
        Some(pattern) => expand_pattern(pattern, channel, item),
        None => guess_filename_from_url(
            item.enclosure
                .as_ref()
                .map(|enclosure| enclosure.url.as_str())
                .unwrap_or_default(),
        ),
    };

    spool_dir.join(sanitize_filename(&raw))
}

/// Expand `%(name)` tokens in a filename template.
///
/// Field names are case-insensitive. Unknown names and empty values expand to
/// nothing. A token left open at the end of the pattern is still expanded.
pub fn expand_pattern(pattern: &str, channel: &ChannelInfo, item: &Item) -> String {
    let mut output = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' || chars.peek() != Some(&'(') {
            output.push(c);
            continue;
        }
        chars.next();

        let mut field = String::new();
        for c in chars.by_ref() {
            match c {
                ')' => break,
                '(' => {}
                c if field.len() < MAX_FIELD_NAME_LENGTH => field.push(c),
                _ => {}
            }
        }

        output.push_str(&field_value(&field, channel, item));
    }

    output
}

fn field_value(field: &str, channel: &ChannelInfo, item: &Item) -> String {
    match field.to_ascii_lowercase().as_str() {
        "date" => item
            .pub_date
            .as_deref()
            .and_then(parse_rfc822_date)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        "title" => item.title.clone().unwrap_or_default(),
        "channel_title" => channel.title.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Take the last path segment of a URL, ignoring any query or fragment
pub fn guess_filename_from_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];

    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Remove characters that are unsafe in filenames
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c))
        .collect()
}
