// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use regex::{Regex, RegexBuilder};

use crate::error::ConfigError;

/// Regular expression that selects which enclosure URLs are handled.
///
/// The expression may match anywhere in the URL.
#[derive(Debug, Clone)]
pub struct EnclosureFilter {
    regex: Regex,
}

impl EnclosureFilter {
    pub fn new(pattern: &str, caseless: bool) -> Result<Self, ConfigError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(caseless)
            .build()
            .map_err(|e| ConfigError::InvalidFilter {
                pattern: pattern.to_string(),
                source: e,
            })?;

        Ok(Self { regex })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}
