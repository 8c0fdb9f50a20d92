use crate::{DavError, Result};
use reqwest::Url;
use std::fmt;

/// Base URL of one remote WebDAV-style store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    base: Url,
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DavError::Config("location cannot be empty".to_string()));
        }

        let base = Url::parse(trimmed)
            .map_err(|error| DavError::Config(format!("invalid location {}: {}", trimmed, error)))?;

        if base.cannot_be_a_base() {
            return Err(DavError::Config(format!(
                "location cannot be used as a base url: {}",
                trimmed
            )));
        }

        Ok(Self { base })
    }

    /// Resolves `name` against this location the way a relative reference is
    /// resolved against a base URL.
    pub fn join(&self, name: &str) -> Result<Url> {
        self.base.join(name).map_err(|error| {
            DavError::Internal(format!(
                "cannot join name {} onto {}: {}",
                name, self.base, error
            ))
        })
    }

    /// Same as [`Location::join`], rendered for logs and error messages.
    pub fn display_target(&self, name: &str) -> String {
        match self.join(name) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}{}", self.base, name),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.base, f)
    }
}
