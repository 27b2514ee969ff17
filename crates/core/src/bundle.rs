// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bundle identity: the URL naming a packaged charm plus its content hash.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected bundle URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bundle URL {0:?}")]
pub struct BundleUrlError(pub String);

fn is_name(s: &str) -> bool {
    s.starts_with(|c: char| c.is_ascii_lowercase())
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.ends_with('-')
}

fn validate_bundle_url(s: &str) -> Result<(), BundleUrlError> {
    let err = || BundleUrlError(s.to_string());
    let (schema, rest) = s.split_once(':').ok_or_else(err)?;
    if schema.is_empty() || !schema.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(err());
    }
    let name = match rest.split_once('/') {
        Some((series, name)) if is_name(series) => name,
        Some(_) => return Err(err()),
        None => rest,
    };
    if is_name(name) {
        Ok(())
    } else {
        Err(err())
    }
}

crate::define_name! {
    /// Logical identity of a bundle: `schema:[series/]name[-revision]`
    /// (e.g. `cs:app-1`, `cs:trusty/mysql-42`, `local:thing`).
    pub struct BundleUrl(validate_bundle_url) -> BundleUrlError;
}

impl BundleUrl {
    pub fn schema(&self) -> &str {
        self.0.split_once(':').map(|(schema, _)| schema).unwrap_or_default()
    }

    fn path(&self) -> &str {
        let rest = self.0.split_once(':').map(|(_, rest)| rest).unwrap_or(&self.0);
        rest.rsplit_once('/').map(|(_, name)| name).unwrap_or(rest)
    }

    /// Name without schema, series or revision.
    pub fn name(&self) -> &str {
        let path = self.path();
        match path.rsplit_once('-') {
            Some((name, rev)) if rev.parse::<u32>().is_ok() => name,
            _ => path,
        }
    }

    pub fn revision(&self) -> Option<u32> {
        self.path().rsplit_once('-').and_then(|(_, rev)| rev.parse().ok())
    }

    /// File-system safe rendering, unique per URL.
    pub fn cache_name(&self) -> String {
        self.0.replace([':', '/'], "_")
    }
}

/// Everything needed to fetch and verify a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub url: BundleUrl,
    /// Lowercase hex SHA-256 of the archive
    pub sha256: String,
    /// Candidate download locations, tried in order
    pub archive_urls: Vec<String>,
}

#[cfg(test)]
#[path = "bundle_tests.rs"]
mod tests;
