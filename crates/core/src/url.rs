// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource URLs (`scheme://bucket/path`) and glob matching over them.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors from URL parsing or glob compilation.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("not a resource url: {0}")]
    NotAUrl(String),
    #[error("invalid bucket name: {0}")]
    InvalidBucket(String),
    #[error("empty path in url: {0}")]
    EmptyPath(String),
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[allow(clippy::unwrap_used)] // literal pattern
fn bucket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9.\-]+$").unwrap())
}

/// A canonical `scheme://bucket/path` resource locator.
///
/// The path is stored decoded; storage-event notifications deliver keys
/// percent-encoded (with `+` for spaces) and decoding happens at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUrl {
    scheme: String,
    bucket: String,
    path: String,
}

impl ResourceUrl {
    /// Build from already-decoded parts, validating the bucket name.
    pub fn new(scheme: &str, bucket: &str, path: &str) -> Result<Self, UrlError> {
        if !bucket_re().is_match(bucket) {
            return Err(UrlError::InvalidBucket(bucket.to_string()));
        }
        if path.is_empty() {
            return Err(UrlError::EmptyPath(format!("{scheme}://{bucket}/")));
        }
        Ok(Self { scheme: scheme.to_string(), bucket: bucket.to_string(), path: path.to_string() })
    }

    /// Parse a `scheme://bucket/path` string. The path component is taken
    /// verbatim (no decoding); use [`ResourceUrl::parse_encoded`] for
    /// notification-sourced keys.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        Self::parse_inner(raw, false)
    }

    /// Parse with percent-decoding of the path component.
    pub fn parse_encoded(raw: &str) -> Result<Self, UrlError> {
        Self::parse_inner(raw, true)
    }

    fn parse_inner(raw: &str, decode: bool) -> Result<Self, UrlError> {
        let trimmed = raw.trim();
        let (scheme, rest) =
            trimmed.split_once("://").ok_or_else(|| UrlError::NotAUrl(raw.to_string()))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(UrlError::NotAUrl(raw.to_string()));
        }
        let (bucket, path) =
            rest.split_once('/').ok_or_else(|| UrlError::EmptyPath(raw.to_string()))?;
        let path = if decode { percent_decode(path) } else { path.to_string() };
        Self::new(scheme, bucket, &path)
    }

    /// Quick syntactic check without allocating the parsed form.
    pub fn looks_like_url(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path segment (the object's file name).
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.path)
    }
}

/// Decode `%XX` escapes and `+`-for-space, as produced by storage-event
/// notifications. Invalid escapes pass through verbatim.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3);
                match hex.and_then(|h| u8::from_str_radix(std::str::from_utf8(h).ok()?, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Options for glob compilation.
#[derive(Debug, Clone, Copy)]
pub struct GlobOptions {
    /// Match without regard to case.
    pub case_insensitive: bool,
    /// When set, `*` does not cross `/` boundaries. `?` always matches
    /// exactly one character, boundary or not.
    pub path_boundaries: bool,
}

impl Default for GlobOptions {
    fn default() -> Self {
        Self { case_insensitive: false, path_boundaries: false }
    }
}

/// A compiled glob over resource URLs or paths.
///
/// `*` matches any run of characters, `?` a single character; everything
/// else is literal.
#[derive(Debug, Clone)]
pub struct UrlGlob {
    pattern: String,
    re: Regex,
}

impl UrlGlob {
    pub fn compile(pattern: &str, options: GlobOptions) -> Result<Self, UrlError> {
        let mut expr = String::with_capacity(pattern.len() * 2 + 2);
        expr.push('^');
        for ch in pattern.chars() {
            match ch {
                '*' => expr.push_str(if options.path_boundaries { "[^/]*" } else { ".*" }),
                '?' => expr.push('.'),
                _ => expr.push_str(&regex::escape(&ch.to_string())),
            }
        }
        expr.push('$');
        let re = RegexBuilder::new(&expr)
            .case_insensitive(options.case_insensitive)
            .build()
            .map_err(|source| UrlError::InvalidGlob { pattern: pattern.to_string(), source })?;
        Ok(Self { pattern: pattern.to_string(), re })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.re.is_match(candidate)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

#[cfg(test)]
#[path = "url_tests.rs"]
mod tests;
