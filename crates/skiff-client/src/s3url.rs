//! `s3://` URL parsing.
//!
//! The path component decides the addressing mode:
//!
//! - `s3://bucket/a/b/` — trailing slash, `a/b/` is a prefix
//! - `s3://bucket/a/b`  — no trailing slash, `a/b` is an exact key
//! - `s3://bucket`      — empty path, the bucket root (empty prefix)

use crate::error::{ClientError, ClientResult};

/// A parsed object-store location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    /// Prefix to list under (may be empty for the bucket root).
    pub prefix: Option<String>,
    /// Exact key, when the URL did not end in `/`.
    pub key: Option<String>,
}

impl S3Location {
    /// The prefix a listing should walk: the explicit prefix, or the exact
    /// key when only a key was given.
    pub fn listing_prefix(&self) -> &str {
        match (&self.prefix, &self.key) {
            (Some(prefix), _) => prefix,
            (None, Some(key)) => key,
            (None, None) => "",
        }
    }
}

/// Parse an `s3://bucket[/path]` URL.
pub fn parse_s3_url(url: &str) -> ClientResult<S3Location> {
    let rest = url.strip_prefix("s3://").ok_or_else(|| {
        ClientError::InvalidArgument(format!("expected an s3:// url, got '{url}'"))
    })?;

    let (bucket, path) = match rest.split_once('/') {
        Some((bucket, path)) => (bucket, path),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(ClientError::InvalidArgument(format!(
            "missing bucket in url '{url}'"
        )));
    }

    let location = if path.is_empty() {
        S3Location {
            bucket: bucket.to_string(),
            prefix: Some(String::new()),
            key: None,
        }
    } else if path.ends_with('/') {
        S3Location {
            bucket: bucket.to_string(),
            prefix: Some(path.to_string()),
            key: None,
        }
    } else {
        S3Location {
            bucket: bucket.to_string(),
            prefix: None,
            key: Some(path.to_string()),
        }
    };
    Ok(location)
}
