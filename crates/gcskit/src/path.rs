//! Object path codec.
//!
//! Paths look hierarchical to callers (`gs://bucket/a/b/c.txt`) but the
//! store's namespace is flat: everything after the bucket is one opaque
//! object name. This module owns the translation — URI parsing, the
//! bucket-only equivalence (`gs://b` == `gs://b/`), list-prefix
//! normalization, and percent-encoding of object names into API paths.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Error, Result};

/// URI scheme this filesystem serves.
pub const SCHEME: &str = "gs";

/// Characters left intact when an object name is placed into an API path.
/// Everything else — `/` included — is percent-encoded, so `a/b` becomes
/// `a%2Fb`.
const OBJECT_NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A parsed `gs://bucket/object` URI.
///
/// `object` may be empty (bucket root) and may carry a trailing slash (a
/// directory marker name); both spellings are preserved so requests and
/// cache keys stay byte-exact with what the caller asked about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    pub bucket: String,
    pub object: String,
}

impl ObjectPath {
    /// Parse a URI. With `require_object`, an empty object name is an
    /// `InvalidArgument` — mutating and open-style operations need a name.
    pub fn parse(uri: &str, require_object: bool) -> Result<Self> {
        let prefix = format!("{SCHEME}://");
        let rest = uri
            .strip_prefix(&prefix)
            .ok_or_else(|| Error::invalid_argument(format!("{SCHEME} path doesn't start with {prefix}: {uri}")))?;

        let (bucket, object) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{SCHEME} path doesn't contain a bucket name: {uri}"
            )));
        }
        if require_object && object.is_empty() {
            return Err(Error::invalid_argument(format!(
                "{SCHEME} path doesn't contain an object name: {uri}"
            )));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            object: object.to_string(),
        })
    }

    /// Whether this path names the bucket root.
    pub fn is_bucket_only(&self) -> bool {
        self.object.is_empty()
    }

    /// Canonical URI form.
    pub fn to_uri(&self) -> String {
        if self.object.is_empty() {
            format!("{SCHEME}://{}", self.bucket)
        } else {
            format!("{SCHEME}://{}/{}", self.bucket, self.object)
        }
    }

    /// The object name with exactly one trailing slash, or `None` at the
    /// bucket root. This is the `prefix=` form used to list a directory.
    pub fn list_prefix(&self) -> Option<String> {
        if self.object.is_empty() {
            return None;
        }
        let trimmed = self.object.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        Some(format!("{trimmed}/"))
    }

    /// The same path with a trailing slash on the object name.
    pub fn with_trailing_slash(&self) -> Self {
        if self.object.is_empty() || self.object.ends_with('/') {
            return self.clone();
        }
        Self {
            bucket: self.bucket.clone(),
            object: format!("{}/", self.object),
        }
    }

    /// A child of this path: `gs://b/dir/` + `sub/file` → `gs://b/dir/sub/file`.
    pub fn child(&self, relative: &str) -> Self {
        let object = match self.list_prefix() {
            Some(prefix) => format!("{prefix}{relative}"),
            None => relative.to_string(),
        };
        Self {
            bucket: self.bucket.clone(),
            object,
        }
    }

    /// Percent-encoded object name for use inside an API path.
    pub fn encoded_object(&self) -> String {
        encode_object_name(&self.object)
    }
}

impl std::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Percent-encode an object name for an API path; `/` becomes `%2F`.
pub fn encode_object_name(name: &str) -> String {
    utf8_percent_encode(name, OBJECT_NAME_ENCODE_SET).to_string()
}
