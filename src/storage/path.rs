//! Relative path normalization and name sanitization.
//!
//! Nothing in this module touches the filesystem.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::{BucketError, Result};

/// Prefix of the hidden staging files uploads are written to before they are
/// renamed into place. User-supplied names may not start with it.
pub const STAGING_PREFIX: &str = ".fsbucket-upload-";

/// A normalized location inside the storage root.
///
/// The canonical form joins the segments with `/` and has no leading slash.
/// The empty string is the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelativePath(String);

impl RelativePath {
    /// The storage root.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Normalize an untrusted path string.
    ///
    /// Both `/` and `\` separate segments. Empty and `.` segments are dropped
    /// and `..` removes the previous segment. A `..` with nothing left to
    /// remove would climb out of the root and fails with `InvalidPath`, as
    /// does a null byte anywhere in the input.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.contains('\0') {
            return Err(BucketError::InvalidPath(
                "path contains a null byte".to_string(),
            ));
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.trim().split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(BucketError::InvalidPath(format!(
                            "{raw} escapes the storage root"
                        )));
                    }
                }
                s => segments.push(s),
            }
        }

        Ok(Self(segments.join("/")))
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the canonical string form.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Whether this is the storage root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the path segments from the root down.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Append a sanitized name.
    pub fn join(&self, name: &str) -> Self {
        if self.is_root() {
            Self(name.to_string())
        } else {
            Self(format!("{}/{}", self.0, name))
        }
    }

    /// Parent location, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rsplit_once('/') {
            Some((parent, _)) => Some(Self(parent.to_string())),
            None => Some(Self::root()),
        }
    }

    /// Last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments().last()
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl Serialize for RelativePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Validate a bare name used for a folder, file or rename target.
pub fn sanitize_name(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.starts_with(STAGING_PREFIX);

    if invalid {
        return Err(BucketError::InvalidName(name.to_string()));
    }
    Ok(name)
}

/// Last segment of a client-supplied filename.
///
/// Browsers and tools sometimes send `C:\Users\me\report.pdf` or
/// `some/dir/report.pdf`; only `report.pdf` is kept. Whitespace is part of
/// the name, the same as for folder names.
pub fn basename(suggested: &str) -> &str {
    suggested.rsplit(['/', '\\']).next().unwrap_or_default()
}
