//! Content identifiers: `[TVX]<base64url-sha256>[#output-name]`.
//!
//! A [`Hash`] is the one identifier used throughout the graph for thunks,
//! values, and executables alike. The leading tag byte disambiguates what
//! kind of blob the digest names; the optional `#name` suffix selects one
//! named output of a (potentially multi-output) computation.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// What kind of blob a [`Hash`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Thunk,
    Value,
    Executable,
}

impl Tag {
    fn from_byte(b: u8) -> Result<Tag, CoreError> {
        match b {
            b'T' => Ok(Tag::Thunk),
            b'V' => Ok(Tag::Value),
            b'X' => Ok(Tag::Executable),
            _ => Err(CoreError::MalformedHash(format!(
                "unknown tag byte '{}'",
                b as char
            ))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Tag::Thunk => b'T',
            Tag::Value => b'V',
            Tag::Executable => b'X',
        }
    }
}

/// A printable, content-addressed identifier.
///
/// `Hash` is cheap to clone (it's a thin wrapper around the canonical
/// string form) and total equality/ordering is defined over that string,
/// so two `Hash` values with different output suffixes are never equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, std::hash::Hash)]
pub struct Hash(String);

impl Hash {
    /// Parses a `Hash` from its wire form, validating the tag byte.
    pub fn parse(s: impl Into<String>) -> Result<Hash, CoreError> {
        let s = s.into();
        let first = s
            .as_bytes()
            .first()
            .copied()
            .ok_or_else(|| CoreError::MalformedHash("empty hash".to_string()))?;
        Tag::from_byte(first)?;
        let rest = &s[1..];
        let digest = rest.split('#').next().unwrap_or("");
        if digest.is_empty() {
            return Err(CoreError::MalformedHash(format!(
                "hash '{s}' has an empty digest"
            )));
        }
        Ok(Hash(s))
    }

    /// Builds a `Hash` from a tag, a raw digest, and an optional output name.
    pub fn from_parts(tag: Tag, digest: &str, output: Option<&str>) -> Hash {
        let mut s = String::with_capacity(digest.len() + 2 + output.map_or(0, str::len));
        s.push(tag.to_byte() as char);
        s.push_str(digest);
        if let Some(name) = output {
            s.push('#');
            s.push_str(name);
        }
        Hash(s)
    }

    /// The SHA-256/base64url-unpadded digest of `bytes`, tagged `T` (thunk).
    ///
    /// This is the identity function used by [`crate::thunk::Thunk::hash`];
    /// exposed here too since other call sites (store backends) need the
    /// same digest scheme to verify blobs.
    pub fn digest_thunk(bytes: &[u8]) -> Hash {
        Self::digest_tagged(Tag::Thunk, bytes)
    }

    /// Digests `bytes` and tags the result, with no output suffix.
    pub fn digest_tagged(tag: Tag, bytes: &[u8]) -> Hash {
        let digest = Sha256::digest(bytes);
        let encoded = URL_SAFE_NO_PAD.encode(digest);
        Hash::from_parts(tag, &encoded, None)
    }

    pub fn tag(&self) -> Tag {
        Tag::from_byte(self.0.as_bytes()[0]).expect("Hash is always well-formed once constructed")
    }

    /// Strips the `#output` suffix, if any.
    pub fn base(&self) -> Hash {
        match self.0.split_once('#') {
            Some((base, _)) => Hash(base.to_string()),
            None => self.clone(),
        }
    }

    /// The `#output` suffix, if one is present.
    pub fn output_name(&self) -> Option<&str> {
        self.0.split_once('#').map(|(_, name)| name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash::parse(s).map_err(D::Error::custom)
    }
}
