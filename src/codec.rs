//! Identifier codec.
//!
//! Post identifiers are six lower-case base-36 characters (`redd.it/abc123`).
//! Decoding one yields its ordinal, the integer position used for every
//! distance computation in the race.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of characters in a post identifier.
pub const ID_LEN: usize = 6;

/// Exclusive upper bound of the ordinal space (36^6).
pub const ORDINAL_LIMIT: u64 = 36u64.pow(ID_LEN as u32);

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Malformed identifier text or an ordinal outside the identifier space.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("wrong ID format {text:?}: must be {ID_LEN} base36 chars")]
    Length { text: String },

    #[error("wrong ID format {text:?}: invalid character {found:?}")]
    Character { text: String, found: char },

    #[error("ordinal {0} does not fit in {ID_LEN} base36 chars")]
    OutOfRange(u64),
}

/// Decode identifier text into its ordinal.
///
/// Only lower-case digits are accepted so that `encode(decode(s)) == s`
/// holds for every accepted `s`; callers lower-case user input first.
pub fn decode(text: &str) -> Result<u64, FormatError> {
    if text.chars().count() != ID_LEN {
        return Err(FormatError::Length {
            text: text.to_string(),
        });
    }

    text.chars().try_fold(0u64, |acc, c| {
        let digit = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'a'..='z' => c as u64 - 'a' as u64 + 10,
            _ => {
                return Err(FormatError::Character {
                    text: text.to_string(),
                    found: c,
                })
            }
        };
        Ok(acc * 36 + digit)
    })
}

/// Encode an ordinal as zero-padded identifier text.
pub fn encode(ordinal: u64) -> Result<String, FormatError> {
    if ordinal >= ORDINAL_LIMIT {
        return Err(FormatError::OutOfRange(ordinal));
    }

    let mut buf = [b'0'; ID_LEN];
    let mut rest = ordinal;
    for slot in buf.iter_mut().rev() {
        *slot = ALPHABET[(rest % 36) as usize];
        rest /= 36;
    }
    Ok(buf.iter().map(|&b| b as char).collect())
}

/// A validated post identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostId(u64);

impl PostId {
    /// Build from an ordinal, rejecting values outside the identifier space.
    pub fn from_ordinal(ordinal: u64) -> Result<Self, FormatError> {
        if ordinal >= ORDINAL_LIMIT {
            return Err(FormatError::OutOfRange(ordinal));
        }
        Ok(Self(ordinal))
    }

    pub fn ordinal(self) -> u64 {
        self.0
    }

    /// Signed distance from `observed` to `self`.
    ///
    /// Positive while `self` is still ahead, zero on a hit, negative once
    /// passed.
    pub fn distance_from(self, observed: u64) -> i64 {
        self.0 as i64 - observed as i64
    }

    /// Upper-cased text, used as the title of racing posts.
    pub fn to_title(self) -> String {
        self.to_string().to_uppercase()
    }
}

impl FromStr for PostId {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(Self)
    }
}

impl TryFrom<String> for PostId {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PostId> for String {
    fn from(id: PostId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The constructor keeps the ordinal in range, so encoding cannot fail.
        match encode(self.0) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "#{}", self.0),
        }
    }
}
