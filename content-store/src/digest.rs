//! Content digests in `algorithm:encoded` form.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

/// Error returned when a string is not a valid digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// No `:` separating algorithm and encoded portion.
    #[error("missing algorithm separator in digest {0:?}")]
    MissingSeparator(String),

    /// The algorithm component does not follow the digest grammar.
    #[error("invalid digest algorithm {0:?}")]
    InvalidAlgorithm(String),

    /// The encoded component does not follow the grammar for its algorithm.
    #[error("invalid encoded portion for {algorithm} digest: {encoded:?}")]
    InvalidEncoded {
        /// Digest algorithm
        algorithm: String,
        /// Offending encoded portion
        encoded: String,
    },
}

/// A validated content digest, such as `sha256:e3b0c442...`.
///
/// Cheap to clone; the backing string is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(Arc<str>);

impl Digest {
    /// Compute the sha256 digest of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        Digest(format!("sha256:{}", hex::encode(Sha256::digest(data))).into())
    }

    /// The algorithm portion, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        self.split().0
    }

    /// The encoded portion following the algorithm separator.
    pub fn encoded(&self) -> &str {
        self.split().1
    }

    /// The full digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> (&str, &str) {
        // Validated on construction.
        self.0.split_once(':').unwrap_or((&*self.0, ""))
    }
}

fn valid_algorithm(algorithm: &str) -> bool {
    !algorithm.is_empty()
        && algorithm
            .split(['+', '.', '_', '-'])
            .all(|part| {
                !part.is_empty()
                    && part
                        .bytes()
                        .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9'))
            })
}

fn valid_encoded(algorithm: &str, encoded: &str) -> bool {
    let lower_hex = |len: usize| {
        encoded.len() == len && encoded.bytes().all(|b| matches!(b, b'a'..=b'f' | b'0'..=b'9'))
    };

    match algorithm {
        "sha256" => lower_hex(64),
        "sha512" => lower_hex(128),
        _ => {
            !encoded.is_empty()
                && encoded
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'=' | b'_' | b'-'))
        }
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| DigestError::MissingSeparator(s.to_owned()))?;

        if !valid_algorithm(algorithm) {
            return Err(DigestError::InvalidAlgorithm(algorithm.to_owned()));
        }

        if !valid_encoded(algorithm, encoded) {
            return Err(DigestError::InvalidEncoded {
                algorithm: algorithm.to_owned(),
                encoded: encoded.to_owned(),
            });
        }

        Ok(Digest(s.into()))
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.0.to_string()
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Digest").field(&&*self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &str = "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn sha256_of_empty_input() {
        let digest = Digest::sha256(b"");
        assert_eq!(digest.as_str(), EMPTY);
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.encoded().len(), 64);
    }

    #[test]
    fn parse_valid() {
        let digest: Digest = EMPTY.parse().unwrap();
        assert_eq!(digest, Digest::sha256(b""));

        let custom: Digest = "multihash+base58:QmRZxt2b1FVZPNqd8hsiykDL3TdBDeTSPX9Kv46HmX4Gx8"
            .parse()
            .unwrap();
        assert_eq!(custom.algorithm(), "multihash+base58");
    }

    #[test]
    fn parse_invalid() {
        assert!(matches!(
            "sha256".parse::<Digest>(),
            Err(DigestError::MissingSeparator(_))
        ));
        assert!(matches!(
            "SHA256:abc".parse::<Digest>(),
            Err(DigestError::InvalidAlgorithm(_))
        ));
        assert!(matches!(
            "sha256:abc".parse::<Digest>(),
            Err(DigestError::InvalidEncoded { .. })
        ));
        assert!(matches!(
            "sha256:E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855".parse::<Digest>(),
            Err(DigestError::InvalidEncoded { .. })
        ));
        assert!(matches!(
            "sha+:abc".parse::<Digest>(),
            Err(DigestError::InvalidAlgorithm(_))
        ));
    }

    #[test]
    fn serde_uses_plain_string() {
        let digest = Digest::sha256(b"");
        let json = serde_json::to_string(&digest).unwrap();
        assert_eq!(json, format!("\"{EMPTY}\""));

        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, digest);

        assert!(serde_json::from_str::<Digest>("\"nope\"").is_err());
    }
}
