//! Content fingerprints used to deduplicate evaluator calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

/// SHA-256 digest of content, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Self(bytes)
    }

    /// Fingerprint of a review text evaluated by a given evaluator (model)
    /// under a given rubric.
    ///
    /// Fields are length-prefixed so distinct triples never collide by
    /// concatenation.
    pub fn of_review(rubric: &Fingerprint, evaluator: &str, review_text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(rubric.0);
        hasher.update((evaluator.len() as u64).to_be_bytes());
        hasher.update(evaluator.as_bytes());
        hasher.update((review_text.len() as u64).to_be_bytes());
        hasher.update(review_text.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short form (first 12 hex chars) for logs.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| format!("invalid fingerprint hex: {s}"))?;
        if bytes.len() != 32 {
            return Err(format!("fingerprint must be 32 bytes, got {}", bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_display_fromstr_roundtrip() {
        let fp = Fingerprint::compute(b"hello world");
        let hex = fp.to_string();
        assert_eq!(hex.len(), 64);
        let parsed: Fingerprint = hex.parse().unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn fingerprint_serializes_as_hex_string() {
        let fp = Fingerprint::compute(b"x");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn fingerprint_rejects_wrong_length() {
        assert!("abcd".parse::<Fingerprint>().is_err());
        assert!("zz".repeat(32).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn review_fingerprint_depends_on_rubric_model_and_text() {
        let rubric_a = Fingerprint::compute(b"rubric-a");
        let rubric_b = Fingerprint::compute(b"rubric-b");

        let same_1 = Fingerprint::of_review(&rubric_a, "gpt-4.1-mini", "solid review");
        let same_2 = Fingerprint::of_review(&rubric_a, "gpt-4.1-mini", "solid review");
        assert_eq!(same_1, same_2);

        assert_ne!(
            same_1,
            Fingerprint::of_review(&rubric_b, "gpt-4.1-mini", "solid review")
        );
        assert_ne!(
            same_1,
            Fingerprint::of_review(&rubric_a, "gpt-4o", "solid review")
        );
        assert_ne!(
            same_1,
            Fingerprint::of_review(&rubric_a, "gpt-4.1-mini", "solid review.")
        );
        // Length prefixes keep the model/text boundary unambiguous.
        assert_ne!(
            Fingerprint::of_review(&rubric_a, "ab", "c"),
            Fingerprint::of_review(&rubric_a, "a", "bc")
        );
    }
}
