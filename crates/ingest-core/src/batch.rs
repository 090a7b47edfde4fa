//! Batch token generation.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier shared by every row loaded during one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchToken(String);

impl BatchToken {
    /// Draw a fresh random (v4) token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Re-attach to a token produced by an earlier run.
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_is_hyphenated_uuid() {
        let token = BatchToken::generate();
        assert_eq!(token.as_str().len(), 36);
        assert!(Uuid::parse_str(token.as_str()).is_ok());
    }

    #[test]
    fn test_generate_does_not_repeat() {
        let tokens: HashSet<BatchToken> = (0..1_000).map(|_| BatchToken::generate()).collect();
        assert_eq!(tokens.len(), 1_000);
    }

    #[test]
    fn test_display_matches_as_str() {
        let token = BatchToken::from_string("run-7");
        assert_eq!(token.to_string(), "run-7");
        assert_eq!(token.as_str(), "run-7");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let token = BatchToken::from_string("abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), r#""abc""#);
    }
}
