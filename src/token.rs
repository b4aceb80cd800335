//! Security tokens (prompt canaries).
//!
//! A token is issued once per analysis batch and repeated throughout the
//! prompt. It is drawn from the operating system CSPRNG so it cannot be
//! guessed by text embedded in a job posting.
//!
//! ```text
//! JOBSEC_TK_ 7fQ2mZp0...  (prefix + 32 random alphanumerics = 42 chars)
//! ```

use std::collections::HashSet;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{GatewayError, Result};

/// Default token prefix (10 characters)
pub const DEFAULT_TOKEN_PREFIX: &str = "JOBSEC_TK_";

/// Default number of random characters
pub const DEFAULT_RANDOM_LEN: usize = 32;

/// Default minimum number of distinct characters in the random portion
pub const DEFAULT_MIN_DISTINCT: usize = 15;

/// Floor for the random portion length
pub const MIN_RANDOM_LEN: usize = 32;

/// Size of the alphanumeric alphabet
const ALPHABET_SIZE: usize = 62;

/// Token shape policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPolicy {
    /// Fixed prefix
    pub prefix: String,
    /// Number of random alphanumeric characters
    pub random_len: usize,
    /// Minimum distinct characters in the random portion
    pub min_distinct: usize,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            random_len: DEFAULT_RANDOM_LEN,
            min_distinct: DEFAULT_MIN_DISTINCT,
        }
    }
}

impl TokenPolicy {
    /// Total token length
    pub fn total_len(&self) -> usize {
        self.prefix.len() + self.random_len
    }

    /// Reject policies that would weaken or stall token generation.
    ///
    /// `min_distinct` is capped at half the random length (and half the
    /// alphabet) so rejection sampling terminates quickly.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(GatewayError::Config("token prefix must not be empty".into()));
        }
        if !self
            .prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(GatewayError::Config(format!(
                "token prefix '{}' must be ASCII alphanumeric, '_' or '-'",
                self.prefix
            )));
        }
        if self.random_len < MIN_RANDOM_LEN {
            return Err(GatewayError::Config(format!(
                "token random length {} is below the minimum of {MIN_RANDOM_LEN}",
                self.random_len
            )));
        }
        let max_distinct = (self.random_len / 2).min(ALPHABET_SIZE / 2);
        if self.min_distinct > max_distinct {
            return Err(GatewayError::Config(format!(
                "token min_distinct {} exceeds the maximum of {max_distinct}",
                self.min_distinct
            )));
        }
        Ok(())
    }
}

/// Why a string is not a valid token under a policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenDefect {
    /// Prefix missing or different
    #[error("token does not start with the expected prefix")]
    Prefix,

    /// Wrong length
    #[error("token length {actual} (expected {expected})")]
    Length {
        /// Expected total length
        expected: usize,
        /// Actual total length
        actual: usize,
    },

    /// Random portion contains a non-alphanumeric character
    #[error("token contains non-alphanumeric characters")]
    Alphabet,

    /// Random portion is too repetitive
    #[error("token has {distinct} distinct characters (need {required})")]
    Entropy {
        /// Distinct characters found
        distinct: usize,
        /// Minimum required
        required: usize,
    },
}

/// A per-batch security token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityToken(String);

impl SecurityToken {
    /// Wrap an existing token string after checking it against `policy`
    pub fn parse(value: impl Into<String>, policy: &TokenPolicy) -> std::result::Result<Self, TokenDefect> {
        let token = Self(value.into());
        token.verify(policy)?;
        Ok(token)
    }

    /// Token text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check prefix, length, alphabet and entropy
    pub fn verify(&self, policy: &TokenPolicy) -> std::result::Result<(), TokenDefect> {
        let random = self.0.strip_prefix(&policy.prefix).ok_or(TokenDefect::Prefix)?;

        if self.0.len() != policy.total_len() {
            return Err(TokenDefect::Length {
                expected: policy.total_len(),
                actual: self.0.len(),
            });
        }
        if !random.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TokenDefect::Alphabet);
        }
        let distinct = distinct_chars(random);
        if distinct < policy.min_distinct {
            return Err(TokenDefect::Entropy {
                distinct,
                required: policy.min_distinct,
            });
        }
        Ok(())
    }

    /// Non-overlapping occurrences of this token in `text`
    pub fn count_in(&self, text: &str) -> usize {
        text.matches(self.as_str()).count()
    }
}

impl std::fmt::Display for SecurityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SecurityToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn distinct_chars(s: &str) -> usize {
    s.chars().collect::<HashSet<_>>().len()
}

/// Issues security tokens from the system CSPRNG
#[derive(Debug, Clone, Default)]
pub struct TokenIssuer {
    policy: TokenPolicy,
}

impl TokenIssuer {
    /// Create an issuer after validating `policy`
    pub fn new(policy: TokenPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// Policy in use
    pub fn policy(&self) -> &TokenPolicy {
        &self.policy
    }

    /// Issue a fresh token.
    ///
    /// Draws are rejected until the random portion meets the distinct
    /// character floor; with a validated policy that is almost always the
    /// first draw.
    pub fn issue(&self) -> SecurityToken {
        loop {
            let random: String = OsRng
                .sample_iter(&Alphanumeric)
                .take(self.policy.random_len)
                .map(char::from)
                .collect();

            if distinct_chars(&random) >= self.policy.min_distinct {
                tracing::trace!(len = self.policy.total_len(), "issued security token");
                return SecurityToken(format!("{}{random}", self.policy.prefix));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shape() {
        let token = TokenIssuer::default().issue();
        assert_eq!(token.as_str().len(), 42);
        assert!(token.as_str().starts_with(DEFAULT_TOKEN_PREFIX));
        assert!(token.verify(&TokenPolicy::default()).is_ok());
    }

    #[test]
    fn test_thousand_tokens_unique() {
        let issuer = TokenIssuer::default();
        let tokens: HashSet<SecurityToken> = (0..1000).map(|_| issuer.issue()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_custom_policy() {
        let policy = TokenPolicy {
            prefix: "ACME-".to_string(),
            random_len: 48,
            min_distinct: 20,
        };
        let issuer = TokenIssuer::new(policy.clone()).unwrap();
        let token = issuer.issue();
        assert_eq!(token.as_str().len(), 53);
        assert!(token.verify(&policy).is_ok());
    }

    #[test]
    fn test_policy_rejects_short_random() {
        let policy = TokenPolicy {
            random_len: 16,
            ..Default::default()
        };
        assert!(TokenIssuer::new(policy).is_err());
    }

    #[test]
    fn test_policy_rejects_unreachable_entropy() {
        let policy = TokenPolicy {
            min_distinct: 40,
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_rejects_bad_prefix() {
        let policy = TokenPolicy {
            prefix: "bad prefix ".to_string(),
            ..Default::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_verify_defects() {
        let policy = TokenPolicy::default();

        assert_eq!(
            SecurityToken::parse("WRONG_PRE_abcdefghijklmnopqrstuvwxyz012345", &policy),
            Err(TokenDefect::Prefix)
        );
        assert!(matches!(
            SecurityToken::parse("JOBSEC_TK_abc", &policy),
            Err(TokenDefect::Length { expected: 42, actual: 13 })
        ));
        assert_eq!(
            SecurityToken::parse(format!("JOBSEC_TK_{}", "a".repeat(32)), &policy),
            Err(TokenDefect::Entropy { distinct: 1, required: 15 })
        );
        assert_eq!(
            SecurityToken::parse(format!("JOBSEC_TK_{}!", "abcdefghijklmnopqrstuvwxyz01234"), &policy),
            Err(TokenDefect::Alphabet)
        );
    }

    #[test]
    fn test_count_in() {
        let token = TokenIssuer::default().issue();
        let text = format!("{token} middle {token} end {token}");
        assert_eq!(token.count_in(&text), 3);
        assert_eq!(token.count_in("nothing here"), 0);
    }
}
