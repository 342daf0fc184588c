use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_CHUNK_TOKENS: usize = 100;
pub const DEFAULT_MAX_CHUNK_TOKENS: usize = 300;
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Chunking budget and context options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Windows that already hold this many tokens are not merged with
    /// another symbol of at least this size.
    pub min_chunk_tokens: usize,
    /// Upper bound of a chunk, exceeded only by a single oversized symbol.
    pub max_chunk_tokens: usize,
    /// Divisor used by the token estimate.
    pub chars_per_token: usize,
    /// Duplicate the enclosing class header into method chunks.
    pub include_parent_context: bool,
    /// Duplicate relevant file imports into method chunks.
    pub include_imports: bool,
    pub max_imports_per_chunk: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chunk_tokens: DEFAULT_MIN_CHUNK_TOKENS,
            max_chunk_tokens: DEFAULT_MAX_CHUNK_TOKENS,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            include_parent_context: true,
            include_imports: true,
            max_imports_per_chunk: 8,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chars_per_token == 0 {
            return Err(ChunkerError::invalid_config("chars_per_token must be > 0"));
        }
        if self.max_chunk_tokens == 0 {
            return Err(ChunkerError::invalid_config("max_chunk_tokens must be > 0"));
        }
        if self.min_chunk_tokens > self.max_chunk_tokens {
            return Err(ChunkerError::invalid_config(format!(
                "min_chunk_tokens ({}) exceeds max_chunk_tokens ({})",
                self.min_chunk_tokens, self.max_chunk_tokens
            )));
        }
        Ok(())
    }

    /// Budget with only the size bounds set, no duplicated context.
    #[must_use]
    pub fn bare(min_chunk_tokens: usize, max_chunk_tokens: usize) -> Self {
        Self {
            min_chunk_tokens,
            max_chunk_tokens,
            include_parent_context: false,
            include_imports: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_range_is_100_to_300() {
        let cfg = ChunkerConfig::default();
        assert_eq!(cfg.min_chunk_tokens, 100);
        assert_eq!(cfg.max_chunk_tokens, 300);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_bounds() {
        let cfg = ChunkerConfig::bare(400, 300);
        assert!(matches!(cfg.validate(), Err(ChunkerError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_zero_divisor() {
        let cfg = ChunkerConfig {
            chars_per_token: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
