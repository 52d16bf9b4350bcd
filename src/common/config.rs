use std::fmt;
use std::str::FromStr;

use super::error::ArborError;
use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant, marks an empty frame
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default B+ tree order (max keys per node)
pub const DEFAULT_BTREE_ORDER: usize = 64;

/// Page holding the index header
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Page replacement policy of a buffer pool, fixed when the pool is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplacementPolicy {
    Fifo,
    #[default]
    Lru,
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Fifo => write!(f, "fifo"),
            ReplacementPolicy::Lru => write!(f, "lru"),
        }
    }
}

impl FromStr for ReplacementPolicy {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(ReplacementPolicy::Fifo),
            "lru" => Ok(ReplacementPolicy::Lru),
            other => Err(ArborError::InvalidArgument(format!(
                "unknown replacement policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    pub pool_size: usize,
    pub policy: ReplacementPolicy,
}

impl BufferPoolConfig {
    pub fn new(pool_size: usize, policy: ReplacementPolicy) -> Self {
        Self { pool_size, policy }
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        BufferPoolConfig {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            policy: ReplacementPolicy::Lru,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!("FIFO".parse::<ReplacementPolicy>().unwrap(), ReplacementPolicy::Fifo);
        assert_eq!("lru".parse::<ReplacementPolicy>().unwrap(), ReplacementPolicy::Lru);
        assert!("clock".parse::<ReplacementPolicy>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = BufferPoolConfig::default();
        assert_eq!(config.pool_size, DEFAULT_BUFFER_POOL_SIZE);
        assert_eq!(config.policy, ReplacementPolicy::Lru);
    }
}
