//! Process-wide configuration: built once before any buddy starts and handed
//! down by reference, never read from a mutable global.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// Upper bound on concurrent peer buddies.
    pub max_peers: usize,
    /// Per-request wire size cap ("~2^20 bytes typical").
    pub request_size_cap: usize,
    /// How long a banned peer stays banned before being re-dialed.
    pub ban_duration: Duration,
    /// Code hashes pulled per `GetByteCodes` round.
    pub fetch_request_contracts_max: usize,
    /// Trie nodes requested per `GetTrieNodes` round during healing.
    pub fetch_request_trie_nodes_max: usize,
    /// Node-count budget spent per healing call before yielding.
    pub heal_accounts_batch_max: usize,
    /// Reads performed per `InspectTrie` call before suspending.
    pub inspector_batch_limit: usize,
    /// Dangling-link count at which `InspectTrie` stops early.
    pub inspector_max_dangling: usize,
    /// Consecutive wire failures before a buddy is banned.
    pub ban_after_failures: u32,
    /// Accounts pulled per `GetStorageRanges` round.
    pub fetch_request_storage_accounts_max: usize,
    /// Combined `fetchStoragePart`/`fetchStorageFull` length past which
    /// account range-fetching pauses (the backpressure policy).
    pub storage_queue_backpressure_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_peers: 32,
            request_size_cap: 1 << 20,
            ban_duration: Duration::from_secs(150 * 60),
            fetch_request_contracts_max: 256,
            fetch_request_trie_nodes_max: 384,
            heal_accounts_batch_max: 2048,
            inspector_batch_limit: 4096,
            inspector_max_dangling: 384,
            ban_after_failures: 3,
            fetch_request_storage_accounts_max: 96,
            storage_queue_backpressure_threshold: 50_000,
        }
    }
}

impl Config {
    /// The size of a single buddy's account-range checkout:
    /// `2^256 / maxBuddies`, expressed as the number of leading bits to
    /// shift a full-range span by.
    pub fn checkout_span_shift(&self) -> u32 {
        (self.max_peers.max(1) as f64).log2().ceil() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bounds() {
        let config = Config::default();
        assert!(config.max_peers > 0);
        assert!(config.request_size_cap <= 2 << 20);
        assert_eq!(config.ban_duration, Duration::from_secs(9000));
    }
}
