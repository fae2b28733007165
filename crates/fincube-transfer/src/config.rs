//! Orchestrator and audit-event configuration.

use std::time::Duration;

use fincube_settlement::MEMO_MAX_BYTES;

/// Transfer orchestration settings.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Upper bound on the encoded settlement memo.
    pub memo_max_bytes: usize,
    /// Decimals of the settlement token. The on-chain amount is the ledger
    /// amount times `10^token_decimals`.
    pub token_decimals: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            memo_max_bytes: MEMO_MAX_BYTES,
            token_decimals: 18,
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memo_max_bytes(mut self, max: usize) -> Self {
        self.memo_max_bytes = max;
        self
    }

    pub fn with_token_decimals(mut self, decimals: u32) -> Self {
        self.token_decimals = decimals;
        self
    }

    /// Scale a whole-unit ledger amount to token base units.
    /// `None` if the result does not fit in a `u128`.
    pub fn base_units(&self, amount: u64) -> Option<u128> {
        10u128
            .checked_pow(self.token_decimals)?
            .checked_mul(u128::from(amount))
    }
}

/// Audit-event delivery settings.
#[derive(Debug, Clone)]
pub struct EventConfig {
    /// Webhook receiving events as canonical JSON. Events are only logged
    /// when unset.
    pub webhook_url: Option<String>,
    /// Events buffered ahead of the delivery task.
    pub queue_capacity: usize,
    /// Delivery attempts per event before it is given up on.
    pub max_attempts: u32,
    /// First retry delay; doubles on each attempt.
    pub base_delay: Duration,
    /// Per-request timeout for webhook delivery.
    pub request_timeout: Duration,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            queue_capacity: 1024,
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl EventConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the attempt budget and the first retry delay.
    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_units_scale_by_decimals() {
        let config = TransferConfig::default();
        assert_eq!(config.base_units(100), Some(100_000_000_000_000_000_000));
        assert_eq!(config.with_token_decimals(6).base_units(7), Some(7_000_000));
    }

    #[test]
    fn base_units_overflow_is_none() {
        let config = TransferConfig::default().with_token_decimals(39);
        assert_eq!(config.base_units(1), None);
        let config = TransferConfig::default().with_token_decimals(30);
        assert_eq!(config.base_units(u64::MAX), None);
    }
}
