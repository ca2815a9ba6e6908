use embassy_time::Duration;

use crate::types::{AccessCategory, TokenId, NUM_ACS};

/// The tokens are tracked in 32 bit words.
pub const TOKEN_BUCKET_BOUND: usize = 32;
/// The largest supported descriptor pool.
pub const MAX_TOKENS: usize = 64;
/// The maximum amount of sub-frames the firmware reports per descriptor.
pub const MAX_SUBFRAMES: usize = 32;

/// How the hardware descriptors are split between the access categories.
///
/// Slot `i` of category `ac` is the token `ac + reserved_categories * i`. All tokens from
/// `reserved_categories * reserved_per_ac` up to `num_tokens` form the spare range, which is
/// shared by all data categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TokenLayout {
    pub num_tokens: usize,
    pub reserved_per_ac: usize,
    /// The number of categories, in queue index order, which own reserved tokens.
    pub reserved_categories: usize,
}
impl TokenLayout {
    /// Twelve descriptors, two reserved for each of the five categories and two spare ones.
    pub const DEFAULT: Self = Self {
        num_tokens: 12,
        reserved_per_ac: 2,
        reserved_categories: NUM_ACS,
    };
    /// The amount of reserved tokens.
    pub const fn reserved_count(&self) -> usize {
        self.reserved_per_ac * self.reserved_categories
    }
    /// The amount of spare tokens.
    pub const fn spare_count(&self) -> usize {
        self.num_tokens.saturating_sub(self.reserved_count())
    }
    /// Check if the category owns reserved tokens.
    pub const fn has_reservation(&self, ac: AccessCategory) -> bool {
        ac.index() < self.reserved_categories && self.reserved_per_ac != 0
    }
    /// The reserved token for slot `slot` of `ac`, if there is one.
    pub const fn reserved_token(&self, ac: AccessCategory, slot: usize) -> Option<TokenId> {
        if self.has_reservation(ac) && slot < self.reserved_per_ac {
            Some(TokenId(ac.index() + self.reserved_categories * slot))
        } else {
            None
        }
    }
    /// Check if the token belongs to the shared spare range.
    pub const fn is_spare(&self, token: TokenId) -> bool {
        token.0 >= self.reserved_count() && token.0 < self.num_tokens
    }
    /// The category a reserved token is dedicated to.
    pub const fn reserved_owner(&self, token: TokenId) -> Option<AccessCategory> {
        if token.0 < self.reserved_count() {
            AccessCategory::from_index(token.0 % self.reserved_categories)
        } else {
            None
        }
    }
    /// Check if `ac` may take tokens from the spare range.
    ///
    /// The beacon category only uses spare tokens, if it has no reservation of its own.
    pub const fn may_use_spare(&self, ac: AccessCategory) -> bool {
        !ac.is_beacon() || !self.has_reservation(ac)
    }
    /// The categories, which a free token can be offered to, in the order they are tried.
    pub fn candidates(&self, token: TokenId) -> impl Iterator<Item = AccessCategory> + '_ {
        let reserved = self.reserved_owner(token);
        let beacon_spare = reserved.is_none() && self.may_use_spare(AccessCategory::Beacon);
        reserved
            .into_iter()
            .chain(
                AccessCategory::BY_PRIORITY
                    .into_iter()
                    .filter(move |_| reserved.is_none()),
            )
            .chain(beacon_spare.then_some(AccessCategory::Beacon))
    }
}
impl Default for TokenLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Reasons a [SchedulerConfig] can be rejected.
pub enum ConfigError {
    NoTokens,
    /// Token sets are reported as 64 bit masks.
    TooManyTokens,
    ReservationExceedsPool,
    TooManyReservedCategories,
    ZeroBatchSize,
    /// Completion events carry at most [MAX_SUBFRAMES] statuses.
    BatchTooLarge,
    WatermarkTooLow,
    NoPendingQueues,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Static parameters of the scheduler.
pub struct SchedulerConfig {
    pub layout: TokenLayout,
    /// Number of station peer slots.
    pub max_peers: usize,
    /// Number of VIFs. Every VIF has a broadcast queue after the peer slots.
    pub max_vifs: usize,
    /// Channel context ids `0..max_chanctx` are valid.
    pub max_chanctx: u8,
    /// Filter scheduling opportunities by channel context.
    pub multi_channel: bool,
    /// The maximum amount of sub-frames bound to one descriptor.
    pub max_batch: usize,
    /// The limit for aggregates sent with an HT MCS, if [Self::vht_support] is set.
    pub max_batch_ht: usize,
    pub vht_support: bool,
    /// Hold back frames, that could still be aggregated, while the category is already using
    /// all of its reserved tokens.
    pub early_agg_checks: bool,
    /// Flow control is stopped, once a pending queue reaches this length, and resumed once it
    /// drops below half of it.
    pub queue_high_watermark: usize,
    /// Channel switch retry budget, for frames without rate retry counts.
    pub default_max_retries: u32,
    /// How many ticks a flush waits, before giving up.
    pub flush_timeout_ticks: u32,
    /// The period of the ticker returned by [Scheduler::drain_ticker](crate::Scheduler::drain_ticker).
    pub drain_tick: Duration,
}
impl SchedulerConfig {
    /// The number of pending queues per access category and channel context type.
    pub const fn pend_q_per_ac(&self) -> usize {
        self.max_peers + self.max_vifs
    }
    /// The number of channel context types, which have their own pending queues.
    pub const fn chanctx_types(&self) -> usize {
        if self.multi_channel {
            2
        } else {
            1
        }
    }
    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let layout = &self.layout;
        if layout.num_tokens == 0 {
            return Err(ConfigError::NoTokens);
        }
        if layout.num_tokens > MAX_TOKENS {
            return Err(ConfigError::TooManyTokens);
        }
        if layout.reserved_categories > NUM_ACS {
            return Err(ConfigError::TooManyReservedCategories);
        }
        if layout.reserved_count() > layout.num_tokens {
            return Err(ConfigError::ReservationExceedsPool);
        }
        if self.max_batch == 0 || self.max_batch_ht == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_batch > MAX_SUBFRAMES {
            return Err(ConfigError::BatchTooLarge);
        }
        if self.queue_high_watermark < 2 {
            return Err(ConfigError::WatermarkTooLow);
        }
        if self.pend_q_per_ac() == 0 {
            return Err(ConfigError::NoPendingQueues);
        }
        Ok(())
    }
}
impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            layout: TokenLayout::DEFAULT,
            max_peers: 15,
            max_vifs: 2,
            max_chanctx: 2,
            multi_channel: false,
            max_batch: 32,
            max_batch_ht: 14,
            vht_support: true,
            early_agg_checks: true,
            queue_high_watermark: 192,
            default_max_retries: 4,
            flush_timeout_ticks: 100,
            drain_tick: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_matches_hardware() {
        let layout = TokenLayout::DEFAULT;
        assert_eq!(layout.reserved_count(), 10);
        assert_eq!(layout.spare_count(), 2);
        assert_eq!(
            layout.reserved_token(AccessCategory::Video, 1),
            Some(TokenId(7))
        );
        assert_eq!(
            layout.reserved_owner(TokenId(7)),
            Some(AccessCategory::Video)
        );
        assert!(layout.is_spare(TokenId(10)));
        assert!(!layout.may_use_spare(AccessCategory::Beacon));
    }

    #[test]
    fn spare_candidates_are_offered_by_priority() {
        let layout = TokenLayout::DEFAULT;
        let mut candidates = layout.candidates(TokenId(11));
        assert_eq!(candidates.next(), Some(AccessCategory::Voice));
        assert_eq!(candidates.next(), Some(AccessCategory::Video));
        assert_eq!(candidates.next(), Some(AccessCategory::BestEffort));
        assert_eq!(candidates.next(), Some(AccessCategory::Background));
        assert_eq!(candidates.next(), None);

        let reserved: Option<AccessCategory> = layout.candidates(TokenId(3)).next();
        assert_eq!(reserved, Some(AccessCategory::Voice));
        assert_eq!(layout.candidates(TokenId(3)).count(), 1);
    }

    #[test]
    fn beacon_without_reservation_may_use_spares() {
        let layout = TokenLayout {
            num_tokens: 12,
            reserved_per_ac: 2,
            reserved_categories: 4,
        };
        assert_eq!(layout.spare_count(), 4);
        assert!(layout.may_use_spare(AccessCategory::Beacon));
        assert_eq!(layout.candidates(TokenId(8)).last(), Some(AccessCategory::Beacon));
    }

    #[test]
    fn validation() {
        assert_eq!(SchedulerConfig::default().validate(), Ok(()));
        let mut config = SchedulerConfig::default();
        config.layout.num_tokens = 4;
        assert_eq!(config.validate(), Err(ConfigError::ReservationExceedsPool));
        let config = SchedulerConfig {
            queue_high_watermark: 1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::WatermarkTooLow));
    }
}
