use alloc::{vec, vec::Vec};

use crate::{
    config::{TokenLayout, TOKEN_BUCKET_BOUND},
    types::{AccessCategory, TokenId, NUM_ACS},
};

/// The allocator for the hardware transmit descriptors.
///
/// Every descriptor is one bit in the pool bitmap. A set bit means, that the descriptor is busy.
/// Next to the bitmap, we remember which category a busy token is accounted to, so that the
/// outstanding counters can always be checked against the bitmap.
pub struct TokenPool {
    layout: TokenLayout,
    bitmap: Vec<u32>,
    owners: Vec<Option<AccessCategory>>,
    outstanding: [usize; NUM_ACS],
}
impl TokenPool {
    pub fn new(layout: TokenLayout) -> Self {
        Self {
            layout,
            bitmap: vec![0; layout.num_tokens.div_ceil(TOKEN_BUCKET_BOUND)],
            owners: vec![None; layout.num_tokens],
            outstanding: [0; NUM_ACS],
        }
    }
    pub fn layout(&self) -> &TokenLayout {
        &self.layout
    }
    /// Splits a token into the bitmap word and bit.
    const fn position(token: TokenId) -> (usize, u32) {
        (
            token.0 / TOKEN_BUCKET_BOUND,
            1 << (token.0 % TOKEN_BUCKET_BOUND),
        )
    }
    fn test_and_set(&mut self, token: TokenId) -> bool {
        let (pool_id, bit) = Self::position(token);
        let was_set = self.bitmap[pool_id] & bit != 0;
        self.bitmap[pool_id] |= bit;
        was_set
    }
    fn clear(&mut self, token: TokenId) {
        let (pool_id, bit) = Self::position(token);
        self.bitmap[pool_id] &= !bit;
    }
    /// Check if the token is currently allocated.
    pub fn is_busy(&self, token: TokenId) -> bool {
        if token.0 >= self.layout.num_tokens {
            return false;
        }
        let (pool_id, bit) = Self::position(token);
        self.bitmap[pool_id] & bit != 0
    }
    /// Acquire a token for `ac`.
    ///
    /// The reserved tokens of `ac` are tried first, after that the spare range. Returns `None`,
    /// if every eligible token is busy.
    pub fn acquire(&mut self, ac: AccessCategory) -> Option<TokenId> {
        let layout = self.layout;
        let reserved =
            (0..layout.reserved_per_ac).filter_map(|slot| layout.reserved_token(ac, slot));
        let spare = (layout.reserved_count()..layout.num_tokens)
            .map(TokenId)
            .filter(|_| layout.may_use_spare(ac));
        let token = reserved
            .chain(spare)
            .find(|token| !self.test_and_set(*token))?;
        self.mark_owned(token, ac);
        Some(token)
    }
    /// Acquire one specific token for `ac`.
    ///
    /// This fails if the token is busy, or if it is neither reserved for `ac` nor a spare
    /// token `ac` may use.
    pub fn acquire_exact(&mut self, token: TokenId, ac: AccessCategory) -> bool {
        if !self.is_eligible(token, ac) || self.test_and_set(token) {
            return false;
        }
        self.mark_owned(token, ac);
        true
    }
    fn is_eligible(&self, token: TokenId, ac: AccessCategory) -> bool {
        match self.layout.reserved_owner(token) {
            Some(owner) => owner == ac,
            None => self.layout.is_spare(token) && self.layout.may_use_spare(ac),
        }
    }
    fn mark_owned(&mut self, token: TokenId, ac: AccessCategory) {
        self.owners[token.0] = Some(ac);
        self.outstanding[ac.index()] += 1;
        trace!(
            "Token {} acquired for AC {}, outstanding: {}",
            token.0,
            ac.index(),
            self.outstanding[ac.index()]
        );
    }
    /// Return a token to the pool.
    ///
    /// Accounting violations are logged and left as they are, since correcting them would hide
    /// the bug that caused them.
    pub fn release(&mut self, token: TokenId, ac: AccessCategory) {
        if token.0 >= self.layout.num_tokens {
            error!("Attempted to release invalid token {}.", token.0);
            return;
        }
        if !self.is_busy(token) {
            error!("Token {} released while not busy.", token.0);
        }
        if self.owners[token.0] != Some(ac) {
            error!(
                "Token {} released for AC {}, but accounted to {:?}.",
                token.0,
                ac.index(),
                self.owners[token.0].map(AccessCategory::index)
            );
        }
        self.clear(token);
        self.owners[token.0] = None;
        let old = self.outstanding[ac.index()];
        match old.checked_sub(1) {
            Some(new) => self.outstanding[ac.index()] = new,
            None => error!(
                "Outstanding tokens for AC {} would underflow, old: {}",
                ac.index(),
                old
            ),
        }
        self.check_outstanding(ac);
        trace!(
            "Token {} released by AC {}, outstanding: {}",
            token.0,
            ac.index(),
            self.outstanding[ac.index()]
        );
    }
    /// Move the accounting for a busy token from one category to another.
    ///
    /// This happens, when a freed spare token is immediately refilled with frames of another
    /// category.
    pub fn transfer(&mut self, token: TokenId, from: AccessCategory, to: AccessCategory) {
        if from == to {
            return;
        }
        match self.outstanding[from.index()].checked_sub(1) {
            Some(new) => self.outstanding[from.index()] = new,
            None => error!(
                "Outstanding tokens for AC {} would underflow on transfer.",
                from.index()
            ),
        }
        self.outstanding[to.index()] += 1;
        self.owners[token.0] = Some(to);
        self.check_outstanding(to);
    }
    fn check_outstanding(&self, ac: AccessCategory) {
        let limit = self.layout.reserved_per_ac + self.layout.spare_count();
        let outstanding = self.outstanding[ac.index()];
        if outstanding > limit {
            error!(
                "Invalid outstanding tokens for AC {}: {} > {}",
                ac.index(),
                outstanding,
                limit
            );
        }
    }
    /// The amount of tokens currently accounted to `ac`.
    pub fn outstanding(&self, ac: AccessCategory) -> usize {
        self.outstanding[ac.index()]
    }
    /// The category a busy token is accounted to.
    pub fn owner(&self, token: TokenId) -> Option<AccessCategory> {
        self.owners.get(token.0).copied().flatten()
    }
    /// Busy tokens as a bitmask, with bit `n` representing token `n`.
    pub fn busy_mask(&self) -> u64 {
        self.bitmap
            .iter()
            .enumerate()
            .fold(0u64, |mask, (pool_id, word)| {
                mask | ((*word as u64) << (pool_id * TOKEN_BUCKET_BOUND))
            })
    }
    /// Iterate over all tokens.
    pub fn tokens(&self) -> impl Iterator<Item = TokenId> {
        (0..self.layout.num_tokens).map(TokenId)
    }
    /// Check the outstanding counters against the bitmap.
    pub fn is_consistent(&self) -> bool {
        AccessCategory::ALL.into_iter().all(|ac| {
            let owned = self
                .tokens()
                .filter(|token| self.is_busy(*token) && self.owner(*token) == Some(ac))
                .count();
            owned == self.outstanding(ac)
        })
    }
    /// Clear every token and counter.
    pub fn reset(&mut self) {
        self.bitmap.iter_mut().for_each(|word| *word = 0);
        self.owners.iter_mut().for_each(|owner| *owner = None);
        self.outstanding = [0; NUM_ACS];
    }
}
