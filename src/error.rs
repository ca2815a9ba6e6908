use crate::{config::ConfigError, types::TokenId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedulerError {
    InvalidConfig(ConfigError),
    /// The MPDU is too short to contain the addresses used for scheduling.
    FrameTooShort,
    VifOutOfBounds,
    PeerOutOfBounds,
    InvalidChannelContext,
    TokenOutOfBounds,
}
impl From<ConfigError> for SchedulerError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The transport refused to take a batch.
///
/// The code is opaque to the scheduler and only logged.
pub struct TransportError(pub i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A flush didn't finish within the tick budget.
pub enum DrainError {
    /// Frames were still waiting for a descriptor.
    PendingTimeout { remaining: usize },
    /// Descriptors were still owned by the firmware. The mask has one bit per [TokenId].
    InFlightTimeout { busy_tokens: u64 },
}
impl DrainError {
    /// Check if the token was still busy, when the flush gave up.
    pub const fn is_token_stuck(&self, token: TokenId) -> bool {
        match self {
            Self::InFlightTimeout { busy_tokens } => {
                token.0 < 64 && *busy_tokens & (1 << token.0) != 0
            }
            Self::PendingTimeout { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn stuck_tokens() {
        let err = DrainError::InFlightTimeout {
            busy_tokens: 0b1010,
        };
        assert!(err.is_token_stuck(TokenId(1)));
        assert!(err.is_token_stuck(TokenId(3)));
        assert!(!err.is_token_stuck(TokenId(2)));
        assert!(!err.is_token_stuck(TokenId(64)));
        assert!(!DrainError::PendingTimeout { remaining: 3 }.is_token_stuck(TokenId(1)));
    }
    #[test]
    fn config_errors_are_hashable() {
        let errors: HashSet<SchedulerError> = [
            ConfigError::NoTokens.into(),
            ConfigError::NoTokens.into(),
            SchedulerError::FrameTooShort,
        ]
        .into_iter()
        .collect();
        assert_eq!(errors.len(), 2);
    }
}
