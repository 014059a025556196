//! Bring-up and runtime errors.

use crate::guard::GuardError;
use crate::transport::TransportError;
use anyio_common::config::ConfigError;
use anyio_common::llio::interface::{LlioError, RegisterError};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors from configuration, bring-up and the cyclic runtime.
#[derive(Debug, Error)]
pub enum EthError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A board's transport could not be opened or pinned.
    #[error("board {ip}: {source}")]
    Transport {
        /// Board address.
        ip: Ipv4Addr,
        /// Cause.
        #[source]
        source: TransportError,
    },

    /// A board did not identify itself.
    #[error("board {ip} identification failed: {source}")]
    Identify {
        /// Board address.
        ip: Ipv4Addr,
        /// Cause.
        #[source]
        source: LlioError,
    },

    /// The register framework rejected a board.
    #[error(transparent)]
    Register(#[from] RegisterError),

    /// The network guard refused.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Nothing to bring up.
    #[error("no boards configured")]
    NoBoards,

    /// Handle does not refer to a board of this session.
    #[error("invalid board handle {0}")]
    InvalidHandle(usize),

    /// A board's sticky error counter saturated during the cycle.
    #[error("board {board}: {source}")]
    Link {
        /// Instance name.
        board: String,
        /// Cause.
        #[source]
        source: LlioError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_board() {
        let err = EthError::Transport {
            ip: Ipv4Addr::new(10, 10, 10, 10),
            source: TransportError::Closed,
        };
        assert_eq!(err.to_string(), "board 10.10.10.10: transport closed");

        let err = EthError::Link {
            board: "hm2_7i92.0".to_string(),
            source: LlioError::LinkDegraded { error_count: 10 },
        };
        assert!(err.to_string().starts_with("board hm2_7i92.0"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let err = EthError::from(ConfigError::FileNotFound);
        assert_eq!(err.to_string(), "Configuration file not found");
    }
}
