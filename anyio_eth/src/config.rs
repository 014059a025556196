//! `anyio_eth` configuration.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "anyio_eth"
//! log_level = "info"
//!
//! [timing]
//! cycle_time_us = 1000
//! read_deadline_us = 800
//!
//! [[boards]]
//! ip = "10.10.10.10"
//! config = "num_encoders=3 num_pwmgens=3"
//! watch = [0x0100, 0x0104]
//! ```

use crate::session::BoardRequest;
use crate::transport::TransportTiming;
use anyio_common::config::{ConfigError, SharedConfig};
use anyio_common::consts::{
    CYCLE_TIME_US, IMMEDIATE_TIMEOUT_MS, MAX_QUEUED_READS, POLL_INTERVAL_US, READ_DEADLINE_US,
    RECV_TIMEOUT_US, SEND_TIMEOUT_US,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Complete `anyio_eth` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthConfig {
    /// Common service settings.
    pub shared: SharedConfig,
    /// Cycle and socket timing.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Boards in bring-up order.
    #[serde(default)]
    pub boards: Vec<BoardConfig>,
}

/// Cycle and socket timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Control cycle period.
    pub cycle_time_us: u64,
    /// Deadline for queued read replies, from cycle start.
    pub read_deadline_us: u64,
    /// Reply deadline for immediate transfers.
    pub immediate_timeout_ms: u64,
    /// Delay between receive attempts.
    pub poll_interval_us: u64,
    /// Socket send timeout.
    pub send_timeout_us: u64,
    /// Socket receive timeout.
    pub recv_timeout_us: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: CYCLE_TIME_US,
            read_deadline_us: READ_DEADLINE_US,
            immediate_timeout_ms: IMMEDIATE_TIMEOUT_MS,
            poll_interval_us: POLL_INTERVAL_US,
            send_timeout_us: SEND_TIMEOUT_US,
            recv_timeout_us: RECV_TIMEOUT_US,
        }
    }
}

impl TimingConfig {
    /// Control cycle period.
    pub fn cycle_time(&self) -> Duration {
        Duration::from_micros(self.cycle_time_us)
    }

    /// Queued read deadline, from cycle start.
    pub fn read_deadline(&self) -> Duration {
        Duration::from_micros(self.read_deadline_us)
    }

    /// Immediate transfer deadline.
    pub fn immediate_timeout(&self) -> Duration {
        Duration::from_millis(self.immediate_timeout_ms)
    }

    /// Socket timing for transports.
    pub fn transport(&self) -> TransportTiming {
        TransportTiming {
            send_timeout: Duration::from_micros(self.send_timeout_us),
            recv_timeout: Duration::from_micros(self.recv_timeout_us),
            poll_interval: Duration::from_micros(self.poll_interval_us),
        }
    }

    /// Validate the timing section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("cycle_time_us", self.cycle_time_us),
            ("read_deadline_us", self.read_deadline_us),
            ("immediate_timeout_ms", self.immediate_timeout_ms),
            ("poll_interval_us", self.poll_interval_us),
            ("send_timeout_us", self.send_timeout_us),
            ("recv_timeout_us", self.recv_timeout_us),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ValidationError(format!("timing.{name} must be > 0")));
        }
        if self.read_deadline_us >= self.cycle_time_us {
            return Err(ConfigError::ValidationError(format!(
                "timing.read_deadline_us ({}) must be below cycle_time_us ({})",
                self.read_deadline_us, self.cycle_time_us
            )));
        }
        Ok(())
    }
}

/// One board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Board IPv4 address.
    pub ip: Ipv4Addr,
    /// Configuration string for the register framework.
    #[serde(default)]
    pub config: String,
    /// Registers read every cycle.
    #[serde(default)]
    pub watch: Vec<u16>,
}

impl BoardConfig {
    /// Board at `ip` with no configuration string and no watches.
    pub fn new(ip: Ipv4Addr) -> Self {
        Self {
            ip,
            config: String::new(),
            watch: Vec::new(),
        }
    }
}

impl EthConfig {
    /// Configuration with default timing and the given boards.
    pub fn new(service_name: &str, boards: Vec<BoardConfig>) -> Self {
        Self {
            shared: SharedConfig::new(service_name),
            timing: TimingConfig::default(),
            boards,
        }
    }

    /// Validate every section.
    ///
    /// # Errors
    /// `ConfigError::ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.timing.validate()?;

        if self.boards.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one board is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for (idx, board) in self.boards.iter().enumerate() {
            if !seen.insert(board.ip) {
                return Err(ConfigError::ValidationError(format!(
                    "boards[{idx}]: duplicate ip {}",
                    board.ip
                )));
            }
            if board.watch.len() > MAX_QUEUED_READS {
                return Err(ConfigError::ValidationError(format!(
                    "boards[{idx}]: {} watch addresses exceed the {MAX_QUEUED_READS} reads of one batch",
                    board.watch.len()
                )));
            }
            if let Some(address) = board.watch.iter().find(|a| *a % 4 != 0) {
                return Err(ConfigError::ValidationError(format!(
                    "boards[{idx}]: watch address {address:#06x} is not 4-byte aligned"
                )));
            }
        }
        Ok(())
    }

    /// Bring-up requests in board order.
    pub fn requests(&self) -> Vec<BoardRequest> {
        self.boards
            .iter()
            .map(|b| BoardRequest {
                ip: b.ip,
                config: b.config.clone(),
            })
            .collect()
    }
}
