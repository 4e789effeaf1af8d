//! Node configuration

use crate::error::{NodeError, Result};
use crate::MAX_NODES;
use spikebus_hal::PsramLayout;

/// Static configuration of one compute node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeConfig {
    /// Bus identity, 0..16; baked into every emitted global neuron id
    pub node_id: u8,
    /// Simulation timestep in microseconds
    pub timestep_us: u32,
    /// PSRAM alias layout
    pub psram: PsramLayout,
    /// Heartbeat LED window length (ms)
    pub heartbeat_period_ms: u32,
    /// LED on-time at the start of each heartbeat window (ms)
    pub heartbeat_on_ms: u32,
    /// Watchdog timeout the platform is configured with (ms)
    pub watchdog_timeout_ms: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            timestep_us: 1000,
            psram: PsramLayout::default(),
            heartbeat_period_ms: 3000,
            heartbeat_on_ms: 100,
            watchdog_timeout_ms: 8000,
        }
    }
}

impl NodeConfig {
    /// Configuration for `node_id` with default timing
    pub fn new(node_id: u8) -> Result<Self> {
        let config = Self {
            node_id,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the simulation timestep
    pub fn with_timestep_us(mut self, timestep_us: u32) -> Self {
        self.timestep_us = timestep_us;
        self
    }

    /// Override the PSRAM layout
    pub fn with_psram(mut self, psram: PsramLayout) -> Self {
        self.psram = psram;
        self
    }

    /// Check the configuration invariants
    pub fn validate(&self) -> Result<()> {
        if self.node_id as usize >= MAX_NODES {
            return Err(NodeError::InvalidConfig {
                reason: "node_id out of range",
            });
        }
        if self.timestep_us == 0 {
            return Err(NodeError::InvalidConfig {
                reason: "timestep must be non-zero",
            });
        }
        if self.heartbeat_on_ms > self.heartbeat_period_ms {
            return Err(NodeError::InvalidConfig {
                reason: "heartbeat on-time exceeds period",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_node_id_bound() {
        assert!(NodeConfig::new(15).is_ok());
        assert!(NodeConfig::new(16).is_err());
    }

    #[test]
    fn test_zero_timestep_rejected() {
        let config = NodeConfig::default().with_timestep_us(0);
        assert!(config.validate().is_err());
    }
}
