//! Node runtime for spikebus compute nodes
//!
//! Ties the LIF engine to the cluster bus: frame intake and spike broadcast,
//! the control-command dispatcher, the OTA update session, and the
//! cooperative run loop that interleaves all of it without ever blocking.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod command;
pub mod config;
pub mod error;
pub mod frame;
pub mod node;
pub mod ota;

pub use broker::{Broker, MemoryBroker, TxFull};
pub use command::{opcode, poll_type};
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use frame::{Frame, FrameKind, StreamId, BROADCAST_ADDR, MAX_PAYLOAD_WORDS};
pub use node::{Node, MAX_BROADCASTS_PER_TIMESTEP};
pub use ota::{OtaSession, OtaState, BITMAP_WORDS, MAX_CHUNKS, OTA_BUFFER_OFFSET};

/// Maximum nodes on one bus
pub const MAX_NODES: usize = 16;
