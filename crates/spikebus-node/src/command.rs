//! Control-stream command dispatch
//!
//! Frames on the control path carry their opcode in payload word 0. Replies
//! echo the opcode with the ACK bit set, except where a dedicated reply
//! opcode exists. The dispatcher services the broker after every handled
//! command so replies cannot starve behind spike traffic.

use crate::broker::Broker;
use crate::frame::{Frame, FrameKind, StreamId};
use crate::node::Node;
use crate::ota::OTA_BUFFER_OFFSET;
use spikebus_engine::{topology, GlobalNeuronId, Spike};
use spikebus_hal::Platform;

/// Control opcodes
pub mod opcode {
    /// Reply bit ORed onto the request opcode
    pub const ACK_FLAG: u16 = 0x8000;

    /// Liveness probe
    pub const PING: u16 = 0x0001;
    /// Reboot into the bootloader, preserving identity
    pub const RESET_TO_BOOTLOADER: u16 = 0x0002;
    /// General node status
    pub const READ_STATUS: u16 = 0x0003;

    /// Start the simulation
    pub const START_SNN: u16 = 0x0010;
    /// Stop the simulation
    pub const STOP_SNN: u16 = 0x0011;
    /// Pause the simulation
    pub const PAUSE_SNN: u16 = 0x0012;
    /// Resume a paused simulation
    pub const RESUME_SNN: u16 = 0x0013;
    /// Inject a batch of unit spikes
    pub const INJECT_SPIKE_BATCH: u16 = 0x0014;
    /// Simulation status and rates
    pub const GET_SNN_STATUS: u16 = 0x0015;

    /// Raw PSRAM write
    pub const WRITE_MEMORY: u16 = 0x0020;
    /// (Re)load the neuron table
    pub const DEPLOY_TOPOLOGY: u16 = 0x0021;

    /// Enter update mode (stops the simulation)
    pub const UPDATE_MODE_ENTER: u16 = 0x0030;
    /// Leave update mode, discarding any session
    pub const UPDATE_MODE_EXIT: u16 = 0x0031;
    /// Announce a firmware transfer
    pub const UPDATE_START: u16 = 0x0032;
    /// One firmware chunk
    pub const UPDATE_DATA_CHUNK: u16 = 0x0033;
    /// Poll session status or trigger verification
    pub const UPDATE_POLL: u16 = 0x0034;
    /// Program the staged image into flash
    pub const UPDATE_COMMIT: u16 = 0x0035;
    /// Reboot into the new image
    pub const UPDATE_RESTART: u16 = 0x0036;

    /// Reply to PING
    pub const PONG: u16 = PING | ACK_FLAG;
    /// Session status reply
    pub const UPDATE_READY: u16 = 0x0040;
    /// Chunk acknowledgement
    pub const UPDATE_ACK_CHUNK: u16 = 0x0041;
    /// Verification result
    pub const UPDATE_VERIFY_RESP: u16 = 0x0042;
    /// Commit result
    pub const UPDATE_COMMIT_RESP: u16 = 0x0043;
}

/// Poll types for `UPDATE_POLL`
pub mod poll_type {
    /// Report session status
    pub const STATUS: u16 = 0;
    /// Verify the staged image CRC
    pub const VERIFY: u16 = 1;
}

impl<P: Platform, B: Broker> Node<P, B> {
    /// Dispatch one control frame by opcode.
    ///
    /// Malformed frames are skipped with a warning; frames targeting other
    /// nodes are ignored silently.
    pub fn dispatch(&mut self, frame: &Frame) {
        let Some(op) = frame.word(0) else {
            log::warn!("Control frame with empty payload from node {}", frame.src);
            return;
        };

        match op {
            opcode::PING => self.reply(frame.src, StreamId::Mgmt, &[opcode::PONG]),
            opcode::RESET_TO_BOOTLOADER => self.handle_reset_to_bootloader(frame),
            opcode::READ_STATUS => self.handle_read_status(frame),
            opcode::START_SNN => {
                self.engine.start();
                self.ack(frame, StreamId::SnnControl);
            }
            opcode::STOP_SNN => {
                self.engine.stop();
                self.ack(frame, StreamId::SnnControl);
            }
            opcode::PAUSE_SNN => {
                self.engine.pause();
                self.ack(frame, StreamId::SnnControl);
            }
            opcode::RESUME_SNN => {
                self.engine.resume();
                self.ack(frame, StreamId::SnnControl);
            }
            opcode::INJECT_SPIKE_BATCH => self.handle_inject_batch(frame),
            opcode::GET_SNN_STATUS => self.handle_snn_status(frame),
            opcode::WRITE_MEMORY => self.handle_write_memory(frame),
            opcode::DEPLOY_TOPOLOGY => self.handle_deploy_topology(frame),
            opcode::UPDATE_MODE_ENTER => {
                if self.engine.is_running() {
                    self.engine.stop();
                }
                self.update_mode = true;
                self.ota.enter_mode();
            }
            opcode::UPDATE_MODE_EXIT => {
                self.ota.exit();
                self.update_mode = false;
            }
            opcode::UPDATE_START => self.handle_update_start(frame),
            opcode::UPDATE_DATA_CHUNK => self.handle_update_chunk(frame),
            opcode::UPDATE_POLL => self.handle_update_poll(frame),
            opcode::UPDATE_COMMIT => self.handle_update_commit(frame),
            opcode::UPDATE_RESTART => {
                self.platform.delay_ms(1000);
                self.platform.request_reset();
            }
            other => log::warn!("Unknown opcode {:#06x} from node {}", other, frame.src),
        }

        // Flush replies before the loop re-enters steady state
        self.broker.task();
    }

    fn reply(&mut self, dest: u8, stream: StreamId, words: &[u16]) {
        let frame = Frame::with_payload(FrameKind::Ctrl, self.config.node_id, dest, stream, words);
        if self.broker.send(frame).is_err() {
            log::warn!("Reply {:#06x} dropped: TX full", words[0]);
        }
    }

    fn ack(&mut self, frame: &Frame, stream: StreamId) {
        let op = frame.word(0).unwrap_or(0);
        self.reply(frame.src, stream, &[op | opcode::ACK_FLAG]);
    }

    /// Frame must carry at least `words` payload words
    fn require_words(&self, frame: &Frame, words: usize) -> bool {
        if frame.words().len() < words {
            log::warn!(
                "Malformed frame: opcode {:#06x} with {} bytes",
                frame.word(0).unwrap_or(0),
                frame.length_bytes()
            );
            return false;
        }
        true
    }

    fn handle_reset_to_bootloader(&mut self, frame: &Frame) {
        self.ack(frame, StreamId::Mgmt);
        self.broker.task();
        if let Err(err) = self.platform.persist_node_id(self.config.node_id) {
            log::warn!("Failed to persist node id: {}", err);
        }
        self.platform.delay_ms(100);
        self.platform.request_reset();
    }

    fn handle_read_status(&mut self, frame: &Frame) {
        let uptime_ms = self.platform.uptime_ms() as u32;
        let mem_free = self.platform.free_memory_bytes();
        let (r, g, b) = self.platform.led();
        let words = [
            opcode::READ_STATUS | opcode::ACK_FLAG,
            self.config.node_id as u16,
            (uptime_ms & 0xFFFF) as u16,
            (uptime_ms >> 16) as u16,
            (mem_free & 0xFFFF) as u16,
            (mem_free >> 16) as u16,
            r as u16,
            g as u16,
            b as u16,
            self.engine.is_running() as u16,
            self.engine.neuron_count() as u16,
        ];
        self.reply(frame.src, StreamId::Mgmt, &words);
    }

    fn handle_inject_batch(&mut self, frame: &Frame) {
        if !self.require_words(frame, 2) {
            return;
        }
        let count = frame.word(1).unwrap_or(0) as usize;
        if !self.require_words(frame, 2 + 2 * count) {
            return;
        }
        let timestamp_us = self.engine.current_time_us();
        for i in 0..count {
            if let Some(raw) = frame.u32_at(2 + 2 * i) {
                let spike = Spike {
                    neuron_id: GlobalNeuronId::from_raw(raw),
                    timestamp_us,
                    value: 1.0,
                };
                if !self.engine.inject(spike) {
                    log::debug!("Spike queue full during batch injection");
                }
            }
        }
    }

    fn handle_snn_status(&mut self, frame: &Frame) {
        let stats = *self.engine.stats();
        let total = stats.spikes_generated;
        let rate = stats.spike_rate_hz(self.engine.current_time_us());
        let words = [
            opcode::GET_SNN_STATUS | opcode::ACK_FLAG,
            self.engine.is_running() as u16,
            self.engine.neuron_count() as u16,
            self.engine.active_neuron_count() as u16,
            (total & 0xFFFF) as u16,
            (total >> 16) as u16,
            (rate & 0xFFFF) as u16,
            (rate >> 16) as u16,
        ];
        self.reply(frame.src, StreamId::SnnControl, &words);
    }

    fn handle_write_memory(&mut self, frame: &Frame) {
        if !self.require_words(frame, 6) {
            return;
        }
        // Header length field is in BYTES; payload is addressed in words
        let length = frame.word(1).unwrap_or(0) as usize;
        let Some(addr) = frame.u32_at(2) else {
            return;
        };
        if (frame.length_bytes() as usize) < 12 + length {
            log::warn!(
                "WRITE_MEMORY announces {} bytes but frame carries {}",
                length,
                frame.length_bytes()
            );
            return;
        }

        let mut data = [0u8; 2 * crate::frame::MAX_PAYLOAD_WORDS];
        if !frame.copy_bytes(6, length, &mut data) {
            return;
        }
        if let Err(err) = self.psram.writer().write(addr, &data[..length]) {
            // Out-of-range writes are a logged no-op
            log::warn!("WRITE_MEMORY rejected: {}", err);
        }
        self.reply(
            frame.src,
            StreamId::Memory,
            &[opcode::WRITE_MEMORY | opcode::ACK_FLAG],
        );
    }

    fn handle_deploy_topology(&mut self, frame: &Frame) {
        let base = self.psram.layout().uncached_addr(topology::NEURON_TABLE_OFFSET);
        let (status, count) = match self.engine.load_topology(&self.psram.reader(), base) {
            Ok(count) => (1u16, count as u16),
            Err(err) => {
                log::warn!("Topology deploy failed: {}", err);
                (0u16, 0u16)
            }
        };
        self.reply(
            frame.src,
            StreamId::SnnConfig,
            &[opcode::DEPLOY_TOPOLOGY | opcode::ACK_FLAG, status, count],
        );
    }

    fn staging_capacity(&self) -> u32 {
        self.psram.layout().size - OTA_BUFFER_OFFSET
    }

    fn send_update_ready(&mut self, dest: u8, status: u16) {
        let available = self.staging_capacity();
        let words = [
            opcode::UPDATE_READY,
            status,
            (available & 0xFFFF) as u16,
            (available >> 16) as u16,
            self.ota.chunks_received() as u16,
            self.ota.total_chunks() as u16,
        ];
        self.reply(dest, StreamId::Mgmt, &words);
    }

    fn handle_update_start(&mut self, frame: &Frame) {
        if !self.require_words(frame, 8) {
            return;
        }
        if frame.word(1) != Some(self.config.node_id as u16) {
            return;
        }
        let Some(size) = frame.u32_at(2) else { return };
        let Some(crc) = frame.u32_at(4) else { return };
        let chunk_size = frame.word(6).unwrap_or(0) as u32;
        let total_chunks = frame.word(7).unwrap_or(0) as u32;

        let available = self.staging_capacity();
        let status = match self.ota.start(size, crc, chunk_size, total_chunks, available) {
            Ok(()) => 1,
            Err(err) => {
                log::warn!("UPDATE_START rejected: {}", err);
                0
            }
        };
        self.send_update_ready(frame.src, status);
    }

    fn handle_update_chunk(&mut self, frame: &Frame) {
        if !self.require_words(frame, 4) {
            return;
        }
        if frame.word(1) != Some(self.config.node_id as u16) {
            return;
        }
        let chunk_num = frame.word(2).unwrap_or(0) as u32;
        let data_size = frame.word(3).unwrap_or(0) as usize;

        let mut data = [0u8; 2 * crate::frame::MAX_PAYLOAD_WORDS];
        if !frame.copy_bytes(4, data_size, &mut data) {
            log::warn!(
                "Chunk {} announces {} bytes beyond frame payload",
                chunk_num,
                data_size
            );
            return;
        }

        match self
            .ota
            .write_chunk(&mut self.psram, chunk_num, &data[..data_size])
        {
            Ok(()) => {
                self.reply(
                    frame.src,
                    StreamId::Mgmt,
                    &[opcode::UPDATE_ACK_CHUNK, chunk_num as u16],
                );
            }
            Err(err) => log::warn!("Chunk {} rejected: {}", chunk_num, err),
        }
    }

    fn handle_update_poll(&mut self, frame: &Frame) {
        if !self.require_words(frame, 3) {
            return;
        }
        if frame.word(1) != Some(self.config.node_id as u16) {
            return;
        }
        match frame.word(2).unwrap_or(poll_type::STATUS) {
            poll_type::VERIFY => {
                let words = match self.ota.verify(&self.psram) {
                    Ok(crc) => [
                        opcode::UPDATE_VERIFY_RESP,
                        1,
                        (crc & 0xFFFF) as u16,
                        (crc >> 16) as u16,
                    ],
                    Err(crate::error::NodeError::CrcMismatch { computed, .. }) => [
                        opcode::UPDATE_VERIFY_RESP,
                        0,
                        (computed & 0xFFFF) as u16,
                        (computed >> 16) as u16,
                    ],
                    Err(err) => {
                        log::warn!("Verify poll failed: {}", err);
                        [opcode::UPDATE_VERIFY_RESP, 0, 0, 0]
                    }
                };
                self.reply(frame.src, StreamId::Mgmt, &words);
            }
            _ => self.send_update_ready(frame.src, self.ota.is_active() as u16),
        }
    }

    fn handle_update_commit(&mut self, frame: &Frame) {
        let ok = match self.ota.commit(&self.psram, &mut self.platform) {
            Ok(()) => 1u16,
            Err(err) => {
                log::warn!("Commit failed: {}", err);
                0u16
            }
        };
        self.reply(
            frame.src,
            StreamId::Mgmt,
            &[opcode::UPDATE_COMMIT_RESP, ok],
        );
    }
}
