//! The compute node and its cooperative run loop
//!
//! Single-threaded and non-blocking: each [`Node::poll`] kicks the watchdog,
//! drives the heartbeat LED, services the broker, takes in one frame, and
//! runs one LIF tick when the wall clock says so. Nothing here ever sleeps;
//! the only busy-wait in the whole node is inside the OTA commit path.

use crate::broker::Broker;
use crate::config::NodeConfig;
use crate::frame::{Frame, FrameKind, StreamId, BROADCAST_ADDR};
use crate::ota::OtaSession;
use crate::Result;
use spikebus_engine::{GlobalNeuronId, LifEngine, Spike};
use spikebus_hal::{Platform, Psram};

/// Output spikes broadcast per tick; the rest stay local
pub const MAX_BROADCASTS_PER_TIMESTEP: usize = 5;

/// Heartbeat LED color (blue)
const HEARTBEAT_COLOR: (u8, u8, u8) = (0, 0, 64);

/// One spikebus compute node
pub struct Node<P: Platform, B: Broker> {
    pub(crate) config: NodeConfig,
    pub(crate) platform: P,
    pub(crate) broker: B,
    pub(crate) psram: Psram,
    pub(crate) engine: LifEngine,
    pub(crate) ota: OtaSession,
    pub(crate) update_mode: bool,
    last_step_us: u32,
    led_on: bool,
}

impl<P: Platform, B: Broker> Node<P, B> {
    /// Assemble a node from its collaborators
    pub fn new(config: NodeConfig, platform: P, broker: B, psram: Psram) -> Result<Self> {
        config.validate()?;
        let engine = LifEngine::new(config.node_id).with_timestep_us(config.timestep_us);
        Ok(Self {
            config,
            platform,
            broker,
            psram,
            engine,
            ota: OtaSession::new(),
            update_mode: false,
            last_step_us: 0,
            led_on: false,
        })
    }

    /// The node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The LIF engine
    pub fn engine(&self) -> &LifEngine {
        &self.engine
    }

    /// Mutable engine access for host harnesses
    pub fn engine_mut(&mut self) -> &mut LifEngine {
        &mut self.engine
    }

    /// The platform
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Mutable platform access for host harnesses
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Mutable broker access for host harnesses
    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    /// Mutable PSRAM access for host harnesses
    pub fn psram_mut(&mut self) -> &mut Psram {
        &mut self.psram
    }

    /// The OTA session
    pub fn ota(&self) -> &OtaSession {
        &self.ota
    }

    /// Whether update mode is engaged
    pub fn update_mode_active(&self) -> bool {
        self.update_mode
    }

    /// One iteration of the cooperative loop
    pub fn poll(&mut self) {
        self.platform.watchdog_kick();
        self.heartbeat();
        self.broker.task();

        if let Some(frame) = self.broker.try_receive() {
            self.handle_frame(&frame);
        }

        if self.engine.is_running() {
            let now_us = self.platform.now_us();
            if now_us.wrapping_sub(self.last_step_us) >= self.engine.timestep_us() {
                self.last_step_us = now_us;

                // Keep command latency bounded across the step
                self.broker.task();
                if let Some(frame) = self.broker.try_receive() {
                    self.handle_frame(&frame);
                }

                self.engine.step();
                self.broker.task();
                self.broadcast_outputs();
            }
        }
    }

    /// Run the loop forever
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
            core::hint::spin_loop();
        }
    }

    fn heartbeat(&mut self) {
        let window = (self.platform.uptime_ms() % self.config.heartbeat_period_ms as u64) as u32;
        let on = window < self.config.heartbeat_on_ms;
        if on != self.led_on {
            let (r, g, b) = if on { HEARTBEAT_COLOR } else { (0, 0, 0) };
            self.platform.set_led(r, g, b);
            self.led_on = on;
        }
    }

    fn handle_frame(&mut self, frame: &Frame) {
        match frame.kind {
            FrameKind::Ctrl => {
                self.dispatch(frame);
                self.broker.task();
            }
            FrameKind::Unicast => self.intake_spike(frame),
            FrameKind::Broadcast => {
                // Own broadcasts come back off the bus; the engine already
                // loops its spikes locally
                if frame.src != self.config.node_id {
                    self.intake_spike(frame);
                }
            }
        }
    }

    fn intake_spike(&mut self, frame: &Frame) {
        if frame.length_bytes() < 4 {
            return;
        }
        let Some(raw) = frame.u32_at(0) else {
            return;
        };
        let spike = Spike {
            neuron_id: GlobalNeuronId::from_raw(raw),
            timestamp_us: self.engine.current_time_us(),
            value: 1.0,
        };
        if !self.engine.inject(spike) {
            log::debug!("Spike queue full; bus spike dropped");
        }
    }

    fn broadcast_outputs(&mut self) {
        // A stop command handled mid-step leaves stale output behind
        if !self.engine.is_running() {
            return;
        }

        let count = self
            .engine
            .output_spikes()
            .len()
            .min(MAX_BROADCASTS_PER_TIMESTEP);
        for i in 0..count {
            let spike = self.engine.output_spikes()[i];
            let raw = spike.neuron_id.raw();
            let words = [
                (raw & 0xFFFF) as u16,
                ((raw >> 16) & 0xFF) as u16,
                (spike.value * 1000.0) as u16,
            ];
            let frame = Frame::with_payload(
                FrameKind::Broadcast,
                self.config.node_id,
                BROADCAST_ADDR,
                StreamId::Spike,
                &words,
            );
            if self.broker.send(frame).is_err() {
                log::debug!("Spike broadcast backpressure; {} left", count - i);
                break;
            }
            self.broker.task();
        }
    }
}
