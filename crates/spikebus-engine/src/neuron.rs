//! Runtime neuron and synapse types
//!
//! Synapses are stored on disk as packed 4-byte words:
//! `(source_id & 0xFFFFFF) << 8 | weight_u8`. Weight codes 0..=127 map to
//! excitatory weights 0.0..=2.0, codes 128..=255 to inhibitory weights
//! 0.0..=-2.0, both with a 63.5 divisor.

use crate::spike::GlobalNeuronId;
use bitflags::bitflags;
use heapless::Vec;

/// Maximum incoming synapses per neuron
pub const MAX_SYNAPSES_PER_NEURON: usize = 60;

/// Synaptic delay applied to every decoded synapse, reserved for future use
pub const DEFAULT_SYNAPSE_DELAY_US: u16 = 1000;

bitflags! {
    /// Informational neuron attribute bits carried in the table
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NeuronFlags: u16 {
        /// Neuron participates in simulation
        const ACTIVE = 1 << 0;
        /// Neuron's outgoing weights are inhibitory
        const INHIBITORY = 1 << 1;
        /// Neuron is an input site
        const INPUT = 1 << 2;
        /// Neuron is an output site
        const OUTPUT = 1 << 3;
        /// Neuron was refractory when the table was captured
        const REFRACTORY = 1 << 4;
    }
}

/// An incoming connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synapse {
    /// Source neuron, cluster-wide
    pub source: GlobalNeuronId,
    /// Signed weight in [-2.0, 2.0]
    pub weight: f32,
    /// Propagation delay in microseconds (reserved, not applied)
    pub delay_us: u16,
}

impl Synapse {
    /// Create a synapse with the default delay
    pub fn new(source: GlobalNeuronId, weight: f32) -> Self {
        Self {
            source,
            weight,
            delay_us: DEFAULT_SYNAPSE_DELAY_US,
        }
    }

    /// Decode the packed on-disk form
    pub fn from_packed(packed: u32) -> Self {
        Self::new(
            GlobalNeuronId::from_raw(packed >> 8),
            decode_weight((packed & 0xFF) as u8),
        )
    }

    /// Encode into the packed on-disk form
    pub fn to_packed(&self) -> u32 {
        (self.source.raw() << 8) | encode_weight(self.weight) as u32
    }
}

/// Decode a weight byte: 0..=127 excitatory, 128..=255 inhibitory
pub fn decode_weight(code: u8) -> f32 {
    if code < 128 {
        code as f32 / 63.5
    } else {
        -((code - 128) as f32) / 63.5
    }
}

/// Encode a weight into its byte code, saturating at the domain edges
pub fn encode_weight(weight: f32) -> u8 {
    if weight >= 0.0 {
        let code = (weight * 63.5).round() as i32;
        code.clamp(0, 127) as u8
    } else {
        let code = (-weight * 63.5).round() as i32;
        128 + code.clamp(0, 127) as u8
    }
}

/// Runtime state of one LIF neuron
#[derive(Debug, Clone, PartialEq)]
pub struct Neuron {
    /// Index in the node's neuron array
    pub local_id: u16,
    /// Cluster-wide identity
    pub global_id: GlobalNeuronId,
    /// Attribute bits
    pub flags: NeuronFlags,
    /// Membrane potential
    pub v_mem: f32,
    /// Firing threshold
    pub threshold: f32,
    /// Per-tick retention factor in [0, 1]; 0.0 marks a non-decaying input site
    pub leak_rate: f32,
    /// Dead time after firing
    pub refractory_period_us: u32,
    /// Absolute simulation time before which firing is suppressed
    pub refractory_until_us: u32,
    /// Simulation time of the last fire
    pub last_spike_time_us: u32,
    /// Lifetime fire count
    pub spike_count: u32,
    /// Incoming connections
    pub synapses: Vec<Synapse, MAX_SYNAPSES_PER_NEURON>,
}

impl Neuron {
    /// Create a resting neuron owned by `node_id`
    pub fn new(node_id: u8, local_id: u16, threshold: f32, leak_rate: f32) -> Self {
        Self {
            local_id,
            global_id: GlobalNeuronId::new(node_id, local_id),
            flags: NeuronFlags::ACTIVE,
            v_mem: 0.0,
            threshold,
            leak_rate,
            refractory_period_us: 0,
            refractory_until_us: 0,
            last_spike_time_us: 0,
            spike_count: 0,
            synapses: Vec::new(),
        }
    }

    /// Structural input test: a neuron with no incoming synapses is an input
    /// site regardless of its flag bits.
    pub fn is_input(&self) -> bool {
        self.synapses.is_empty()
    }

    /// Whether firing is suppressed at `now_us`
    pub fn is_refractory(&self, now_us: u32) -> bool {
        now_us < self.refractory_until_us
    }

    /// Whether the membrane has crossed threshold and the neuron may fire
    pub fn ready_to_fire(&self, now_us: u32) -> bool {
        self.v_mem >= self.threshold && !self.is_refractory(now_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_weight_decode_extremes() {
        assert_eq!(decode_weight(0), 0.0);
        assert_eq!(decode_weight(127), 2.0);
        assert_eq!(decode_weight(128), -0.0);
        assert_eq!(decode_weight(255), -2.0);
    }

    #[test]
    fn test_packed_synapse_roundtrip() {
        let synapse = Synapse::new(GlobalNeuronId::new(2, 11), 1.0);
        let packed = synapse.to_packed();
        let decoded = Synapse::from_packed(packed);
        assert_eq!(decoded.source, synapse.source);
        assert!((decoded.weight - synapse.weight).abs() < 1.0 / 63.5);
        assert_eq!(decoded.delay_us, DEFAULT_SYNAPSE_DELAY_US);
    }

    #[test]
    fn test_encode_weight_saturates() {
        assert_eq!(encode_weight(10.0), 127);
        assert_eq!(encode_weight(-10.0), 255);
    }

    #[test]
    fn test_input_is_structural() {
        let mut neuron = Neuron::new(0, 0, 1.0, 0.0);
        assert!(neuron.is_input());

        neuron
            .synapses
            .push(Synapse::new(GlobalNeuronId::new(0, 1), 0.5))
            .unwrap();
        assert!(!neuron.is_input());
    }

    #[test]
    fn test_refractory_window() {
        let mut neuron = Neuron::new(0, 0, 1.0, 0.5);
        neuron.refractory_until_us = 5000;
        assert!(neuron.is_refractory(4999));
        assert!(!neuron.is_refractory(5000));
    }

    proptest! {
        #[test]
        fn prop_weight_codes_stay_in_domain(code: u8) {
            let weight = decode_weight(code);
            prop_assert!(weight.is_finite());
            prop_assert!((-2.0..=2.0).contains(&weight));
        }

        #[test]
        fn prop_weight_code_roundtrip(code: u8) {
            // -0.0 (code 128) re-encodes as +0.0; values compare equal
            let weight = decode_weight(code);
            let reencoded = decode_weight(encode_weight(weight));
            prop_assert_eq!(weight, reencoded);
        }

        #[test]
        fn prop_packed_source_survives(raw in 0u32..0x0100_0000, code: u8) {
            let packed = (raw << 8) | code as u32;
            let synapse = Synapse::from_packed(packed);
            prop_assert_eq!(synapse.source.raw(), raw);
        }
    }
}
