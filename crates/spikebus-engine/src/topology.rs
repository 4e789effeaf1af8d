//! Neuron table codec
//!
//! The persistent topology lives in PSRAM as a run of fixed-size
//! little-endian entries terminated by an end marker in the `local_id` field.
//! Layout per entry: state block (16 B: local_id, flags, v_mem, threshold,
//! last spike time) | synapse metadata (8 B: count, capacity, reserved) |
//! parameters (8 B: leak rate, refractory period) | reserved (8 B) | 60
//! packed 4-byte synapses (240 B).

use crate::error::{Result, TopologyError};
use crate::neuron::{Neuron, NeuronFlags, Synapse, MAX_SYNAPSES_PER_NEURON};
use crate::spike::GlobalNeuronId;
use crate::MAX_NEURONS;
use heapless::Vec;
use spikebus_hal::PsramReader;

/// Byte offset of the neuron table from the PSRAM base
pub const NEURON_TABLE_OFFSET: u32 = 0x0010_0000;

/// Size of one table entry in bytes
pub const ENTRY_SIZE: usize = 280;

/// `local_id` value terminating the table
pub const TABLE_END_MARKER: u16 = 0xFFFF;

const SYNAPSE_AREA_OFFSET: usize = 40;

/// Walk the table at `base_addr` and decode up to [`MAX_NEURONS`] entries.
///
/// Every decoded neuron is reset to runtime initial state: `global_id`
/// derived from `node_id`, refractory window cleared, spike count zeroed.
pub fn load_neurons(
    reader: &PsramReader<'_>,
    base_addr: u32,
    node_id: u8,
) -> Result<Vec<Neuron, MAX_NEURONS>> {
    let mut neurons: Vec<Neuron, MAX_NEURONS> = Vec::new();

    for position in 0..MAX_NEURONS as u16 {
        let mut entry = [0u8; ENTRY_SIZE];
        reader.read(base_addr + position as u32 * ENTRY_SIZE as u32, &mut entry)?;

        let local_id = u16::from_le_bytes([entry[0], entry[1]]);
        if local_id == TABLE_END_MARKER {
            break;
        }

        let neuron = parse_entry(&entry, position, node_id)?;
        // Capacity equals MAX_NEURONS; the loop bound keeps this in range
        let _ = neurons.push(neuron);
    }

    if neurons.is_empty() {
        return Err(TopologyError::NoNeurons);
    }

    log::info!("Loaded {} neurons from neuron table", neurons.len());
    Ok(neurons)
}

fn parse_entry(entry: &[u8; ENTRY_SIZE], position: u16, node_id: u8) -> Result<Neuron> {
    let local_id = u16::from_le_bytes([entry[0], entry[1]]);
    if local_id != position {
        log::warn!(
            "Neuron table entry {} carries local id {}",
            position,
            local_id
        );
        return Err(TopologyError::EntryIdMismatch { position, local_id });
    }

    let flags = NeuronFlags::from_bits_truncate(u16::from_le_bytes([entry[2], entry[3]]));
    let v_mem = read_f32(entry, 4);
    let threshold = read_f32(entry, 8);
    let synapse_count = u16::from_le_bytes([entry[16], entry[17]]);
    let leak_rate = read_f32(entry, 24);
    let refractory_period_us = read_u32(entry, 28);

    if synapse_count as usize > MAX_SYNAPSES_PER_NEURON {
        return Err(TopologyError::TooManySynapses {
            local_id,
            count: synapse_count,
            limit: MAX_SYNAPSES_PER_NEURON,
        });
    }
    if !v_mem.is_finite() {
        return Err(TopologyError::InvalidParameter {
            local_id,
            field: "v_mem",
        });
    }
    if !threshold.is_finite() {
        return Err(TopologyError::InvalidParameter {
            local_id,
            field: "threshold",
        });
    }
    if !leak_rate.is_finite() || !(0.0..=1.0).contains(&leak_rate) {
        return Err(TopologyError::InvalidParameter {
            local_id,
            field: "leak_rate",
        });
    }

    let mut synapses: Vec<Synapse, MAX_SYNAPSES_PER_NEURON> = Vec::new();
    for i in 0..synapse_count as usize {
        let packed = read_u32(entry, SYNAPSE_AREA_OFFSET + i * 4);
        let _ = synapses.push(Synapse::from_packed(packed));
    }

    Ok(Neuron {
        local_id,
        global_id: GlobalNeuronId::new(node_id, local_id),
        flags,
        v_mem,
        threshold,
        leak_rate,
        refractory_period_us,
        refractory_until_us: 0,
        last_spike_time_us: 0,
        spike_count: 0,
        synapses,
    })
}

/// Encode a neuron into its table entry form.
///
/// The controller-side deploy tool writes entries with this exact layout;
/// node-side it backs tests and diagnostics.
pub fn encode_entry(neuron: &Neuron) -> [u8; ENTRY_SIZE] {
    let mut entry = [0u8; ENTRY_SIZE];
    entry[0..2].copy_from_slice(&neuron.local_id.to_le_bytes());
    entry[2..4].copy_from_slice(&neuron.flags.bits().to_le_bytes());
    entry[4..8].copy_from_slice(&neuron.v_mem.to_le_bytes());
    entry[8..12].copy_from_slice(&neuron.threshold.to_le_bytes());
    entry[12..16].copy_from_slice(&neuron.last_spike_time_us.to_le_bytes());
    entry[16..18].copy_from_slice(&(neuron.synapses.len() as u16).to_le_bytes());
    entry[18..20].copy_from_slice(&(MAX_SYNAPSES_PER_NEURON as u16).to_le_bytes());
    entry[24..28].copy_from_slice(&neuron.leak_rate.to_le_bytes());
    entry[28..32].copy_from_slice(&neuron.refractory_period_us.to_le_bytes());
    for (i, synapse) in neuron.synapses.iter().enumerate() {
        let offset = SYNAPSE_AREA_OFFSET + i * 4;
        entry[offset..offset + 4].copy_from_slice(&synapse.to_packed().to_le_bytes());
    }
    entry
}

/// Entry that terminates a table
pub fn end_marker() -> [u8; ENTRY_SIZE] {
    let mut entry = [0u8; ENTRY_SIZE];
    entry[0..2].copy_from_slice(&TABLE_END_MARKER.to_le_bytes());
    entry
}

fn read_u32(entry: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        entry[offset],
        entry[offset + 1],
        entry[offset + 2],
        entry[offset + 3],
    ])
}

fn read_f32(entry: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(entry, offset))
}
