//! XOR network scenarios exercised through the full PSRAM topology path
//!
//! Five neurons: inputs 0 and 1, an OR-relay at 2, an AND-detector at 3
//! wired inhibitory onto the output at 4. Exactly one active input drives
//! the output above threshold via the relay; two active inputs trip the
//! AND-detector whose inhibition dominates.

use heapless::Vec as HVec;
use spikebus_engine::{
    topology, GlobalNeuronId, LifEngine, Neuron, NeuronFlags, Spike, Synapse, MAX_NEURONS,
};
use spikebus_hal::{Psram, PsramLayout};

const NODE_ID: u8 = 1;

fn synapse(local: u16, weight: f32) -> Synapse {
    Synapse::new(GlobalNeuronId::new(NODE_ID, local), weight)
}

fn xor_neurons() -> HVec<Neuron, MAX_NEURONS> {
    let mut neurons: HVec<Neuron, MAX_NEURONS> = HVec::new();

    for local in 0..2 {
        let mut input = Neuron::new(NODE_ID, local, 1.0, 0.0);
        input.flags |= NeuronFlags::INPUT;
        input.refractory_period_us = 2000;
        neurons.push(input).unwrap();
    }

    // OR relay: either input alone drives it over threshold
    let mut relay = Neuron::new(NODE_ID, 2, 1.0, 0.5);
    relay.refractory_period_us = 2000;
    relay.synapses.push(synapse(0, 1.0)).unwrap();
    relay.synapses.push(synapse(1, 1.0)).unwrap();
    neurons.push(relay).unwrap();

    // AND detector: fires only when both inputs spike in one tick
    let mut detector = Neuron::new(NODE_ID, 3, 1.0, 0.5);
    detector.flags |= NeuronFlags::INHIBITORY;
    detector.refractory_period_us = 2000;
    detector.synapses.push(synapse(0, 0.6)).unwrap();
    detector.synapses.push(synapse(1, 0.6)).unwrap();
    neurons.push(detector).unwrap();

    // Output: two relay spikes to fire, one detector spike to silence
    let mut output = Neuron::new(NODE_ID, 4, 1.0, 1.0);
    output.flags |= NeuronFlags::OUTPUT;
    output.refractory_period_us = 20_000;
    output.synapses.push(synapse(2, 0.5)).unwrap();
    output.synapses.push(synapse(3, -2.0)).unwrap();
    neurons.push(output).unwrap();

    neurons
}

/// Load the XOR population through a PSRAM-resident neuron table
fn xor_engine() -> LifEngine {
    let layout = PsramLayout {
        cached_base: 0x1100_0000,
        uncached_base: 0x1500_0000,
        size: 2 * 1024 * 1024,
    };
    let mut psram = Psram::new_host(layout);
    let base = layout.uncached_addr(topology::NEURON_TABLE_OFFSET);

    {
        let mut writer = psram.writer();
        for (i, neuron) in xor_neurons().iter().enumerate() {
            let entry = topology::encode_entry(neuron);
            writer
                .write(base + (i * topology::ENTRY_SIZE) as u32, &entry)
                .unwrap();
        }
        let terminator = topology::end_marker();
        let offset = (xor_neurons().len() * topology::ENTRY_SIZE) as u32;
        writer.write(base + offset, &terminator).unwrap();
    }

    let mut engine = LifEngine::new(NODE_ID);
    let loaded = engine.load_topology(&psram.reader(), base).unwrap();
    assert_eq!(loaded, 5);
    engine.start();
    engine
}

fn run_and_collect(engine: &mut LifEngine, ticks: usize) -> Vec<Spike> {
    let mut collected = Vec::new();
    for _ in 0..ticks {
        engine.step();
        collected.extend_from_slice(engine.output_spikes());
    }
    collected
}

fn output_spikes_from(spikes: &[Spike], local_id: u16) -> usize {
    spikes
        .iter()
        .filter(|s| s.neuron_id.local_id() == local_id)
        .count()
}

#[test]
fn xor_both_inputs_quiet() {
    let mut engine = xor_engine();
    let spikes = run_and_collect(&mut engine, 20);
    assert_eq!(output_spikes_from(&spikes, 4), 0);
}

#[test]
fn xor_single_input_fires_output_once() {
    let mut engine = xor_engine();
    engine.inject_immediate(0, 1.0);

    let spikes = run_and_collect(&mut engine, 5);
    assert_eq!(output_spikes_from(&spikes, 4), 1);

    let out = spikes
        .iter()
        .find(|s| s.neuron_id.local_id() == 4)
        .unwrap();
    assert_eq!((out.neuron_id.raw() >> 16) as u8, NODE_ID);
}

#[test]
fn xor_both_inputs_inhibited() {
    let mut engine = xor_engine();
    engine.inject_immediate(0, 1.0);
    engine.inject_immediate(1, 1.0);

    let spikes = run_and_collect(&mut engine, 10);
    assert_eq!(output_spikes_from(&spikes, 4), 0);
}

#[test]
fn xor_other_single_input_also_fires_output() {
    let mut engine = xor_engine();
    engine.inject_immediate(1, 1.0);

    let spikes = run_and_collect(&mut engine, 5);
    assert_eq!(output_spikes_from(&spikes, 4), 1);
}
