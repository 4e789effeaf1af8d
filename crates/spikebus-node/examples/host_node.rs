//! Run one compute node entirely on the host.
//!
//! Deploys a three-neuron chain through the real control path (memory
//! writes + topology deploy), starts the simulation, injects a spike and
//! watches the output broadcasts.

use spikebus_engine::{topology, GlobalNeuronId, Neuron, Synapse};
use spikebus_hal::{Psram, PsramLayout, SimPlatform};
use spikebus_node::frame::words_from_bytes;
use spikebus_node::{opcode, Frame, FrameKind, MemoryBroker, Node, NodeConfig, StreamId};

const NODE_ID: u8 = 1;

fn ctrl(stream: StreamId, words: &[u16]) -> Frame {
    Frame::with_payload(FrameKind::Ctrl, 0, NODE_ID, stream, words)
}

fn write_memory(addr: u32, data: &[u8]) -> Frame {
    let mut words = vec![
        opcode::WRITE_MEMORY,
        data.len() as u16,
        (addr & 0xFFFF) as u16,
        (addr >> 16) as u16,
        0,
        0,
    ];
    words.extend_from_slice(&words_from_bytes(data));
    ctrl(StreamId::Memory, &words)
}

fn main() {
    env_logger::init();

    let layout = PsramLayout {
        cached_base: 0x1100_0000,
        uncached_base: 0x1500_0000,
        size: 4 * 1024 * 1024,
    };
    let mut node = Node::new(
        NodeConfig::new(NODE_ID).unwrap(),
        SimPlatform::new(),
        MemoryBroker::new(),
        Psram::new_host(layout),
    )
    .expect("valid configuration");

    // Input -> relay -> output chain
    let mut input = Neuron::new(NODE_ID, 0, 1.0, 0.0);
    input.refractory_period_us = 10_000;

    let mut relay = Neuron::new(NODE_ID, 1, 1.0, 0.5);
    relay.refractory_period_us = 5_000;
    relay
        .synapses
        .push(Synapse::new(GlobalNeuronId::new(NODE_ID, 0), 1.0))
        .unwrap();

    let mut output = Neuron::new(NODE_ID, 2, 1.0, 0.5);
    output.refractory_period_us = 5_000;
    output
        .synapses
        .push(Synapse::new(GlobalNeuronId::new(NODE_ID, 1), 1.0))
        .unwrap();

    let table = layout.uncached_addr(topology::NEURON_TABLE_OFFSET);
    for (i, neuron) in [input, relay, output].iter().enumerate() {
        let frame = write_memory(
            table + (i * topology::ENTRY_SIZE) as u32,
            &topology::encode_entry(neuron),
        );
        node.broker_mut().push_rx(frame);
        node.poll();
    }
    node.broker_mut().push_rx(write_memory(
        table + (3 * topology::ENTRY_SIZE) as u32,
        &topology::end_marker(),
    ));
    node.poll();

    node.broker_mut()
        .push_rx(ctrl(StreamId::SnnConfig, &[opcode::DEPLOY_TOPOLOGY, 3]));
    node.poll();
    node.broker_mut()
        .push_rx(ctrl(StreamId::SnnControl, &[opcode::START_SNN]));
    node.poll();
    node.broker_mut().take_sent();

    println!(
        "Node {} running with {} neurons",
        NODE_ID,
        node.engine().neuron_count()
    );

    node.engine_mut().inject_immediate(0, 1.0);
    for tick in 1..=6u32 {
        node.platform_mut().advance_us(1000);
        node.poll();
        for frame in node.broker_mut().take_sent() {
            if frame.kind == FrameKind::Broadcast {
                let id = frame.u32_at(0).unwrap_or(0);
                println!(
                    "tick {}: spike from neuron {} (node {})",
                    tick,
                    id & 0xFFFF,
                    (id >> 16) & 0xFF
                );
            }
        }
    }

    let stats = node.engine().stats();
    println!(
        "{} steps, {} spikes generated, {} integrations",
        stats.simulation_steps, stats.spikes_generated, stats.synapse_integrations
    );
}
