//! Command dispatch flows: status, lifecycle, memory writes, topology
//! deployment and spike injection.

use heapless::Vec as HVec;
use spikebus_engine::{topology, GlobalNeuronId, Neuron, Synapse, MAX_NEURONS};
use spikebus_hal::{
    Platform, Psram, PsramLayout, SimPlatform, SCRATCH_NODE_ID_INDEX, SCRATCH_NODE_ID_MAGIC,
};
use spikebus_node::frame::words_from_bytes;
use spikebus_node::{opcode, Frame, FrameKind, MemoryBroker, Node, NodeConfig, StreamId};

const NODE_ID: u8 = 4;
const CONTROLLER: u8 = 0;

fn test_node() -> Node<SimPlatform, MemoryBroker> {
    let _ = env_logger::builder().is_test(true).try_init();
    let layout = PsramLayout {
        cached_base: 0x1100_0000,
        uncached_base: 0x1500_0000,
        size: 4 * 1024 * 1024,
    };
    Node::new(
        NodeConfig::new(NODE_ID).unwrap(),
        SimPlatform::new(),
        MemoryBroker::new(),
        Psram::new_host(layout),
    )
    .unwrap()
}

fn ctrl(stream: StreamId, words: &[u16]) -> Frame {
    Frame::with_payload(FrameKind::Ctrl, CONTROLLER, NODE_ID, stream, words)
}

fn send(node: &mut Node<SimPlatform, MemoryBroker>, frame: Frame) -> Vec<Frame> {
    node.broker_mut().push_rx(frame);
    node.poll();
    node.broker_mut().take_sent()
}

#[test]
fn ping_pong() {
    let mut node = test_node();
    let replies = send(&mut node, ctrl(StreamId::Mgmt, &[opcode::PING]));

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].word(0), Some(opcode::PONG));
    assert_eq!(replies[0].dest, CONTROLLER);
    assert_eq!(replies[0].src, NODE_ID);
    assert_eq!(replies[0].stream, StreamId::Mgmt);
}

#[test]
fn read_status_layout() {
    let mut node = test_node();
    node.platform_mut().advance_us(5_000);

    let replies = send(&mut node, ctrl(StreamId::Mgmt, &[opcode::READ_STATUS]));
    let status = &replies[0];

    assert_eq!(status.words().len(), 11);
    assert_eq!(status.word(0), Some(opcode::READ_STATUS | opcode::ACK_FLAG));
    assert_eq!(status.word(1), Some(NODE_ID as u16));
    assert_eq!(status.u32_at(2), Some(5)); // uptime ms
    assert_eq!(status.word(9), Some(0)); // not running
    assert_eq!(status.word(10), Some(0)); // no neurons
}

#[test]
fn lifecycle_acks_and_transitions() {
    let mut node = test_node();

    let replies = send(&mut node, ctrl(StreamId::SnnControl, &[opcode::START_SNN]));
    assert_eq!(replies[0].word(0), Some(opcode::START_SNN | opcode::ACK_FLAG));
    assert!(node.engine().is_running());

    send(&mut node, ctrl(StreamId::SnnControl, &[opcode::PAUSE_SNN]));
    assert!(node.engine().is_paused());

    send(&mut node, ctrl(StreamId::SnnControl, &[opcode::RESUME_SNN]));
    assert!(!node.engine().is_paused());

    let replies = send(&mut node, ctrl(StreamId::SnnControl, &[opcode::STOP_SNN]));
    assert_eq!(replies[0].word(0), Some(opcode::STOP_SNN | opcode::ACK_FLAG));
    assert!(!node.engine().is_running());
}

fn write_memory_frame(addr: u32, data: &[u8]) -> Frame {
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

#[test]
fn write_memory_roundtrip() {
    let mut node = test_node();
    let addr = 0x1500_0040;
    let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x42];

    let replies = send(&mut node, write_memory_frame(addr, &data));
    assert_eq!(
        replies[0].word(0),
        Some(opcode::WRITE_MEMORY | opcode::ACK_FLAG)
    );
    assert_eq!(replies[0].stream, StreamId::Memory);

    let mut out = [0u8; 5];
    node.psram_mut().reader().read(addr, &mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn write_memory_truncated_frame_skipped() {
    let mut node = test_node();
    // Announces 64 bytes but carries none
    let frame = ctrl(
        StreamId::Memory,
        &[opcode::WRITE_MEMORY, 64, 0x0040, 0x1500, 0, 0],
    );
    let replies = send(&mut node, frame);
    assert!(replies.is_empty());
}

#[test]
fn deploy_topology_from_written_table() {
    let mut node = test_node();
    let table_addr = node
        .psram_mut()
        .layout()
        .uncached_addr(topology::NEURON_TABLE_OFFSET);

    // One relay neuron wired to a peer on node 1, then the end marker
    let mut neuron = Neuron::new(NODE_ID, 0, 1.0, 0.5);
    neuron
        .synapses
        .push(Synapse::new(GlobalNeuronId::new(1, 3), 0.8))
        .unwrap();
    let entry = topology::encode_entry(&neuron);

    send(&mut node, write_memory_frame(table_addr, &entry));
    send(
        &mut node,
        write_memory_frame(
            table_addr + topology::ENTRY_SIZE as u32,
            &topology::end_marker(),
        ),
    );

    let replies = send(&mut node, ctrl(StreamId::SnnConfig, &[opcode::DEPLOY_TOPOLOGY, 1]));
    assert_eq!(
        replies[0].word(0),
        Some(opcode::DEPLOY_TOPOLOGY | opcode::ACK_FLAG)
    );
    assert_eq!(replies[0].word(1), Some(1)); // status ok
    assert_eq!(replies[0].word(2), Some(1)); // one neuron

    assert_eq!(node.engine().neuron_count(), 1);
    let loaded = node.engine().neuron(0).unwrap();
    assert_eq!(loaded.global_id, GlobalNeuronId::new(NODE_ID, 0));
    assert_eq!(loaded.synapses.len(), 1);
}

#[test]
fn deploy_empty_table_reports_failure() {
    let mut node = test_node();
    let table_addr = node
        .psram_mut()
        .layout()
        .uncached_addr(topology::NEURON_TABLE_OFFSET);
    send(&mut node, write_memory_frame(table_addr, &topology::end_marker()));

    let replies = send(&mut node, ctrl(StreamId::SnnConfig, &[opcode::DEPLOY_TOPOLOGY, 0]));
    assert_eq!(replies[0].word(1), Some(0));
    assert_eq!(node.engine().neuron_count(), 0);
    assert!(!node.engine().is_running());
}

#[test]
fn inject_batch_and_snn_status() {
    let mut node = test_node();

    let mut neurons: HVec<Neuron, MAX_NEURONS> = HVec::new();
    let mut input = Neuron::new(NODE_ID, 0, 1.0, 0.0);
    input.refractory_period_us = 1_000_000;
    neurons.push(input).unwrap();
    node.engine_mut().install_neurons(neurons);
    node.engine_mut().start();

    // Two spikes aimed at our input neuron: raw id (NODE_ID << 16)
    let raw = (NODE_ID as u32) << 16;
    let batch = ctrl(
        StreamId::SnnControl,
        &[
            opcode::INJECT_SPIKE_BATCH,
            2,
            (raw & 0xFFFF) as u16,
            (raw >> 16) as u16,
            (raw & 0xFFFF) as u16,
            (raw >> 16) as u16,
        ],
    );
    let replies = send(&mut node, batch);
    assert!(replies.is_empty(), "spike batches are not acked");
    assert_eq!(node.engine().stats().spikes_received, 2);

    // Step once so the input fires
    node.platform_mut().advance_us(1000);
    node.poll();
    assert!(node.engine().stats().spikes_generated >= 1);
    // Discard the spike broadcast emitted by the step
    node.broker_mut().take_sent();

    let replies = send(&mut node, ctrl(StreamId::SnnControl, &[opcode::GET_SNN_STATUS]));
    let status = &replies[0];
    assert_eq!(status.words().len(), 8);
    assert_eq!(status.word(1), Some(1)); // running
    assert_eq!(status.word(2), Some(1)); // neuron count
    assert_eq!(status.word(3), Some(1)); // active count
    let total = status.u32_at(4).unwrap();
    assert_eq!(total, node.engine().stats().spikes_generated);
    assert!(status.u32_at(6).unwrap() > 0); // spike rate
}

#[test]
fn reset_to_bootloader_persists_identity() {
    let mut node = test_node();
    let replies = send(
        &mut node,
        ctrl(StreamId::Mgmt, &[opcode::RESET_TO_BOOTLOADER]),
    );
    assert_eq!(
        replies[0].word(0),
        Some(opcode::RESET_TO_BOOTLOADER | opcode::ACK_FLAG)
    );

    let platform = node.platform();
    assert_eq!(
        platform.scratch_read(SCRATCH_NODE_ID_INDEX).unwrap(),
        SCRATCH_NODE_ID_MAGIC | NODE_ID as u32
    );
    assert!(platform.reset_requested);
    // The 100ms settle delay ran before reset
    assert!(platform.uptime_ms() >= 100);
}

#[test]
fn unknown_opcode_is_ignored() {
    let mut node = test_node();
    let replies = send(&mut node, ctrl(StreamId::Mgmt, &[0x7777]));
    assert!(replies.is_empty());
}

#[test]
fn empty_ctrl_frame_is_skipped() {
    let mut node = test_node();
    let frame = Frame::new(FrameKind::Ctrl, CONTROLLER, NODE_ID, StreamId::Mgmt);
    let replies = send(&mut node, frame);
    assert!(replies.is_empty());
}
