//! The Leaky Integrate-and-Fire engine
//!
//! One engine owns the node's neuron population and advances it one fixed
//! timestep per call to [`LifEngine::step`]. The engine never blocks and
//! performs no allocation after construction; a tick is bounded by
//! `MAX_SPIKES_PER_TIMESTEP x neurons x synapses` integrations plus one
//! leak pass.
//!
//! Spikes enter through [`LifEngine::inject`] (queued for the next tick) or
//! [`LifEngine::inject_immediate`] (charges a membrane in place). Fired
//! spikes land in the per-tick output buffer for broadcast and are also fed
//! back into the local queue, which is how activity propagates one synaptic
//! layer per tick within the node; the run loop's self-broadcast filter
//! exists because this loopback already happens here.

use crate::error::Result;
use crate::neuron::Neuron;
use crate::queue::SpikeQueue;
use crate::spike::Spike;
use crate::stats::EngineStats;
use crate::topology;
use crate::{MAX_NEURONS, MAX_SPIKES_PER_TIMESTEP, OUTPUT_BUFFER_CAPACITY};
use heapless::Vec;
use spikebus_hal::PsramReader;

/// Default simulation timestep (1 ms)
pub const DEFAULT_TIMESTEP_US: u32 = 1000;

/// LIF simulation engine for one compute node
#[derive(Debug)]
pub struct LifEngine {
    node_id: u8,
    running: bool,
    paused: bool,
    stats_reset_pending: bool,
    current_time_us: u32,
    timestep_us: u32,
    neurons: Vec<Neuron, MAX_NEURONS>,
    queue: SpikeQueue,
    output: Vec<Spike, OUTPUT_BUFFER_CAPACITY>,
    stats: EngineStats,
}

impl LifEngine {
    /// Create an idle engine for `node_id`
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            running: false,
            paused: false,
            stats_reset_pending: false,
            current_time_us: 0,
            timestep_us: DEFAULT_TIMESTEP_US,
            neurons: Vec::new(),
            queue: SpikeQueue::new(),
            output: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    /// Override the simulation timestep
    pub fn with_timestep_us(mut self, timestep_us: u32) -> Self {
        self.timestep_us = timestep_us;
        self
    }

    /// Node identity baked into emitted global ids
    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Whether the simulation is started
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the simulation is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current simulation time in microseconds
    pub fn current_time_us(&self) -> u32 {
        self.current_time_us
    }

    /// Simulation timestep in microseconds
    pub fn timestep_us(&self) -> u32 {
        self.timestep_us
    }

    /// Number of loaded neurons
    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    /// Number of neurons carrying the ACTIVE flag
    pub fn active_neuron_count(&self) -> usize {
        self.neurons
            .iter()
            .filter(|n| n.flags.contains(crate::neuron::NeuronFlags::ACTIVE))
            .count()
    }

    /// The loaded neuron population
    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    /// One neuron by local index
    pub fn neuron(&self, local_id: u16) -> Option<&Neuron> {
        self.neurons.get(local_id as usize)
    }

    /// Output spikes of the most recent tick.
    ///
    /// The buffer is reset at the start of every tick; consumers must drain
    /// it before the next call to [`step`](Self::step).
    pub fn output_spikes(&self) -> &[Spike] {
        &self.output
    }

    /// Spikes waiting in the input queue
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Accumulated counters
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Replace the population from the PSRAM neuron table.
    ///
    /// Stops the simulation first. On failure the engine is left inactive
    /// with no neurons loaded.
    pub fn load_topology(&mut self, reader: &PsramReader<'_>, base_addr: u32) -> Result<usize> {
        self.running = false;
        self.paused = false;
        match topology::load_neurons(reader, base_addr, self.node_id) {
            Ok(neurons) => {
                let count = neurons.len();
                self.neurons = neurons;
                self.queue.clear();
                self.output.clear();
                Ok(count)
            }
            Err(err) => {
                self.neurons.clear();
                log::warn!("Topology load failed: {}", err);
                Err(err)
            }
        }
    }

    /// Install a population directly; host-side construction path for tests
    /// and tooling.
    pub fn install_neurons(&mut self, neurons: Vec<Neuron, MAX_NEURONS>) {
        self.running = false;
        self.paused = false;
        self.neurons = neurons;
        self.queue.clear();
        self.output.clear();
    }

    /// Start or restart the simulation.
    ///
    /// Counters reset on the first start after a stop; a pause/resume cycle
    /// keeps them.
    pub fn start(&mut self) {
        if self.stats_reset_pending {
            self.stats = EngineStats::default();
            self.stats_reset_pending = false;
        }
        self.running = true;
        self.paused = false;
    }

    /// Stop the simulation; the next start resets counters
    pub fn stop(&mut self) {
        self.running = false;
        self.paused = false;
        self.stats_reset_pending = true;
    }

    /// Suspend stepping without losing state
    pub fn pause(&mut self) {
        if self.running {
            self.paused = true;
        }
    }

    /// Resume a paused simulation
    pub fn resume(&mut self) {
        if self.running {
            self.paused = false;
        }
    }

    /// Drop the population and all accumulated state
    pub fn reset(&mut self) {
        self.running = false;
        self.paused = false;
        self.stats_reset_pending = false;
        self.current_time_us = 0;
        self.neurons.clear();
        self.queue.clear();
        self.output.clear();
        self.stats = EngineStats::default();
    }

    /// Queue a spike for integration on the next tick.
    ///
    /// Returns `false` and counts a drop when the queue is full.
    pub fn inject(&mut self, spike: Spike) -> bool {
        self.enqueue(spike)
    }

    /// Charge a local membrane right now, firing in place on a threshold
    /// crossing. Bypasses the queue and its accounting.
    pub fn inject_immediate(&mut self, local_id: u16, value: f32) -> bool {
        let index = local_id as usize;
        if index >= self.neurons.len() {
            return false;
        }
        self.neurons[index].v_mem += value;
        if self.neurons[index].ready_to_fire(self.current_time_us) {
            self.fire_neuron(index);
        }
        true
    }

    /// Advance the simulation by one timestep.
    ///
    /// Order within a tick: clock advance, output reset, queued-spike
    /// integration (bounded), then the leak and threshold pass over all
    /// neurons in insertion order.
    pub fn step(&mut self) {
        if !self.running || self.paused {
            return;
        }

        self.current_time_us = self.current_time_us.wrapping_add(self.timestep_us);
        self.stats.simulation_steps += 1;
        self.output.clear();

        // Snapshot the backlog: spikes enqueued by fires during this tick
        // belong to the next one.
        let budget = self.queue.len().min(MAX_SPIKES_PER_TIMESTEP);
        for _ in 0..budget {
            if let Some(spike) = self.queue.pop() {
                self.process_spike(&spike);
                self.stats.spikes_processed += 1;
            }
        }

        for index in 0..self.neurons.len() {
            let decayed = {
                let neuron = &mut self.neurons[index];
                if neuron.v_mem > 0.0 && neuron.leak_rate > 0.0 {
                    neuron.v_mem *= neuron.leak_rate;
                    true
                } else {
                    false
                }
            };
            if decayed {
                self.stats.membrane_updates += 1;
            }
            if self.neurons[index].ready_to_fire(self.current_time_us) {
                self.fire_neuron(index);
            }
        }
    }

    fn process_spike(&mut self, spike: &Spike) {
        let source_node = spike.neuron_id.node_id();
        let source_local = spike.neuron_id.local_id() as usize;

        // Direct input stimulation: a spike carrying the id of one of our
        // own input sites charges that membrane; propagation continues below.
        if source_node == self.node_id
            && source_local < self.neurons.len()
            && self.neurons[source_local].is_input()
        {
            self.neurons[source_local].v_mem += spike.value;
            if self.neurons[source_local].ready_to_fire(self.current_time_us) {
                self.fire_neuron(source_local);
            }
        }

        // Synaptic integration: every target integrates each matching
        // synapse and fires at most once per spike.
        for target in 0..self.neurons.len() {
            let synapse_count = self.neurons[target].synapses.len();
            for i in 0..synapse_count {
                let synapse = self.neurons[target].synapses[i];
                if synapse.source == spike.neuron_id {
                    self.neurons[target].v_mem += synapse.weight * spike.value;
                    self.stats.synapse_integrations += 1;
                    if self.neurons[target].ready_to_fire(self.current_time_us) {
                        self.fire_neuron(target);
                        break;
                    }
                }
            }
        }
    }

    fn fire_neuron(&mut self, index: usize) {
        let now = self.current_time_us;
        let spike = {
            let neuron = &mut self.neurons[index];
            neuron.last_spike_time_us = now;
            neuron.refractory_until_us = now.wrapping_add(neuron.refractory_period_us);
            neuron.v_mem = 0.0;
            neuron.spike_count += 1;
            Spike::unit(neuron.global_id, now)
        };

        if self.output.push(spike).is_err() {
            log::warn!(
                "Output buffer full; spike from neuron {} not recorded",
                index
            );
        }
        self.stats.spikes_generated += 1;
        self.stats.neurons_fired += 1;

        // Feed the spike back for local synaptic consumption next tick
        self.enqueue(spike);
    }

    fn enqueue(&mut self, spike: Spike) -> bool {
        self.stats.spikes_received += 1;
        if self.queue.push(spike) {
            true
        } else {
            self.stats.spikes_dropped += 1;
            false
        }
    }
}
