//! Engine statistics counters

/// Counters accumulated across simulation ticks.
///
/// Conservation invariant: `spikes_received` equals `spikes_processed +
/// spikes_dropped +` the number still queued, ignoring the immediate
/// injection path which bypasses the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Spikes accepted into or rejected from the input queue
    pub spikes_received: u32,
    /// Spikes drained from the queue and integrated
    pub spikes_processed: u32,
    /// Spikes rejected because the queue was full
    pub spikes_dropped: u32,
    /// Output spikes emitted by firing neurons
    pub spikes_generated: u32,
    /// Fire events (equals `spikes_generated` for unit spikes)
    pub neurons_fired: u32,
    /// Leak applications across all ticks
    pub membrane_updates: u32,
    /// Synaptic weight integrations performed
    pub synapse_integrations: u32,
    /// Completed calls to `step`
    pub simulation_steps: u32,
}

impl EngineStats {
    /// Mean output spike rate since simulation start.
    ///
    /// Reports 0 before the first tick; the rate is undefined at time zero.
    pub fn spike_rate_hz(&self, current_time_us: u32) -> u32 {
        if current_time_us == 0 {
            return 0;
        }
        ((self.spikes_generated as u64 * 1_000_000) / current_time_us as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spike_rate_at_time_zero() {
        let stats = EngineStats {
            spikes_generated: 42,
            ..Default::default()
        };
        assert_eq!(stats.spike_rate_hz(0), 0);
    }

    #[test]
    fn test_spike_rate() {
        let stats = EngineStats {
            spikes_generated: 10,
            ..Default::default()
        };
        // 10 spikes in 10ms -> 1000 Hz
        assert_eq!(stats.spike_rate_hz(10_000), 1000);
    }
}
