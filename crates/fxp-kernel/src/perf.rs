//! Optional timing counters for the fixpoint driver.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug)]
pub struct PerfTracker {
    started: Instant,
    blocks: IndexMap<String, BlockStat>,
    fixpoints: u64,
    rounds: u64,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BlockStat {
    pub calls: u64,
    pub total_ns: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerfReport {
    pub uptime_ns: u64,
    pub fixpoints: u64,
    pub rounds: u64,
    pub blocks: IndexMap<String, BlockStat>,
}

impl PerfTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            blocks: IndexMap::new(),
            fixpoints: 0,
            rounds: 0,
        }
    }

    pub fn record_block(&mut self, id: &str, elapsed: Duration) {
        let stat = self.blocks.entry(id.to_owned()).or_default();
        stat.calls += 1;
        stat.total_ns += elapsed.as_nanos() as u64;
    }

    pub fn record_round(&mut self) {
        self.rounds += 1;
    }

    pub fn record_fixpoint(&mut self) {
        self.fixpoints += 1;
    }

    pub fn report(&self) -> PerfReport {
        PerfReport {
            uptime_ns: self.started.elapsed().as_nanos() as u64,
            fixpoints: self.fixpoints,
            rounds: self.rounds,
            blocks: self.blocks.clone(),
        }
    }
}

impl Default for PerfTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_accumulates_block_calls() {
        let mut perf = PerfTracker::new();
        perf.record_block("b1", Duration::from_micros(5));
        perf.record_block("b1", Duration::from_micros(3));
        perf.record_round();
        perf.record_fixpoint();
        let report = perf.report();
        assert_eq!(report.blocks["b1"].calls, 2);
        assert!(report.blocks["b1"].total_ns >= 8_000);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.fixpoints, 1);
    }
}
