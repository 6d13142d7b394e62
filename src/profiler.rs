//! Lightweight section timing for the combat loop.
//!
//! [`CombatWorld`](crate::api::CombatWorld) times every pass under the
//! `tick` section and every strategy switch under `migration`. With the
//! `profile` feature each recorded duration is also logged at debug level:
//! ```bash
//! RUST_LOG=skirmish=debug cargo run --release --features profile --example skirmish_demo
//! ```

use crate::spatial::{IndexStats, StrategyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const TICK_SECTION: &str = "tick";
pub const MIGRATION_SECTION: &str = "migration";

/// Collects timing data for named sections.
#[derive(Debug, Default)]
pub struct Profiler {
    sections: HashMap<String, SectionStats>,
    /// Section being timed (if any)
    current_section: Option<(String, Instant)>,
}

/// Statistics for a profiled section
#[derive(Debug, Default, Clone)]
pub struct SectionStats {
    pub total_time: Duration,
    pub call_count: u64,
    pub min_time: Option<Duration>,
    pub max_time: Option<Duration>,
}

impl SectionStats {
    pub fn avg_time(&self) -> Duration {
        if self.call_count == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.call_count as u32
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.total_time += elapsed;
        self.call_count += 1;
        self.min_time = Some(self.min_time.map_or(elapsed, |m| m.min(elapsed)));
        self.max_time = Some(self.max_time.map_or(elapsed, |m| m.max(elapsed)));
    }
}

/// Serializable per-section summary, in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub name: String,
    pub calls: u64,
    pub total_us: f64,
    pub avg_us: f64,
    pub min_us: f64,
    pub max_us: f64,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a named section.
    /// Call `end_section` to stop timing.
    pub fn begin_section(&mut self, name: &str) {
        self.current_section = Some((name.to_string(), Instant::now()));
    }

    /// End the current section and record its duration.
    pub fn end_section(&mut self) {
        if let Some((name, start)) = self.current_section.take() {
            let elapsed = start.elapsed();
            #[cfg(feature = "profile")]
            tracing::debug!(section = %name, elapsed_us = elapsed.as_secs_f64() * 1e6, "profiled");
            self.sections.entry(name).or_default().record(elapsed);
        }
    }

    /// Time a section using a closure.
    pub fn time_section<F, R>(&mut self, name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.begin_section(name);
        let result = f();
        self.end_section();
        result
    }

    pub fn get_section(&self, name: &str) -> Option<&SectionStats> {
        self.sections.get(name)
    }

    /// Summaries sorted by total time, descending.
    pub fn summaries(&self) -> Vec<SectionSummary> {
        let micros = |d: Duration| d.as_secs_f64() * 1e6;
        let mut out: Vec<SectionSummary> = self
            .sections
            .iter()
            .map(|(name, stats)| SectionSummary {
                name: name.clone(),
                calls: stats.call_count,
                total_us: micros(stats.total_time),
                avg_us: micros(stats.avg_time()),
                min_us: micros(stats.min_time.unwrap_or(Duration::ZERO)),
                max_us: micros(stats.max_time.unwrap_or(Duration::ZERO)),
            })
            .collect();
        out.sort_by(|a, b| b.total_us.total_cmp(&a.total_us));
        out
    }

    /// Print a summary of all profiled sections.
    pub fn print_summary(&self) {
        println!("\n=== Profiler Summary ===");
        println!(
            "{:<15} {:>8} {:>12} {:>12} {:>12} {:>12}",
            "Section", "Calls", "Total", "Avg", "Min", "Max"
        );
        println!("{}", "-".repeat(76));
        for s in self.summaries() {
            println!(
                "{:<15} {:>8} {:>10.1}us {:>10.1}us {:>10.1}us {:>10.1}us",
                s.name, s.calls, s.total_us, s.avg_us, s.min_us, s.max_us
            );
        }
        println!();
    }

    pub fn reset(&mut self) {
        self.sections.clear();
        self.current_section = None;
    }
}

/// Diagnostic snapshot of the combat core. No stability guarantee on fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub unit_count: usize,
    pub strategy: StrategyKind,
    pub exact_pairs: bool,
    pub ticks: u64,
    pub avg_tick_us: f64,
    pub active_sessions: usize,
    pub index: IndexStats,
    pub sections: Vec<SectionSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_profiler_basic() {
        let mut profiler = Profiler::new();

        profiler.time_section(TICK_SECTION, || {
            sleep(Duration::from_millis(10));
        });

        let stats = profiler.get_section(TICK_SECTION).unwrap();
        assert!(stats.total_time >= Duration::from_millis(10));
        assert_eq!(stats.call_count, 1);
    }

    #[test]
    fn test_summaries_sorted_by_total_time() {
        let mut profiler = Profiler::new();

        for _ in 0..3 {
            profiler.time_section("fast", || sleep(Duration::from_millis(1)));
            profiler.time_section("slow", || sleep(Duration::from_millis(5)));
        }

        let summaries = profiler.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name, "slow");
        assert_eq!(summaries[0].calls, 3);
        assert!(summaries[0].min_us <= summaries[0].avg_us);

        profiler.reset();
        assert!(profiler.summaries().is_empty());
    }
}
