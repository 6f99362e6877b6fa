use std::time::{Duration, Instant};

/// Accumulates per-stage wall-clock time over any number of rendered tiles.
#[derive(Default)]
pub struct PerfCounter {
	stages: Vec<(&'static str, Duration, u64)>,
}

impl PerfCounter {
	pub fn new() -> PerfCounter {
		PerfCounter::default()
	}

	pub fn measure<R>(&mut self, stage: &'static str, f: impl FnOnce() -> R) -> R {
		let start = Instant::now();
		let result = f();
		self.record(stage, start.elapsed());
		result
	}

	pub fn record(&mut self, stage: &'static str, elapsed: Duration) {
		for entry in &mut self.stages {
			if entry.0 == stage {
				entry.1 += elapsed;
				entry.2 += 1;
				return;
			}
		}
		self.stages.push((stage, elapsed, 1));
	}

	pub fn report(&self) {
		for (stage, total, count) in &self.stages {
			log::info!(
				"{stage:>10}: {:>10.3}ms total / {count} calls / {:>9.3}ms avg",
				total.as_secs_f64() * 1000.0,
				total.as_secs_f64() * 1000.0 / *count as f64
			);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accumulates_per_stage() {
		let mut pc = PerfCounter::new();
		let value = pc.measure("fetch", || 42);
		assert_eq!(value, 42);
		pc.record("fetch", Duration::from_millis(2));
		pc.record("encode", Duration::from_millis(1));

		assert_eq!(pc.stages.len(), 2);
		assert_eq!(pc.stages[0].0, "fetch");
		assert_eq!(pc.stages[0].2, 2);
		assert_eq!(pc.stages[1].2, 1);
	}
}
