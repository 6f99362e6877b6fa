use std::time::Instant;

/// Logs the elapsed wall-clock time of a scope on drop.
pub struct ScopedTimer {
	label: String,
	start: Instant,
}

impl ScopedTimer {
	pub fn new(label: &str) -> ScopedTimer {
		log::info!("start: {label}");
		ScopedTimer {
			label: label.to_string(),
			start: Instant::now(),
		}
	}
}

impl Drop for ScopedTimer {
	fn drop(&mut self) {
		let elapsed = self.start.elapsed();
		if elapsed.as_millis() < 1000 {
			log::info!("done: {} ({:.2}ms)", self.label, elapsed.as_secs_f64() * 1000.0);
		} else {
			log::info!("done: {} ({:.2}s)", self.label, elapsed.as_secs_f64());
		}
	}
}
