use std::sync::Mutex;
use std::time::{Duration, Instant};
use log::debug;

/// Running timing statistics for one kind of operation
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub name: String,
    pub total_time: Duration,
    pub count: u32,
}

impl TimingStats {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_time: Duration::from_secs(0),
            count: 0,
        }
    }

    pub fn add_measurement(&mut self, duration: Duration) {
        self.total_time += duration;
        self.count += 1;

        debug!("{} - Current: {:.2}ms, Avg: {:.2}ms, Count: {}",
            self.name,
            duration.as_secs_f64() * 1000.0,
            self.average_ms(),
            self.count
        );
    }

    pub fn average_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_time.as_secs_f64() * 1000.0) / self.count as f64
        }
    }
}

/// Records the time between its creation and drop into a shared `TimingStats`.
/// Safe to hold across an await; the stats are only locked on drop.
pub struct ScopedTimer<'a> {
    start: Instant,
    stats: &'a Mutex<TimingStats>,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(stats: &'a Mutex<TimingStats>) -> Self {
        Self {
            start: Instant::now(),
            stats,
        }
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        if let Ok(mut stats) = self.stats.lock() {
            stats.add_measurement(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_of_measurements() {
        let mut stats = TimingStats::new("round trip");
        assert_eq!(stats.average_ms(), 0.0);
        stats.add_measurement(Duration::from_millis(10));
        stats.add_measurement(Duration::from_millis(30));
        assert_eq!(stats.count, 2);
        assert!((stats.average_ms() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_scoped_timer_records_on_drop() {
        let stats = Mutex::new(TimingStats::new("scoped"));
        {
            let _timer = ScopedTimer::new(&stats);
            assert_eq!(stats.lock().unwrap().count, 0);
        }
        assert_eq!(stats.lock().unwrap().count, 1);
    }
}
