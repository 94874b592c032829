use std::time::{Duration, Instant, SystemTime};

/// Measures how long a dependency call took. Starts running on
/// construction.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Instant,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    duration: Option<Duration>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            start_time: SystemTime::now(),
            end_time: None,
            duration: None,
        }
    }

    /// Restarts the timer, forgetting any previous stop.
    pub fn start(&mut self) {
        *self = Self::new();
    }

    pub fn stop(&mut self) {
        self.duration = Some(self.started.elapsed());
        self.end_time = Some(SystemTime::now());
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// `None` while running.
    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// `None` while running.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
