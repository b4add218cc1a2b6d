use std::borrow::Cow;
use std::time::{Duration, Instant};

use log::{self, Level};

/// Logs how long a scope took when dropped. Skips the clock entirely when `level` is disabled.
pub struct ScopedTimer {
    label: Option<Cow<'static, str>>,
    level: Level,
    start: Option<Instant>,
}

impl ScopedTimer {
    pub fn with_level(label: impl Into<Cow<'static, str>>, level: Level) -> Self {
        if !log::log_enabled!(level) {
            return Self::disabled(level);
        }
        Self {
            label: Some(label.into()),
            level,
            start: Some(Instant::now()),
        }
    }

    /// Builds the label only when `level` is enabled.
    pub fn lazy<F>(level: Level, label_gen: F) -> Self
    where
        F: FnOnce() -> String,
    {
        if log::log_enabled!(level) {
            Self::with_level(label_gen(), level)
        } else {
            Self::disabled(level)
        }
    }

    fn disabled(level: Level) -> Self {
        Self {
            label: None,
            level,
            start: None,
        }
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.start.map(|s| s.elapsed())
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        if let (Some(label), Some(start)) = (&self.label, self.start) {
            let micros = start.elapsed().as_micros();
            log::log!(self.level, "{} took {}.{:03} ms", label, micros / 1000, micros % 1000);
        }
    }
}

pub fn measure<T, F>(label: impl Into<Cow<'static, str>>, level: Level, f: F) -> T
where
    F: FnOnce() -> T,
{
    let _timer = ScopedTimer::with_level(label, level);
    f()
}
