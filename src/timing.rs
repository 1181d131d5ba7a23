//! Timers for ad-hoc measurements

use std::fmt;
use std::time::{Duration, Instant};

/// Running clock with a fixed display precision
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
    digits: usize,
}

impl Stopwatch {
    pub fn start(digits: usize) -> Self {
        Self {
            start: Instant::now(),
            digits,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed seconds rounded to `digits` decimals
    pub fn elapsed_secs(&self, digits: u32) -> f64 {
        let scale = 10f64.powi(digits as i32);
        (self.elapsed().as_secs_f64() * scale).round() / scale
    }

    pub fn restart(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::start(2)
    }
}

impl fmt::Display for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}s", self.digits, self.elapsed().as_secs_f64())
    }
}

/// Prints `[Timer:msg] 1.23s` to stderr when dropped
///
/// ```
/// # use utilkit::timing::Timer;
/// {
///     let _timer = Timer::new("load");
///     // work
/// }
/// ```
#[derive(Debug)]
pub struct Timer {
    msg: String,
    stopwatch: Stopwatch,
}

impl Timer {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            stopwatch: Stopwatch::start(2),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        eprintln!("[Timer:{}] {}", self.msg, self.stopwatch);
    }
}

/// Run `f`; when debug logging is on, print `⏱ 1.23s |> name` to stderr
pub fn debug_timing<T>(name: &str, f: impl FnOnce() -> T) -> T {
    let stopwatch = Stopwatch::start(2);
    let result = f();
    if log::log_enabled!(log::Level::Debug) {
        eprintln!("⏱ {} |> {}", stopwatch, name);
    }
    result
}

/// Run `f` and always print `Time: 1.23s` to stderr
pub fn simple_timing<T>(f: impl FnOnce() -> T) -> T {
    let stopwatch = Stopwatch::start(2);
    let result = f();
    eprintln!("Time: {}", stopwatch);
    result
}

/// Exit with code 1 after printing the backtrace and `msg` when `condition` is false
pub fn assert_that(condition: bool, msg: &str) {
    if !condition {
        eprintln!("{}", std::backtrace::Backtrace::force_capture());
        eprintln!("{}", msg);
        std::process::exit(1);
    }
}
