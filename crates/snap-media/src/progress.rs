//! FFmpeg progress parsing and normalized progress ticks.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Raw progress block from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in microseconds
    pub out_time_us: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Encoded output offset in seconds.
    pub fn out_time_secs(&self) -> f64 {
        self.out_time_us.max(0) as f64 / 1_000_000.0
    }
}

/// Normalized progress of one encode, on the source timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressTick {
    pub elapsed_secs: f64,
    pub total_secs: f64,
}

impl ProgressTick {
    pub fn fraction(&self) -> f64 {
        if self.total_secs <= 0.0 {
            return 0.0;
        }
        (self.elapsed_secs / self.total_secs).clamp(0.0, 1.0)
    }
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressTick>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressTick>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Filters a tick stream down to strictly increasing fractions.
#[derive(Debug, Default)]
pub struct MonotonicProgress {
    last: Option<f64>,
}

impl MonotonicProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new fraction when it exceeds every value seen so far.
    pub fn observe(&mut self, tick: ProgressTick) -> Option<f64> {
        let fraction = tick.fraction();
        match self.last {
            Some(last) if fraction <= last => None,
            _ => {
                self.last = Some(fraction);
                Some(fraction)
            }
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

/// Parse a progress line from FFmpeg's -progress output.
///
/// Returns the accumulated block when a `progress=` line closes it.
pub(crate) fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            // Older FFmpeg builds report microseconds under out_time_ms too.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_us = us;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    current.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    current.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

/// Whether a stderr line belongs to the `-progress` key/value stream.
pub(crate) fn is_progress_line(line: &str) -> bool {
    const KEYS: &[&str] = &[
        "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us", "out_time_ms",
        "out_time", "dup_frames", "drop_frames", "speed", "progress",
    ];
    line.split_once('=')
        .map(|(key, _)| KEYS.contains(&key.trim()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("out_time_us=1500000", &mut progress).is_none());
        assert_eq!(progress.out_time_us, 1_500_000);
        assert!((progress.out_time_secs() - 1.5).abs() < 1e-9);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let block = parse_progress_line("progress=continue", &mut progress).unwrap();
        assert!(!block.is_complete);

        let block = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(block.is_complete);
    }

    #[test]
    fn test_negative_out_time_is_zero() {
        let p = FfmpegProgress {
            out_time_us: -23000,
            ..Default::default()
        };
        assert_eq!(p.out_time_secs(), 0.0);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("out_time=00:00:01.000000"));
        assert!(is_progress_line("progress=end"));
        assert!(!is_progress_line("[libvpx @ 0x55] Invalid frame size"));
        assert!(!is_progress_line("Error opening input file clip.mp4."));
    }

    #[test]
    fn test_monotonic_progress_only_increases() {
        let mut reporter = MonotonicProgress::new();
        let tick = |e: f64| ProgressTick {
            elapsed_secs: e,
            total_secs: 7.0,
        };

        let logged: Vec<f64> = [2.0, 2.0, 3.5, 3.0, 3.5, 7.0, 9.0]
            .into_iter()
            .filter_map(|e| reporter.observe(tick(e)))
            .collect();

        assert_eq!(logged.len(), 3);
        assert!(logged.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(reporter.last(), Some(1.0));
    }

    #[test]
    fn test_fraction_zero_total() {
        let tick = ProgressTick {
            elapsed_secs: 1.0,
            total_secs: 0.0,
        };
        assert_eq!(tick.fraction(), 0.0);
    }
}
