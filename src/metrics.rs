//! Frame statistics collected from the detection probe
//!
//! [`FrameStats`] is the default user data handed to the buffer callback: it
//! counts frames leaving the accelerator and keeps a rolling FPS estimate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

const FPS_WINDOW: usize = 60;

/// FPS calculator using a rolling window of frame arrival times
struct FpsWindow {
    frame_times: VecDeque<Instant>,
    window_size: usize,
}

impl FpsWindow {
    fn new(window_size: usize) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    fn push(&mut self, at: Instant) {
        self.frame_times.push_back(at);
        if self.frame_times.len() > self.window_size {
            self.frame_times.pop_front();
        }
    }

    fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frame_times.front(), self.frame_times.back()) else {
            return 0.0;
        };
        let span = last.duration_since(*first).as_secs_f64();
        if self.frame_times.len() < 2 || span <= 0.0 {
            return 0.0;
        }
        (self.frame_times.len() - 1) as f64 / span
    }
}

/// Per-pipeline frame counter with periodic summaries
pub struct FrameStats {
    frames: AtomicU64,
    window: Mutex<FpsWindow>,
    report_interval: Duration,
    last_report: Mutex<Instant>,
}

impl FrameStats {
    /// `report_interval` of zero disables the periodic summary
    pub fn new(report_interval: Duration) -> Self {
        Self {
            frames: AtomicU64::new(0),
            window: Mutex::new(FpsWindow::new(FPS_WINDOW)),
            report_interval,
            last_report: Mutex::new(Instant::now()),
        }
    }

    /// Count one frame and return the running total
    pub fn record_frame(&self) -> u64 {
        self.record_frame_at(Instant::now())
    }

    fn record_frame_at(&self, now: Instant) -> u64 {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut window) = self.window.lock() {
            window.push(now);
        }

        if !self.report_interval.is_zero() {
            if let Ok(mut last_report) = self.last_report.lock() {
                if now.saturating_duration_since(*last_report) >= self.report_interval {
                    *last_report = now;
                    info!("{}", self.format_summary());
                }
            }
        }

        count
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn fps(&self) -> f64 {
        self.window.lock().map(|w| w.fps()).unwrap_or(0.0)
    }

    pub fn format_summary(&self) -> String {
        format!("Frames: {} | FPS: {:.1}", self.frame_count(), self.fps())
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_counting() {
        let stats = FrameStats::default();
        assert_eq!(stats.record_frame(), 1);
        assert_eq!(stats.record_frame(), 2);
        assert_eq!(stats.frame_count(), 2);
    }

    #[test]
    fn test_fps_from_window() {
        let stats = FrameStats::default();
        let start = Instant::now();

        // 31 frames spaced 1/30 s apart
        for i in 0..31u32 {
            stats.record_frame_at(start + Duration::from_millis(100) * i / 3);
        }

        let fps = stats.fps();
        assert!(fps > 29.0 && fps < 31.0, "fps was {fps}");
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = FpsWindow::new(3);
        let start = Instant::now();
        for i in 0..10 {
            window.push(start + Duration::from_secs(i));
        }
        assert_eq!(window.frame_times.len(), 3);
        assert!((window.fps() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_frame_has_no_fps() {
        let stats = FrameStats::new(Duration::from_secs(1));
        stats.record_frame();
        assert_eq!(stats.fps(), 0.0);
        assert!(stats.format_summary().starts_with("Frames: 1"));
    }
}
