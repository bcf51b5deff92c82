use crate::timebase::{AtomicTicks, Ticks};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub const CHART_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChartSummary {
    pub count: usize,
    pub mean: f32,
    pub max: f32,
}

/// Fixed-size ring of timing samples with one writer and one draining reader.
///
/// The writer never waits for the reader. When it gets more than `CHART_LEN`
/// samples ahead, the oldest unread samples are lost and the next `read`
/// resumes at the oldest sample still held.
pub struct Chart {
    values: Box<[AtomicU32]>,
    written: AtomicU64,
    read: AtomicU64,
    start: AtomicTicks,
}

impl Chart {
    pub fn new() -> Self {
        Self {
            values: (0..CHART_LEN).map(|_| AtomicU32::new(0)).collect(),
            written: AtomicU64::new(0),
            read: AtomicU64::new(0),
            start: AtomicTicks::new(0.0),
        }
    }

    /// Resets both cursors and zeroes the samples. Only call while neither side is active.
    pub fn clear(&self, now: Ticks) {
        for value in self.values.iter() {
            value.store(0, Ordering::Relaxed);
        }
        self.written.store(0, Ordering::Release);
        self.read.store(0, Ordering::Release);
        self.start.store(now);
    }

    pub fn add_value(&self, value: f32) {
        let written = self.written.load(Ordering::Relaxed);
        let slot = (written % CHART_LEN as u64) as usize;
        self.values[slot].store(value.to_bits(), Ordering::Relaxed);
        self.written.store(written + 1, Ordering::Release);
    }

    /// Records the time since the previous delta (or since `clear`).
    pub fn add_delta(&self, now: Ticks) {
        let previous = self.start.load();
        self.add_value((now - previous) as f32);
        self.start.store(now);
    }

    /// Drains one unread sample as `(position in ring, value)`.
    pub fn read(&self) -> Option<(usize, f32)> {
        let written = self.written.load(Ordering::Acquire);
        let mut read = self.read.load(Ordering::Relaxed);

        if written.saturating_sub(read) > CHART_LEN as u64 {
            read = written - CHART_LEN as u64;
        }
        if read >= written {
            return None;
        }

        let index = (read % CHART_LEN as u64) as usize;
        let value = f32::from_bits(self.values[index].load(Ordering::Relaxed));
        self.read.store(read + 1, Ordering::Release);
        Some((index, value))
    }

    /// Drains every unread sample into count, mean and max.
    pub fn drain_summary(&self) -> Option<ChartSummary> {
        let mut summary = ChartSummary::default();
        let mut total = 0.0f64;
        while let Some((_, value)) = self.read() {
            summary.count += 1;
            summary.max = summary.max.max(value);
            total += value as f64;
        }
        if summary.count == 0 {
            return None;
        }
        summary.mean = (total / summary.count as f64) as f32;
        Some(summary)
    }

    pub fn unread(&self) -> usize {
        let written = self.written.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        written.saturating_sub(read).min(CHART_LEN as u64) as usize
    }
}

impl Default for Chart {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(chart: &Chart) -> Vec<f32> {
        std::iter::from_fn(|| chart.read().map(|(_, v)| v)).collect()
    }

    #[test]
    fn drains_samples_in_write_order() {
        let chart = Chart::new();
        for i in 0..100 {
            chart.add_value(i as f32);
        }
        let values = drain(&chart);
        assert_eq!(values.len(), 100);
        assert!(values.iter().enumerate().all(|(i, v)| *v == i as f32));
        assert!(chart.read().is_none());
    }

    #[test]
    fn full_ring_is_readable() {
        let chart = Chart::new();
        for i in 0..CHART_LEN {
            chart.add_value(i as f32);
        }
        assert_eq!(chart.unread(), CHART_LEN);
        assert_eq!(drain(&chart).len(), CHART_LEN);
    }

    #[test]
    fn overrun_keeps_most_recent_samples() {
        let chart = Chart::new();
        let total = CHART_LEN + 300;
        for i in 0..total {
            chart.add_value(i as f32);
        }
        let values = drain(&chart);
        assert_eq!(values.len(), CHART_LEN);
        assert_eq!(values[0], 300.0);
        assert_eq!(*values.last().unwrap(), (total - 1) as f32);
    }

    #[test]
    fn reader_resumes_after_partial_drain() {
        let chart = Chart::new();
        chart.add_value(1.0);
        chart.add_value(2.0);
        assert_eq!(chart.read(), Some((0, 1.0)));
        chart.add_value(3.0);
        assert_eq!(drain(&chart), vec![2.0, 3.0]);
    }

    #[test]
    fn deltas_measure_from_clear() {
        let chart = Chart::new();
        chart.clear(10.0);
        chart.add_delta(14.0);
        chart.add_delta(20.0);
        assert_eq!(drain(&chart), vec![4.0, 6.0]);
    }

    #[test]
    fn summary_drains_what_is_unread() {
        let chart = Chart::new();
        assert_eq!(chart.drain_summary(), None);
        for value in [4.0, 4.0, 10.0, 2.0] {
            chart.add_value(value);
        }
        let summary = chart.drain_summary().unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.mean, 5.0);
        assert_eq!(summary.max, 10.0);
        assert_eq!(chart.unread(), 0);
    }
}
