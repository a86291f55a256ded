//! Master-bus metering. The renderer pushes the post-gain mono master into a
//! lock-free ring; the control side drains it into a sliding window.

use mixdesk_shared::gain_to_db;
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterLevels {
    pub peak: f32,
    pub rms: f32,
    pub peak_dbfs: f32,
    pub rms_dbfs: f32,
}

/// Creates the producer handed to the renderer and its analyser. The ring
/// holds a few windows so a slow reader only loses the oldest samples.
pub fn analyser_channel(window: usize) -> (HeapProd<f32>, MasterAnalyser) {
    let window = window.max(1);
    let (producer, consumer) = HeapRb::<f32>::new(window * 4).split();
    (producer, MasterAnalyser::new(consumer, window))
}

pub struct MasterAnalyser {
    consumer: HeapCons<f32>,
    window: Vec<f32>,
    /// Next write index into `window`.
    cursor: usize,
    filled: usize,
    chunk: Vec<f32>,
}

impl MasterAnalyser {
    fn new(consumer: HeapCons<f32>, window: usize) -> Self {
        Self { consumer, window: vec![0.0; window], cursor: 0, filled: 0, chunk: vec![0.0; window] }
    }

    /// Drains everything the renderer produced since the last call.
    /// Returns the number of samples taken.
    pub fn update(&mut self) -> usize {
        let mut taken = 0;
        loop {
            let n = self.consumer.pop_slice(&mut self.chunk);
            if n == 0 {
                break;
            }
            for i in 0..n {
                self.window[self.cursor] = self.chunk[i];
                self.cursor = (self.cursor + 1) % self.window.len();
            }
            self.filled = (self.filled + n).min(self.window.len());
            taken += n;
        }
        taken
    }

    pub fn levels(&self) -> MeterLevels {
        if self.filled == 0 {
            return MeterLevels { peak: 0.0, rms: 0.0, peak_dbfs: gain_to_db(0.0), rms_dbfs: gain_to_db(0.0) };
        }
        let (peak, sum_sq) = self
            .recent()
            .fold((0.0f32, 0.0f64), |(peak, sum), s| (peak.max(s.abs()), sum + (s as f64) * (s as f64)));
        let rms = (sum_sq / self.filled as f64).sqrt() as f32;
        MeterLevels { peak, rms, peak_dbfs: gain_to_db(peak), rms_dbfs: gain_to_db(rms) }
    }

    /// The window, oldest sample first.
    pub fn time_domain(&self) -> Vec<f32> {
        self.recent().collect()
    }

    fn recent(&self) -> impl Iterator<Item = f32> + '_ {
        let len = self.window.len();
        let start = (self.cursor + len - self.filled) % len;
        (0..self.filled).map(move |i| self.window[(start + i) % len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ringbuf::traits::Producer;

    #[test]
    fn test_empty_analyser_reports_silence() {
        let (_tx, analyser) = analyser_channel(16);
        let levels = analyser.levels();
        assert_eq!(levels.peak, 0.0);
        assert!(levels.peak_dbfs < -100.0);
        assert!(analyser.time_domain().is_empty());
    }

    #[test]
    fn test_levels_of_constant_signal() {
        let (mut tx, mut analyser) = analyser_channel(8);
        tx.push_slice(&[0.5, -0.5, 0.5, -0.5]);
        assert_eq!(analyser.update(), 4);
        let levels = analyser.levels();
        assert_abs_diff_eq!(levels.peak, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(levels.rms, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(levels.peak_dbfs, -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn test_window_keeps_latest_samples_in_order() {
        let (mut tx, mut analyser) = analyser_channel(4);
        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        tx.push_slice(&samples);
        analyser.update();
        assert_eq!(analyser.time_domain(), vec![0.6, 0.7, 0.8, 0.9]);
    }
}
