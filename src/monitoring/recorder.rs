use super::history::HistoryBuffer;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_SAMPLE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestSample {
    pub response_time_ms: f64,
    pub is_error: bool,
}

/// Aggregates derived from the recorder at a single instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_response_time: f64,
    pub error_rate: f64,
    pub uptime_ms: u64,
    pub active_connections: u64,
}

#[derive(Debug)]
struct RecorderState {
    samples: HistoryBuffer<RequestSample>,
    request_count: u64,
    error_count: u64,
    started_at: Instant,
}

/// Rolling window of recent request outcomes.
///
/// Latency samples are bounded; the request and error counters are monotonic and
/// independent of the window, so the error rate covers every observed request.
#[derive(Debug)]
pub struct RequestRecorder {
    state: Mutex<RecorderState>,
    in_flight: AtomicU64,
    capacity: usize,
}

impl Default for RequestRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAPACITY)
    }
}

impl RequestRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RecorderState {
                samples: HistoryBuffer::new(capacity),
                request_count: 0,
                error_count: 0,
                started_at: Instant::now(),
            }),
            in_flight: AtomicU64::new(0),
            capacity,
        }
    }

    pub fn record_request(&self, response_time_ms: f64, is_error: bool) {
        let mut state = self.state.lock();
        state.samples.push(RequestSample {
            response_time_ms,
            is_error,
        });
        state.request_count += 1;
        if is_error {
            state.error_count += 1;
        }
    }

    /// Mean latency over the current window, 0 when nothing has been recorded.
    pub fn average_response_time(&self) -> f64 {
        let state = self.state.lock();
        Self::mean_latency(&state.samples)
    }

    /// Percentage of all observed requests that were errors.
    pub fn error_rate(&self) -> f64 {
        let state = self.state.lock();
        error_rate_percent(state.error_count, state.request_count)
    }

    pub fn request_count(&self) -> u64 {
        self.state.lock().request_count
    }

    pub fn error_count(&self) -> u64 {
        self.state.lock().error_count
    }

    pub fn uptime_ms(&self) -> u64 {
        self.state.lock().started_at.elapsed().as_millis() as u64
    }

    pub fn active_connections(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Ordered copy of the latency window, oldest first.
    pub fn samples(&self) -> Vec<RequestSample> {
        self.state.lock().samples.to_vec()
    }

    pub fn metrics(&self) -> RecorderMetrics {
        let state = self.state.lock();
        RecorderMetrics {
            request_count: state.request_count,
            error_count: state.error_count,
            avg_response_time: Self::mean_latency(&state.samples),
            error_rate: error_rate_percent(state.error_count, state.request_count),
            uptime_ms: state.started_at.elapsed().as_millis() as u64,
            active_connections: self.in_flight.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter, drop the window and restart the uptime clock.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.samples = HistoryBuffer::new(self.capacity);
        state.request_count = 0;
        state.error_count = 0;
        state.started_at = Instant::now();
        debug!("Request recorder reset");
    }

    /// Track an in-flight request. The returned timer records the request when
    /// [`RequestTimer::finish`] is called.
    pub fn start_request(self: &Arc<Self>) -> RequestTimer {
        RequestTimer::new(self.clone())
    }

    fn mean_latency(samples: &HistoryBuffer<RequestSample>) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let total: f64 = samples.iter().map(|s| s.response_time_ms).sum();
        total / samples.len() as f64
    }
}

pub fn error_rate_percent(error_count: u64, request_count: u64) -> f64 {
    if request_count == 0 {
        0.0
    } else {
        error_count as f64 / request_count as f64 * 100.0
    }
}

/// In-flight request guard. Holds the active-connection gauge up until dropped.
pub struct RequestTimer {
    start: Instant,
    recorder: Arc<RequestRecorder>,
}

impl RequestTimer {
    pub fn new(recorder: Arc<RequestRecorder>) -> Self {
        recorder.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            start: Instant::now(),
            recorder,
        }
    }

    pub fn finish(self, is_error: bool) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.recorder.record_request(elapsed_ms, is_error);
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.recorder.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_empty_recorder() {
        let recorder = RequestRecorder::default();
        assert_eq!(recorder.average_response_time(), 0.0);
        assert_eq!(recorder.error_rate(), 0.0);
        assert_eq!(recorder.request_count(), 0);
    }

    #[test]
    fn test_average_response_time() {
        let recorder = RequestRecorder::default();
        recorder.record_request(100.0, false);
        recorder.record_request(200.0, false);
        recorder.record_request(300.0, false);

        assert_relative_eq!(recorder.average_response_time(), 200.0);
    }

    #[test]
    fn test_error_rate() {
        let recorder = RequestRecorder::default();
        recorder.record_request(10.0, false);
        recorder.record_request(10.0, true);
        recorder.record_request(10.0, false);
        recorder.record_request(10.0, false);

        assert_relative_eq!(recorder.error_rate(), 25.0);
    }

    #[test]
    fn test_error_rate_counts_requests_beyond_window() {
        let recorder = RequestRecorder::new(10);
        for _ in 0..10 {
            recorder.record_request(5.0, true);
        }
        for _ in 0..30 {
            recorder.record_request(5.0, false);
        }

        assert_eq!(recorder.samples().len(), 10);
        assert_eq!(recorder.request_count(), 40);
        assert_relative_eq!(recorder.error_rate(), 25.0);
    }

    #[test]
    fn test_accepts_non_positive_latency() {
        let recorder = RequestRecorder::default();
        recorder.record_request(-50.0, false);
        recorder.record_request(0.0, false);
        recorder.record_request(50.0, false);

        assert_relative_eq!(recorder.average_response_time(), 0.0);
        assert_eq!(recorder.request_count(), 3);
    }

    #[test]
    fn test_reset() {
        let recorder = RequestRecorder::default();
        recorder.record_request(120.0, true);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let before = recorder.uptime_ms();

        recorder.reset();

        assert_eq!(recorder.request_count(), 0);
        assert_eq!(recorder.error_count(), 0);
        assert!(recorder.samples().is_empty());
        assert!(recorder.uptime_ms() <= before);
    }

    #[test]
    fn test_request_timer_tracks_in_flight() {
        let recorder = Arc::new(RequestRecorder::default());

        let timer = recorder.start_request();
        let second = recorder.start_request();
        assert_eq!(recorder.active_connections(), 2);

        timer.finish(false);
        assert_eq!(recorder.active_connections(), 1);
        assert_eq!(recorder.request_count(), 1);

        drop(second);
        assert_eq!(recorder.active_connections(), 0);
        assert_eq!(recorder.request_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_window_holds_most_recent_samples(latencies in proptest::collection::vec(0.0f64..5000.0, 0..2500)) {
            let recorder = RequestRecorder::default();
            for latency in &latencies {
                recorder.record_request(*latency, false);
            }

            let samples = recorder.samples();
            let expected_len = latencies.len().min(DEFAULT_SAMPLE_CAPACITY);
            prop_assert_eq!(samples.len(), expected_len);

            let tail = &latencies[latencies.len() - expected_len..];
            for (sample, latency) in samples.iter().zip(tail) {
                prop_assert_eq!(sample.response_time_ms, *latency);
            }
        }

        #[test]
        fn prop_error_rate_matches_counts(outcomes in proptest::collection::vec(any::<bool>(), 1..500)) {
            let recorder = RequestRecorder::default();
            for is_error in &outcomes {
                recorder.record_request(1.0, *is_error);
            }

            let errors = outcomes.iter().filter(|e| **e).count() as f64;
            let expected = 100.0 * errors / outcomes.len() as f64;
            prop_assert!((recorder.error_rate() - expected).abs() < 1e-9);
        }
    }
}
