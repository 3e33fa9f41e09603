//! Attempt-level retry control for one backfill chunk.
//!
//! Each attempt is classified into a `FetchOutcome`; `fetch_with_retry` drives
//! the attempt counter with a fixed (non-exponential) backoff between attempts.
//! All waiting goes through a `Pacer` so tests can observe the schedule.

use std::cell::RefCell;
use std::time::Duration;

use tracing::{debug, warn};

use super::normalize::normalize;
use super::provider::{CandleRequest, CandleSource, DataError, RawRecord};
use crate::domain::Candle;

/// Something that can block the pipeline for a duration.
pub trait Pacer {
    fn pause(&self, duration: Duration);
}

/// Production pacer: blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingPacer {
    pauses: RefCell<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.pauses.borrow().iter().sum()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

/// Attempt cap and static backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Classified result of a single attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(Vec<Candle>),
    Retryable(DataError),
    Permanent(DataError),
}

impl FetchOutcome {
    /// Classify a raw source response. Empty data and malformed records are
    /// retryable failures, never partial successes.
    pub fn classify(response: Result<Vec<RawRecord>, DataError>) -> Self {
        match response {
            Ok(records) if records.is_empty() => FetchOutcome::Retryable(DataError::EmptyResponse),
            Ok(records) => match normalize(&records) {
                Ok(candles) => FetchOutcome::Success(candles),
                Err(e) => FetchOutcome::Retryable(DataError::Malformed(e)),
            },
            Err(e) if e.is_retryable() => FetchOutcome::Retryable(e),
            Err(e) => FetchOutcome::Permanent(e),
        }
    }
}

/// Final result of the attempt loop for one request.
#[derive(Debug)]
pub enum RetryOutcome {
    Succeeded { candles: Vec<Candle>, attempts: u32 },
    Exhausted { attempts: u32, last_error: DataError },
    Aborted { attempts: u32, error: DataError },
}

/// Call `source` up to `policy.max_attempts` times, pausing `policy.backoff`
/// between attempts (not after the last one).
pub fn fetch_with_retry(
    source: &dyn CandleSource,
    request: &CandleRequest,
    policy: &RetryPolicy,
    pacer: &dyn Pacer,
) -> RetryOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(
            source = source.name(),
            attempt,
            from = %request.from,
            to = %request.to,
            "requesting candles"
        );

        match FetchOutcome::classify(source.fetch(request)) {
            FetchOutcome::Success(candles) => {
                return RetryOutcome::Succeeded {
                    candles,
                    attempts: attempt,
                }
            }
            FetchOutcome::Permanent(error) => {
                warn!(
                    attempt,
                    from = %request.from,
                    to = %request.to,
                    %error,
                    "permanent fetch failure, not retrying"
                );
                return RetryOutcome::Aborted {
                    attempts: attempt,
                    error,
                };
            }
            FetchOutcome::Retryable(error) => {
                warn!(
                    attempt,
                    max_attempts,
                    from = %request.from,
                    to = %request.to,
                    %error,
                    "fetch attempt failed"
                );
                if attempt >= max_attempts {
                    return RetryOutcome::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    };
                }
                pacer.pause(policy.backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::Interval;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::cell::Cell;

    /// Fails the first `failures` calls, then returns one candle.
    struct FlakySource {
        failures: u32,
        calls: Cell<u32>,
        error: fn() -> DataError,
    }

    impl CandleSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        fn fetch(&self, _request: &CandleRequest) -> Result<Vec<RawRecord>, DataError> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if n <= self.failures {
                return Err((self.error)());
            }
            Ok(vec![serde_json::from_value(json!([
                "2025-01-06T09:15:00+05:30",
                100.0,
                101.0,
                99.0,
                100.5,
                10
            ]))
            .unwrap()])
        }
    }

    fn request() -> CandleRequest {
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        CandleRequest {
            exchange: "NSE".into(),
            symbol_token: "99926000".into(),
            interval: Interval::OneMinute,
            from: day.and_hms_opt(9, 0, 0).unwrap(),
            to: day.and_hms_opt(15, 30, 0).unwrap(),
        }
    }

    fn flaky(failures: u32, error: fn() -> DataError) -> FlakySource {
        FlakySource {
            failures,
            calls: Cell::new(0),
            error,
        }
    }

    #[test]
    fn succeeds_first_try_without_pausing() {
        let source = flaky(0, || DataError::EmptyResponse);
        let pacer = RecordingPacer::new();
        let outcome = fetch_with_retry(&source, &request(), &RetryPolicy::default(), &pacer);
        assert!(matches!(outcome, RetryOutcome::Succeeded { attempts: 1, .. }));
        assert!(pacer.pauses().is_empty());
    }

    #[test]
    fn succeeds_on_third_attempt_after_two_backoffs() {
        let source = flaky(2, || DataError::NetworkUnreachable("reset".into()));
        let pacer = RecordingPacer::new();
        let outcome = fetch_with_retry(&source, &request(), &RetryPolicy::default(), &pacer);
        assert!(matches!(outcome, RetryOutcome::Succeeded { attempts: 3, .. }));
        assert_eq!(pacer.pauses(), vec![Duration::from_secs(5); 2]);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let source = flaky(10, || DataError::EmptyResponse);
        let pacer = RecordingPacer::new();
        let outcome = fetch_with_retry(&source, &request(), &RetryPolicy::default(), &pacer);
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 3,
                last_error: DataError::EmptyResponse
            }
        ));
        assert_eq!(source.calls.get(), 3);
        assert_eq!(pacer.pauses().len(), 2);
    }

    #[test]
    fn permanent_error_stops_immediately() {
        let source = flaky(10, || DataError::AuthenticationRequired("expired".into()));
        let pacer = RecordingPacer::new();
        let outcome = fetch_with_retry(&source, &request(), &RetryPolicy::default(), &pacer);
        assert!(matches!(outcome, RetryOutcome::Aborted { attempts: 1, .. }));
        assert_eq!(source.calls.get(), 1);
        assert!(pacer.pauses().is_empty());
    }

    #[test]
    fn empty_response_is_retryable() {
        assert!(matches!(
            FetchOutcome::classify(Ok(vec![])),
            FetchOutcome::Retryable(DataError::EmptyResponse)
        ));
    }

    #[test]
    fn malformed_batch_is_retryable() {
        let bad: RawRecord = serde_json::from_value(json!(["nope", 1.0])).unwrap();
        assert!(matches!(
            FetchOutcome::classify(Ok(vec![bad])),
            FetchOutcome::Retryable(DataError::Malformed(_))
        ));
    }
}
