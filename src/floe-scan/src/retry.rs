use std::time::Duration;

use arrow::record_batch::RecordBatch;
use common_error::{FloeError, FloeResult};
use floe_dataset::BatchIterator;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Immutable retry policy, built once per datasource by merging built-in
/// transient-error signatures with the engine-wide configured list. Retry
/// decisions only ever consult this snapshot, never global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryParams {
    /// Label used when reporting exhausted retries.
    pub description: String,
    /// An error is transient iff its message contains one of these.
    pub match_substrings: Vec<String>,
    /// Total attempts allowed per invocation, first try included.
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryParams {
    pub fn matches(&self, err: &FloeError) -> bool {
        let message = err.to_string();
        self.match_substrings.iter().any(|s| message.contains(s))
    }

    /// Backoff before retry number `retry` (0-based): `initial * 2^retry`,
    /// capped at `max_backoff`.
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = 1u32
            .checked_shl(u32::try_from(retry).unwrap_or(u32::MAX))
            .unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

pub type AttemptFn = Box<dyn Fn() -> FloeResult<BatchIterator> + Send>;

/// Batch iterator wrapping an attempt factory with bounded retries.
///
/// The unit of retry is the *entire* attempt: building the inner iterator
/// and every subsequent batch pull. A transient failure anywhere discards
/// the current attempt, sleeps the capped exponential backoff, and restarts
/// from scratch. Batches already handed to the consumer before a
/// mid-iteration restart are not recalled or deduplicated, so the sequence
/// is only meaningful once fully and successfully drained. Non-transient
/// errors surface immediately and terminate the sequence.
pub struct RetryingBatchIterator {
    attempt_fn: AttemptFn,
    params: RetryParams,
    inner: Option<BatchIterator>,
    attempts: usize,
    done: bool,
}

impl RetryingBatchIterator {
    pub fn new(attempt_fn: AttemptFn, params: RetryParams) -> Self {
        Self {
            attempt_fn,
            params,
            inner: None,
            attempts: 0,
            done: false,
        }
    }

    fn start_attempt(&mut self) -> FloeResult<BatchIterator> {
        loop {
            self.attempts += 1;
            match (self.attempt_fn)() {
                Ok(iter) => return Ok(iter),
                Err(err) => self.handle_failure(err)?,
            }
        }
    }

    /// Decides whether the attempt that just failed gets another try.
    /// Returns `Ok(())` after sleeping the backoff, or the terminal error.
    fn handle_failure(&mut self, err: FloeError) -> FloeResult<()> {
        if !self.params.matches(&err) {
            return Err(err);
        }
        if self.attempts >= self.params.max_attempts {
            return Err(Error::RetriesExhausted {
                description: self.params.description.clone(),
                attempts: self.attempts,
                source: err.into(),
            }
            .into());
        }
        let delay = self.params.backoff(self.attempts - 1);
        log::warn!(
            "{} failed (attempt {}/{}): {}. Retrying in {:?}",
            self.params.description,
            self.attempts,
            self.params.max_attempts,
            err,
            delay
        );
        std::thread::sleep(delay);
        Ok(())
    }
}

impl Iterator for RetryingBatchIterator {
    type Item = FloeResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let inner = match self.inner.as_mut() {
                Some(inner) => inner,
                None => match self.start_attempt() {
                    Ok(iter) => self.inner.insert(iter),
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err));
                    }
                },
            };
            match inner.next() {
                Some(Ok(batch)) => return Some(Ok(batch)),
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(err)) => {
                    self.inner = None;
                    if let Err(err) = self.handle_failure(err) {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    fn params(max_attempts: usize) -> RetryParams {
        RetryParams {
            description: "read test fragments".to_string(),
            match_substrings: vec!["transient".to_string()],
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(8),
        }
    }

    fn batch(value: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![value]))]).unwrap()
    }

    fn batches(values: &[i64]) -> BatchIterator {
        let items: Vec<FloeResult<RecordBatch>> = values.iter().map(|v| Ok(batch(*v))).collect();
        Box::new(items.into_iter())
    }

    #[test]
    fn transient_construction_failures_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let attempt: AttemptFn = Box::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FloeError::InternalError("transient glitch".to_string()))
            } else {
                Ok(batches(&[1, 2]))
            }
        });
        let drained: Vec<_> = RetryingBatchIterator::new(attempt, params(3))
            .collect::<FloeResult<Vec<_>>>()
            .unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_retries_surface_the_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let attempt: AttemptFn = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FloeError::InternalError("transient glitch".to_string()))
        });
        let mut iter = RetryingBatchIterator::new(attempt, params(3));
        let err = iter.next().unwrap().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("read test fragments failed after 3 attempts"), "{message}");
        assert!(message.contains("transient glitch"), "{message}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // The sequence is terminal after the error.
        assert!(iter.next().is_none());
    }

    #[test]
    fn non_matching_errors_surface_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let attempt: AttemptFn = Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(FloeError::InternalError("permission denied".to_string()))
        });
        let mut iter = RetryingBatchIterator::new(attempt, params(5));
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn mid_iteration_failure_restarts_the_whole_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let attempt: AttemptFn = Box::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                let items: Vec<FloeResult<RecordBatch>> = vec![
                    Ok(batch(1)),
                    Err(FloeError::InternalError("transient glitch".to_string())),
                ];
                Ok(Box::new(items.into_iter()))
            } else {
                Ok(batches(&[1, 2]))
            }
        });
        let drained: Vec<_> = RetryingBatchIterator::new(attempt, params(3))
            .collect::<FloeResult<Vec<_>>>()
            .unwrap();
        // The failed attempt's first batch was already handed out; the fresh
        // attempt re-emits from scratch. Drains through a mid-stream retry
        // therefore see duplicates, by design.
        assert_eq!(drained.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let p = RetryParams {
            description: String::new(),
            match_substrings: vec![],
            max_attempts: 10,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(32),
        };
        assert_eq!(p.backoff(0), Duration::from_secs(1));
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(4), Duration::from_secs(16));
        assert_eq!(p.backoff(5), Duration::from_secs(32));
        assert_eq!(p.backoff(20), Duration::from_secs(32));
        assert_eq!(p.backoff(200), Duration::from_secs(32));
    }
}
