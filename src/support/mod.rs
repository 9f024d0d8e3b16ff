//! Small helpers for application code.

pub mod html;
pub mod str;

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Calls `f(attempt)` up to `times` times, starting at attempt 1.
///
/// Between failures the thread sleeps for `backoff(attempt)`. Returns the
/// first success, or the last error once attempts run out.
///
/// ```rust
/// use std::time::Duration;
/// use trellis::support::retry;
///
/// let value = retry(3, |_| Duration::ZERO, |attempt| {
///     if attempt < 3 { Err(trellis::Error::Database("busy".into())) } else { Ok(attempt) }
/// });
/// assert_eq!(value.unwrap(), 3);
/// ```
pub fn retry<T, B, F>(times: u32, backoff: B, mut f: F) -> Result<T>
where
    B: Fn(u32) -> Duration,
    F: FnMut(u32) -> Result<T>,
{
    if times == 0 {
        return Err(Error::InvalidArgument("retry needs at least one attempt".into()));
    }

    let mut attempt = 1;
    loop {
        match f(attempt) {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= times => return Err(err),
            Err(err) => {
                let wait = backoff(attempt);
                debug!(attempt, ?wait, error = %err, "attempt failed, retrying");
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_first_success() {
        let mut calls = 0;
        let out = retry(5, |_| Duration::ZERO, |attempt| {
            calls += 1;
            if attempt == 2 { Ok("done") } else { Err(Error::Database("nope".into())) }
        });
        assert_eq!(out.unwrap(), "done");
        assert_eq!(calls, 2);
    }

    #[test]
    fn gives_up_with_last_error() {
        let out: Result<()> = retry(3, |_| Duration::ZERO, |attempt| {
            Err(Error::Database(format!("failure {attempt}")))
        });
        assert!(matches!(out, Err(Error::Database(msg)) if msg == "failure 3"));
    }

    #[test]
    fn backoff_sees_each_failed_attempt() {
        let seen = std::cell::RefCell::new(Vec::new());
        let _ = retry(
            3,
            |attempt| {
                seen.borrow_mut().push(attempt);
                Duration::ZERO
            },
            |_| Err::<(), _>(Error::Database("x".into())),
        );
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let out = retry(0, |_| Duration::ZERO, |_| Ok(()));
        assert!(matches!(out, Err(Error::InvalidArgument(_))));
    }
}
