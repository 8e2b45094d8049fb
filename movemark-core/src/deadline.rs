//! Bounded calls and cooperative cancellation.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Shared abort flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a bounded call produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("timed out after {} ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("call aborted before returning")]
    Aborted,
}

static CALL_IDS: AtomicUsize = AtomicUsize::new(0);
static OVERRUNNING: AtomicUsize = AtomicUsize::new(0);

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Calls that timed out and whose threads have not returned yet.
pub fn overrunning_calls() -> usize {
    OVERRUNNING.load(Ordering::SeqCst)
}

/// Run `f` on a helper thread and wait at most `timeout` for its result.
///
/// A call that overruns is left to finish in the background and its result is
/// discarded; [`overrunning_calls`] counts those threads until they return. A
/// panic inside `f` surfaces as [`CallError::Aborted`].
pub fn call_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T, CallError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let state = Arc::new(AtomicU8::new(RUNNING));
    let thread_state = Arc::clone(&state);
    let name = format!("movemark-call-{}", CALL_IDS.fetch_add(1, Ordering::Relaxed));

    let spawned = std::thread::Builder::new().name(name.clone()).spawn(move || {
        let _ = tx.send(f());
        let abandoned = thread_state
            .compare_exchange(RUNNING, FINISHED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();
        if abandoned {
            OVERRUNNING.fetch_sub(1, Ordering::SeqCst);
        }
    });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "could not spawn call thread");
        return Err(CallError::Aborted);
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(CallError::Aborted),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            // count first so the thread's decrement never runs ahead of it
            let overrunning = OVERRUNNING.fetch_add(1, Ordering::SeqCst) + 1;
            let abandoned = state
                .compare_exchange(RUNNING, ABANDONED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok();
            if abandoned {
                tracing::warn!(
                    thread = %name,
                    timeout_ms = timeout.as_millis() as u64,
                    overrunning,
                    "call overran its timeout; thread left running"
                );
            } else {
                OVERRUNNING.fetch_sub(1, Ordering::SeqCst);
            }
            Err(CallError::TimedOut(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_call_returns_value() {
        assert_eq!(call_with_timeout(Duration::from_secs(5), || 7), Ok(7));
    }

    #[test]
    fn slow_call_times_out() {
        let got = call_with_timeout(Duration::from_millis(20), || {
            std::thread::sleep(Duration::from_millis(500));
            1
        });
        assert_eq!(got, Err(CallError::TimedOut(Duration::from_millis(20))));
        assert_eq!(got.unwrap_err().to_string(), "timed out after 20 ms");
    }

    #[test]
    fn overrunning_thread_is_counted_until_it_returns() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let got = call_with_timeout(Duration::from_millis(20), move || {
            let _ = release_rx.recv();
            let _ = done_tx.send(());
        });
        assert_eq!(got, Err(CallError::TimedOut(Duration::from_millis(20))));
        assert!(overrunning_calls() >= 1);

        release_tx.send(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn panicking_call_is_aborted() {
        let got: Result<u8, _> = call_with_timeout(Duration::from_secs(5), || panic!("boom"));
        assert_eq!(got, Err(CallError::Aborted));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
