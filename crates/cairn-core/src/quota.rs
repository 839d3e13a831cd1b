//! Rate-limit pause-and-resume.
//!
//! Tracker backends shed load by rejecting writes with a reset hint. The
//! gate's contract is checkpoint-before-sleep: persist a resumable snapshot
//! first, then wait out the window, then retry. A worker that dies during
//! the pause loses nothing the checkpoint did not already capture.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::QuotaConfig;
use crate::error::CoordError;
use crate::store::StoreError;

/// How the gate waits. Real workers block the thread; tests record.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Blocks the calling thread.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct QuotaGate<'a, S: Sleeper> {
    config: &'a QuotaConfig,
    sleeper: &'a S,
}

impl<'a, S: Sleeper> QuotaGate<'a, S> {
    pub fn new(config: &'a QuotaConfig, sleeper: &'a S) -> Self {
        Self { config, sleeper }
    }

    /// Run a store operation, pausing and retrying through quota windows.
    ///
    /// # Errors
    ///
    /// [`CoordError::QuotaExhausted`] once `max_pauses` windows have been
    /// waited out without the backend accepting the write. Any other store
    /// error passes through on first sight.
    pub fn run<T, Op, Ck>(&self, checkpoint: Ck, mut op: Op) -> Result<T, CoordError>
    where
        Op: FnMut() -> Result<T, StoreError>,
        Ck: FnMut() -> Result<(), CoordError>,
    {
        self.run_protocol(checkpoint, || op().map_err(CoordError::from))
    }

    /// Like [`run`](Self::run), for operations that bundle several store
    /// calls behind a protocol-level result (a claim attempt, a release).
    /// The whole operation reruns after the pause, so it must tolerate its
    /// own partial writes; every protocol write in this crate does.
    ///
    /// `checkpoint` runs before every sleep. A checkpoint failure is logged
    /// and the pause proceeds anyway: an unsaved snapshot is worse than a
    /// stale one, but neither justifies burning the remaining quota budget.
    ///
    /// # Errors
    ///
    /// [`CoordError::QuotaExhausted`] past the pause budget; anything else
    /// on first sight.
    pub fn run_protocol<T, Op, Ck>(&self, mut checkpoint: Ck, mut op: Op) -> Result<T, CoordError>
    where
        Op: FnMut() -> Result<T, CoordError>,
        Ck: FnMut() -> Result<(), CoordError>,
    {
        let mut pauses = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(CoordError::QuotaExhausted { reset_after }) => {
                    if pauses >= self.config.max_pauses {
                        warn!(pauses, "quota pause budget exhausted, giving up");
                        return Err(CoordError::QuotaExhausted { reset_after });
                    }
                    pauses += 1;
                    if let Err(err) = checkpoint() {
                        warn!(%err, "checkpoint before quota pause failed");
                    }
                    let hint = reset_after
                        .unwrap_or_else(|| Duration::from_secs(self.config.max_wait_secs));
                    let wait = self.config.clamp_wait(hint);
                    info!(pause = pauses, wait_secs = wait.as_secs(), "quota window hit, pausing");
                    self.sleeper.sleep(wait);
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::cell::RefCell;

    /// Records requested waits instead of blocking.
    #[derive(Default)]
    struct RecordingSleeper {
        waits: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.waits.borrow_mut().push(duration);
        }
    }

    fn config() -> QuotaConfig {
        QuotaConfig {
            max_pauses: 2,
            max_wait_secs: 300,
        }
    }

    #[test]
    fn success_passes_straight_through() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let out = gate.run(|| Ok(()), || Ok(42)).expect("ok");
        assert_eq!(out, 42);
        assert!(sleeper.waits.borrow().is_empty());
    }

    #[test]
    fn checkpoint_runs_before_each_pause() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let checkpoints = RefCell::new(0u32);
        let attempts = RefCell::new(0u32);
        let out = gate
            .run(
                || {
                    *checkpoints.borrow_mut() += 1;
                    Ok(())
                },
                || {
                    let mut n = attempts.borrow_mut();
                    *n += 1;
                    if *n <= 2 {
                        Err(StoreError::QuotaExhausted {
                            reset_after: Duration::from_secs(30),
                        })
                    } else {
                        Ok("written")
                    }
                },
            )
            .expect("eventually succeeds");
        assert_eq!(out, "written");
        assert_eq!(*checkpoints.borrow(), 2);
        assert_eq!(
            sleeper.waits.borrow().as_slice(),
            &[Duration::from_secs(30), Duration::from_secs(30)]
        );
    }

    #[test]
    fn wait_is_clamped_to_config_ceiling() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let attempts = RefCell::new(0u32);
        gate.run(
            || Ok(()),
            || {
                let mut n = attempts.borrow_mut();
                *n += 1;
                if *n == 1 {
                    Err(StoreError::QuotaExhausted {
                        reset_after: Duration::from_secs(86_400),
                    })
                } else {
                    Ok(())
                }
            },
        )
        .expect("ok after one pause");
        assert_eq!(
            sleeper.waits.borrow().as_slice(),
            &[Duration::from_secs(300)]
        );
    }

    #[test]
    fn pause_budget_bounds_the_retries() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let err = gate
            .run(
                || Ok(()),
                || -> Result<(), StoreError> {
                    Err(StoreError::QuotaExhausted {
                        reset_after: Duration::from_secs(1),
                    })
                },
            )
            .expect_err("budget exhausted");
        assert_eq!(err.code(), ErrorCode::QuotaExhausted);
        assert_eq!(sleeper.waits.borrow().len(), 2);
    }

    #[test]
    fn checkpoint_failure_does_not_abort_the_pause() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let attempts = RefCell::new(0u32);
        gate.run(
            || Err(CoordError::Backend("snapshot write failed".into())),
            || {
                let mut n = attempts.borrow_mut();
                *n += 1;
                if *n == 1 {
                    Err(StoreError::QuotaExhausted {
                        reset_after: Duration::from_secs(5),
                    })
                } else {
                    Ok(())
                }
            },
        )
        .expect("retry still happens");
        assert_eq!(sleeper.waits.borrow().len(), 1);
    }

    #[test]
    fn protocol_operations_pause_on_the_converted_error() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let attempts = RefCell::new(0u32);
        gate.run_protocol(
            || Ok(()),
            || {
                let mut n = attempts.borrow_mut();
                *n += 1;
                if *n == 1 {
                    Err(CoordError::QuotaExhausted {
                        reset_after: Some(Duration::from_secs(12)),
                    })
                } else {
                    Ok(())
                }
            },
        )
        .expect("retried past the window");
        assert_eq!(
            sleeper.waits.borrow().as_slice(),
            &[Duration::from_secs(12)]
        );
    }

    #[test]
    fn hintless_quota_error_waits_the_config_ceiling() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let attempts = RefCell::new(0u32);
        gate.run_protocol(
            || Ok(()),
            || {
                let mut n = attempts.borrow_mut();
                *n += 1;
                if *n == 1 {
                    Err(CoordError::QuotaExhausted { reset_after: None })
                } else {
                    Ok(())
                }
            },
        )
        .expect("retried past the window");
        assert_eq!(
            sleeper.waits.borrow().as_slice(),
            &[Duration::from_secs(300)]
        );
    }

    #[test]
    fn unrelated_errors_pass_through_without_pausing() {
        let sleeper = RecordingSleeper::default();
        let config = config();
        let gate = QuotaGate::new(&config, &sleeper);
        let err = gate
            .run(
                || Ok(()),
                || -> Result<(), StoreError> { Err(StoreError::Backend("connection reset".into())) },
            )
            .expect_err("passes through");
        assert_eq!(err.code(), ErrorCode::StoreBackend);
        assert!(sleeper.waits.borrow().is_empty());
    }
}
