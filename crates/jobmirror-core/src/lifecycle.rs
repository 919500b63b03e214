//! Shutdown registry for connection teardown.
//!
//! Each connection registers its teardown when it is acquired. The process
//! driver owns the `Lifecycle` and calls `dispose_all` once at exit; actions
//! run in registration order and a failing action never stops the drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Zero-argument teardown. Should tolerate the resource already being closed.
pub type Teardown = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Outcome of a drain, mostly for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisposeReport {
    pub ran: usize,
    pub failed: Vec<String>,
}

#[derive(Default)]
pub struct Lifecycle {
    actions: Mutex<Vec<(String, Teardown)>>,
    disposed: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a teardown. Registering after `dispose_all` runs it immediately,
    /// so a connection that completes during shutdown is still released.
    pub fn register<F>(&self, label: impl Into<String>, teardown: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let label = label.into();
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        if self.disposed.load(Ordering::Acquire) {
            drop(actions);
            tracing::debug!(%label, "lifecycle already disposed; running teardown now");
            run_one(&label, Box::new(teardown));
            return;
        }
        tracing::debug!(%label, "registered teardown");
        actions.push((label, Box::new(teardown)));
    }

    /// Number of teardowns waiting to run.
    pub fn pending(&self) -> usize {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Run every registered teardown once, in registration order.
    /// Subsequent calls return an empty report.
    pub fn dispose_all(&self) -> DisposeReport {
        // The flag flips under the registry lock so a concurrent `register`
        // either lands in the drained list or sees the flag and runs inline.
        let actions = {
            let mut guard = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
            if self.disposed.swap(true, Ordering::AcqRel) {
                return DisposeReport::default();
            }
            std::mem::take(&mut *guard)
        };
        let mut report = DisposeReport::default();
        for (label, teardown) in actions {
            report.ran += 1;
            if !run_one(&label, teardown) {
                report.failed.push(label);
            }
        }
        tracing::info!(ran = report.ran, failed = report.failed.len(), "lifecycle disposed");
        report
    }
}

fn run_one(label: &str, teardown: Teardown) -> bool {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(teardown)) {
        Ok(Ok(())) => {
            tracing::debug!(label, "teardown complete");
            true
        }
        Ok(Err(e)) => {
            tracing::warn!(label, "teardown failed: {:#}", e);
            false
        }
        Err(_) => {
            tracing::error!(label, "teardown panicked");
            false
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("pending", &self.pending())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn runs_in_registration_order_and_continues_after_failure() {
        let lc = Lifecycle::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        lc.register("a", move || {
            l.lock().unwrap().push("a");
            anyhow::bail!("a already closed badly")
        });
        let l = Arc::clone(&log);
        lc.register("b", move || {
            l.lock().unwrap().push("b");
            Ok(())
        });

        let report = lc.dispose_all();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(report.ran, 2);
        assert_eq!(report.failed, vec!["a".to_string()]);
    }

    #[test]
    fn panicking_teardown_does_not_abort_drain() {
        let lc = Lifecycle::new();
        let ran = Arc::new(AtomicBool::new(false));
        lc.register("boom", || panic!("teardown exploded"));
        let r = Arc::clone(&ran);
        lc.register("after", move || {
            r.store(true, Ordering::SeqCst);
            Ok(())
        });
        let report = lc.dispose_all();
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(report.failed, vec!["boom".to_string()]);
    }

    #[test]
    fn dispose_runs_once() {
        let lc = Lifecycle::new();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        lc.register("once", move || {
            *c.lock().unwrap() += 1;
            Ok(())
        });
        assert_eq!(lc.pending(), 1);
        assert_eq!(lc.dispose_all().ran, 1);
        assert_eq!(lc.dispose_all().ran, 0);
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(lc.is_disposed());
    }

    #[test]
    fn late_registration_runs_immediately() {
        let lc = Lifecycle::new();
        lc.dispose_all();
        let ran = Arc::new(AtomicBool::new(false));
        let r = Arc::clone(&ran);
        lc.register("late", move || {
            r.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(lc.pending(), 0);
    }

    #[test]
    fn registrations_racing_dispose_all_still_run() {
        for _ in 0..50 {
            let lc = Arc::new(Lifecycle::new());
            let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let lc = Arc::clone(&lc);
                    let count = Arc::clone(&count);
                    std::thread::spawn(move || {
                        for _ in 0..25 {
                            let c = Arc::clone(&count);
                            lc.register("racer", move || {
                                c.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            });
                        }
                    })
                })
                .collect();
            lc.dispose_all();
            for w in workers {
                w.join().unwrap();
            }
            assert_eq!(count.load(Ordering::SeqCst), 100);
            assert_eq!(lc.pending(), 0);
        }
    }
}
