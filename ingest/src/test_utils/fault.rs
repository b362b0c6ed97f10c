use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::ErrorKind;
use crate::test_utils::notify::TimedNotify;

#[derive(Debug, Clone, Copy)]
struct Fault {
    kind: ErrorKind,
    /// Remaining failures, `None` failing forever.
    remaining: Option<u64>,
}

#[derive(Debug)]
struct Inner<O> {
    faults: HashMap<O, Fault>,
    calls: HashMap<O, u64>,
    conditions: Vec<(O, u64, Arc<Notify>)>,
}

/// Failures to inject per operation, together with the number of calls seen per operation.
///
/// Clones share the same plan.
#[derive(Debug, Clone)]
pub struct FaultPlan<O> {
    inner: Arc<Mutex<Inner<O>>>,
}

impl<O> Default for FaultPlan<O> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                faults: HashMap::new(),
                calls: HashMap::new(),
                conditions: Vec::new(),
            })),
        }
    }
}

impl<O> FaultPlan<O>
where
    O: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `operation` fail with `kind`, every call when `None`.
    pub fn inject(&self, operation: O, kind: ErrorKind, times: Option<u64>) {
        self.inner.lock().faults.insert(
            operation,
            Fault {
                kind,
                remaining: times,
            },
        );
    }

    pub fn clear(&self) {
        self.inner.lock().faults.clear();
    }

    /// Returns the number of calls of `operation` seen so far, failed ones included.
    pub fn calls(&self, operation: O) -> u64 {
        self.inner
            .lock()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// Returns a notification fired once `operation` was called at least `count` times.
    pub fn notify_on_calls(&self, operation: O, count: u64) -> TimedNotify {
        let notify = Arc::new(Notify::new());

        let mut inner = self.inner.lock();
        if inner.calls.get(&operation).copied().unwrap_or_default() >= count {
            notify.notify_one();
        } else {
            inner.conditions.push((operation, count, notify.clone()));
        }

        TimedNotify::new(notify)
    }

    /// Records a call of `operation` and returns the error kind to fail it with, if any.
    pub fn record_call(&self, operation: O) -> Option<ErrorKind> {
        let mut inner = self.inner.lock();

        let calls = inner.calls.entry(operation).or_default();
        *calls += 1;
        let calls = *calls;

        inner.conditions.retain(|(condition_operation, count, notify)| {
            let reached = *condition_operation == operation && calls >= *count;
            if reached {
                notify.notify_one();
            }
            !reached
        });

        let fault = inner.faults.get(&operation).copied()?;
        match fault.remaining {
            None => Some(fault.kind),
            Some(remaining) => {
                if remaining <= 1 {
                    inner.faults.remove(&operation);
                } else {
                    inner.faults.insert(
                        operation,
                        Fault {
                            remaining: Some(remaining - 1),
                            ..fault
                        },
                    );
                }
                (remaining > 0).then_some(fault.kind)
            }
        }
    }
}
