//! Single-flight de-duplication of chunk generation.
//!
//! Concurrent requests that miss the cache for the same context id would
//! otherwise each regenerate the same list. The first request becomes the
//! leader and runs the work; requests arriving while it runs wait for its
//! outcome instead of starting their own.
//!
//! Cancellation stays per request. A leader whose own context is cancelled
//! abandons the flight and one of its waiters leads a fresh run. A waiter
//! whose context is cancelled stops waiting without disturbing the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ixp_types::ContextId;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::context::LinkContext;
use crate::error::{EngineError, EngineResult};

/// How often a waiter re-checks its own cancellation token.
const WAIT_POLL: Duration = Duration::from_millis(10);

enum Outcome<T> {
    Done(T),
    Failed(String),
    /// The leader was cancelled; nothing was decided.
    Abandoned,
}

struct Flight<T> {
    outcome: Mutex<Option<Outcome<T>>>,
    done: Condvar,
}

impl<T> Flight<T> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }
}

/// In-flight work keyed by context id.
pub struct SingleFlight<T> {
    in_flight: Mutex<HashMap<ContextId, Arc<Flight<T>>>>,
}

impl<T: Clone> SingleFlight<T> {
    /// An empty table with nothing in flight.
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` unless it is already running for `key`, in which case wait
    /// for that run and share its result.
    ///
    /// A failed leader is reported to waiters as
    /// [`EngineError::GenerationFailed`]; the leader itself gets its original
    /// error. A leader failing with [`EngineError::Cancelled`] is not a
    /// failure for anyone else: its waiters retry and one of them leads.
    /// While waiting, `ctx` is polled so a cancelled waiter returns
    /// `Cancelled` promptly.
    pub fn run<F>(&self, ctx: &LinkContext, key: &ContextId, work: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineResult<T>,
    {
        let flight = loop {
            ctx.check()?;
            let (flight, leader) = self.join_or_lead(key);
            if leader {
                break flight;
            }
            debug!(context = %key, "joining in-flight generation");
            match Self::wait(ctx, key, &flight)? {
                Some(value) => return Ok(value),
                None => debug!(context = %key, "generation leader was cancelled, retrying"),
            }
        };

        let mut guard = LeaderGuard {
            owner: self,
            key,
            flight: &flight,
            published: false,
        };
        let result = work();
        guard.publish(match &result {
            Ok(value) => Outcome::Done(value.clone()),
            Err(EngineError::Cancelled) => Outcome::Abandoned,
            Err(e) => Outcome::Failed(e.to_string()),
        });
        result
    }

    fn join_or_lead(&self, key: &ContextId) -> (Arc<Flight<T>>, bool) {
        let mut map = self.in_flight.lock();
        match map.get(key) {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                let flight = Arc::new(Flight::new());
                map.insert(key.clone(), Arc::clone(&flight));
                (flight, true)
            }
        }
    }

    /// Block until `flight` publishes. `Ok(None)` means it was abandoned.
    fn wait(ctx: &LinkContext, key: &ContextId, flight: &Flight<T>) -> EngineResult<Option<T>> {
        let mut outcome = flight.outcome.lock();
        loop {
            match outcome.as_ref() {
                Some(Outcome::Done(value)) => return Ok(Some(value.clone())),
                Some(Outcome::Failed(reason)) => {
                    return Err(EngineError::GenerationFailed {
                        context: key.clone(),
                        reason: reason.clone(),
                    })
                }
                Some(Outcome::Abandoned) => return Ok(None),
                None => {
                    ctx.check()?;
                    flight.done.wait_for(&mut outcome, WAIT_POLL);
                }
            }
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes the leader's outcome exactly once, even if `work` panics.
struct LeaderGuard<'a, T> {
    owner: &'a SingleFlight<T>,
    key: &'a ContextId,
    flight: &'a Flight<T>,
    published: bool,
}

impl<T> LeaderGuard<'_, T> {
    fn publish(&mut self, outcome: Outcome<T>) {
        if self.published {
            return;
        }
        self.published = true;
        *self.flight.outcome.lock() = Some(outcome);
        self.owner.in_flight.lock().remove(self.key);
        self.flight.done.notify_all();
    }
}

impl<T> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        self.publish(Outcome::Failed("generation leader panicked".into()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use tokio_util::sync::CancellationToken;

    use super::*;

    fn in_flight<T>(flights: &SingleFlight<T>) -> usize {
        flights.in_flight.lock().len()
    }

    #[test]
    fn leader_runs_work() {
        let flights = SingleFlight::new();
        let out = flights
            .run(&LinkContext::new(), &ContextId::from("a"), || Ok(7))
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(in_flight(&flights), 0);
    }

    #[test]
    fn sequential_runs_each_execute() {
        let flights = SingleFlight::new();
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            flights
                .run(&LinkContext::new(), &ContextId::from("a"), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cancelled_caller_never_leads() {
        let flights = SingleFlight::<()>::new();
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicUsize::new(0);
        let result = flights.run(
            &LinkContext::with_cancellation(token),
            &ContextId::from("a"),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(in_flight(&flights), 0);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_callers_share_one_run() {
        let flights = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    flights.run(&LinkContext::new(), &ContextId::from("shared"), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(200));
                        Ok(42)
                    })
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().expect("thread should not panic").unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiters_see_leader_failure() {
        let flights = Arc::new(SingleFlight::<()>::new());
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let flights = Arc::clone(&flights);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                flights.run(&LinkContext::new(), &ContextId::from("bad"), || {
                    started.wait();
                    thread::sleep(Duration::from_millis(200));
                    Err(EngineError::NoCallbackRegistered)
                })
            })
        };
        started.wait();
        let joined = flights.run(&LinkContext::new(), &ContextId::from("bad"), || Ok(()));

        assert!(matches!(
            leader.join().unwrap(),
            Err(EngineError::NoCallbackRegistered)
        ));
        assert!(matches!(joined, Err(EngineError::GenerationFailed { .. })));
    }

    #[test]
    fn live_waiter_takes_over_from_cancelled_leader() {
        let flights = Arc::new(SingleFlight::new());
        let started = Arc::new(Barrier::new(2));
        let token = CancellationToken::new();

        let leader = {
            let flights = Arc::clone(&flights);
            let started = Arc::clone(&started);
            let ctx = LinkContext::with_cancellation(token.clone());
            thread::spawn(move || {
                flights.run(&ctx, &ContextId::from("deal"), || {
                    started.wait();
                    thread::sleep(Duration::from_millis(150));
                    ctx.check()?;
                    Ok(1)
                })
            })
        };
        started.wait();
        token.cancel();
        let joined = flights.run(&LinkContext::new(), &ContextId::from("deal"), || Ok(2));

        assert!(matches!(leader.join().unwrap(), Err(EngineError::Cancelled)));
        assert_eq!(joined.unwrap(), 2);
        assert_eq!(in_flight(&flights), 0);
    }

    #[test]
    fn cancelled_waiter_stops_waiting_without_failing_leader() {
        let flights = Arc::new(SingleFlight::new());
        let started = Arc::new(Barrier::new(2));

        let leader = {
            let flights = Arc::clone(&flights);
            let started = Arc::clone(&started);
            thread::spawn(move || {
                flights.run(&LinkContext::new(), &ContextId::from("slow"), || {
                    started.wait();
                    thread::sleep(Duration::from_millis(300));
                    Ok(9)
                })
            })
        };
        started.wait();

        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                token.cancel();
            })
        };
        let waiter = flights.run(
            &LinkContext::with_cancellation(token),
            &ContextId::from("slow"),
            || Ok(0),
        );

        assert!(matches!(waiter, Err(EngineError::Cancelled)));
        canceller.join().unwrap();
        assert_eq!(leader.join().unwrap().unwrap(), 9);
    }
}
