//! Buffers package events until a consumer exists, then replays them.
//!
//! Events are handed to the consumer strictly in arrival order and exactly
//! once. Only one thread drains at a time; it pops under the lock and calls
//! the consumer with the lock released, so consumers may deliver new events
//! or touch other locks freely.

use crate::types::{ChangeKind, PackageChangeConsumer, RawEvent};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// How long to wait before checking again for a consumer.
pub const RECHECK_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcilerState {
    /// Events are buffered.
    NoConsumer,
    /// A consumer is attached and buffered events are being handed over.
    Replaying,
    /// A consumer is attached and the buffer is empty.
    Live,
}

#[derive(Default)]
struct Inner {
    consumer: Option<Arc<dyn PackageChangeConsumer>>,
    buffer: VecDeque<RawEvent>,
    draining: bool,
    recheck_pending: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    recheck_delay: Duration,
}

/// Shared handle; clones refer to the same reconciler.
#[derive(Clone)]
pub struct EventReconciler {
    shared: Arc<Shared>,
}

impl Default for EventReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventReconciler {
    pub fn new() -> Self {
        Self::with_recheck_delay(RECHECK_DELAY)
    }

    pub fn with_recheck_delay(recheck_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner::default()),
                recheck_delay,
            }),
        }
    }

    pub fn state(&self) -> ReconcilerState {
        let inner = self.shared.inner.lock();
        if inner.consumer.is_none() {
            ReconcilerState::NoConsumer
        } else if inner.draining || !inner.buffer.is_empty() {
            ReconcilerState::Replaying
        } else {
            ReconcilerState::Live
        }
    }

    /// Number of events waiting for a consumer.
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().buffer.len()
    }

    /// Accept an event from the platform.
    pub fn deliver(&self, event: RawEvent) {
        {
            let mut inner = self.shared.inner.lock();
            inner.buffer.push_back(event);
            if inner.consumer.is_none() {
                debug!("No consumer yet, {} events buffered", inner.buffer.len());
                schedule_recheck(&self.shared, &mut inner);
                return;
            }
        }
        drain(&self.shared);
    }

    /// Install `consumer` and replay everything buffered so far.
    pub fn attach(&self, consumer: Arc<dyn PackageChangeConsumer>) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.consumer.is_some() {
                warn!("Replacing attached package consumer");
            }
            inner.consumer = Some(consumer);
            info!("Package consumer attached, {} events to replay", inner.buffer.len());
        }
        drain(&self.shared);
    }

    /// Remove the consumer; later events are buffered again.
    pub fn detach(&self) -> Option<Arc<dyn PackageChangeConsumer>> {
        let consumer = self.shared.inner.lock().consumer.take();
        if consumer.is_some() {
            info!("Package consumer detached");
        }
        consumer
    }
}

/// At most one recheck timer runs. It re-arms itself while events are
/// buffered without a consumer and ends once the reconciler is gone.
fn schedule_recheck(shared: &Arc<Shared>, inner: &mut Inner) {
    if inner.recheck_pending {
        return;
    }
    inner.recheck_pending = true;

    let weak = Arc::downgrade(shared);
    let delay = shared.recheck_delay;
    let spawned = thread::Builder::new()
        .name("keikai-recheck".to_string())
        .spawn(move || recheck_loop(weak, delay));

    if let Err(e) = spawned {
        error!("Failed to spawn recheck timer: {}", e);
        inner.recheck_pending = false;
    }
}

fn recheck_loop(weak: Weak<Shared>, delay: Duration) {
    loop {
        thread::sleep(delay);

        let Some(shared) = weak.upgrade() else {
            debug!("Reconciler dropped, recheck timer exiting");
            return;
        };

        {
            let mut inner = shared.inner.lock();
            if inner.buffer.is_empty() {
                inner.recheck_pending = false;
                return;
            }
            if inner.consumer.is_none() {
                debug!("Still no consumer, rechecking in {:?}", delay);
                continue;
            }
            inner.recheck_pending = false;
        }

        drain(&shared);
        return;
    }
}

fn drain(shared: &Arc<Shared>) {
    {
        let mut inner = shared.inner.lock();
        if inner.draining {
            return;
        }
        inner.draining = true;
    }

    loop {
        let (consumer, event) = {
            let mut inner = shared.inner.lock();
            let Some(consumer) = inner.consumer.clone() else {
                inner.draining = false;
                if !inner.buffer.is_empty() {
                    schedule_recheck(shared, &mut inner);
                }
                return;
            };
            let Some(event) = inner.buffer.pop_front() else {
                inner.draining = false;
                return;
            };
            (consumer, event)
        };

        let dispatched =
            panic::catch_unwind(AssertUnwindSafe(|| dispatch(consumer.as_ref(), &event)));
        if dispatched.is_err() {
            error!("Package consumer panicked on {:?}", event);
        }
    }
}

fn dispatch(consumer: &dyn PackageChangeConsumer, event: &RawEvent) {
    let Some(kind) = event.action.kind() else {
        warn!("Dropping {} event for {:?}", event.action, event.packages);
        return;
    };

    for package in &event.packages {
        let package = package.trim_end();
        if package.is_empty() {
            continue;
        }
        debug!("{:?}: {}", kind, package);
        match kind {
            ChangeKind::Appeared => consumer.on_appeared(package),
            ChangeKind::Disappeared => consumer.on_disappeared(package),
            ChangeKind::Modified => consumer.on_modified(package),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PackageAction;
    use pretty_assertions::assert_eq;
    use test_log::test;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl PackageChangeConsumer for Recorder {
        fn on_appeared(&self, package: &str) {
            self.calls.lock().push(format!("+{package}"));
        }

        fn on_disappeared(&self, package: &str) {
            self.calls.lock().push(format!("-{package}"));
        }
    }

    fn added(package: &str) -> RawEvent {
        RawEvent::single(PackageAction::PackageAdded, package)
    }

    #[test]
    fn buffered_events_replay_in_order_once() {
        let reconciler = EventReconciler::with_recheck_delay(Duration::from_millis(20));
        reconciler.deliver(added("a"));
        reconciler.deliver(added("b"));
        assert_eq!(reconciler.state(), ReconcilerState::NoConsumer);
        assert_eq!(reconciler.pending(), 2);

        let recorder = Arc::new(Recorder::default());
        reconciler.attach(recorder.clone());
        // Give the recheck timer a chance to fire; it must not redeliver.
        thread::sleep(Duration::from_millis(100));

        assert_eq!(recorder.calls(), ["+a", "+b"]);
        assert_eq!(reconciler.state(), ReconcilerState::Live);
    }

    #[test]
    fn live_events_dispatch_immediately() {
        let reconciler = EventReconciler::new();
        let recorder = Arc::new(Recorder::default());
        reconciler.attach(recorder.clone());

        reconciler.deliver(RawEvent::new(
            PackageAction::PackageRemoved,
            vec!["one ".into(), "two\n".into(), "   ".into()],
        ));

        assert_eq!(recorder.calls(), ["-one", "-two"]);
    }

    #[test]
    fn modified_is_removal_then_addition() {
        let reconciler = EventReconciler::new();
        let recorder = Arc::new(Recorder::default());
        reconciler.attach(recorder.clone());

        reconciler.deliver(RawEvent::single(PackageAction::PackageReplaced, "app"));

        assert_eq!(recorder.calls(), ["-app", "+app"]);
    }

    #[test]
    fn unknown_actions_are_dropped() {
        let reconciler = EventReconciler::new();
        let recorder = Arc::new(Recorder::default());
        reconciler.attach(recorder.clone());

        reconciler.deliver(RawEvent::single(PackageAction::Unknown("QUERY".into()), "x"));
        reconciler.deliver(added("y"));

        assert_eq!(recorder.calls(), ["+y"]);
    }

    #[test]
    fn detach_returns_to_buffering() {
        let reconciler = EventReconciler::new();
        let recorder = Arc::new(Recorder::default());
        reconciler.attach(recorder.clone());
        assert!(reconciler.detach().is_some());

        reconciler.deliver(added("late"));
        assert_eq!(reconciler.state(), ReconcilerState::NoConsumer);
        assert!(recorder.calls().is_empty());

        reconciler.attach(recorder.clone());
        assert_eq!(recorder.calls(), ["+late"]);
    }

    #[test]
    fn concurrent_delivery_keeps_per_sender_order() {
        let reconciler = EventReconciler::new();
        let recorder = Arc::new(Recorder::default());
        reconciler.attach(recorder.clone());

        let senders: Vec<_> = (0..4)
            .map(|t| {
                let reconciler = reconciler.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        reconciler.deliver(added(&format!("t{t}-{i:03}")));
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().unwrap();
        }

        let calls = recorder.calls();
        assert_eq!(calls.len(), 400);
        for t in 0..4 {
            let prefix = format!("+t{t}-");
            let mine: Vec<_> = calls.iter().filter(|c| c.starts_with(&prefix)).collect();
            assert_eq!(mine.len(), 100);
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn consumer_may_deliver_reentrantly() {
        struct Chain {
            reconciler: EventReconciler,
            seen: Mutex<Vec<String>>,
        }

        impl PackageChangeConsumer for Chain {
            fn on_appeared(&self, package: &str) {
                self.seen.lock().push(package.to_string());
                if package == "first" {
                    self.reconciler.deliver(added("second"));
                }
            }

            fn on_disappeared(&self, _: &str) {}
        }

        let reconciler = EventReconciler::new();
        let chain = Arc::new(Chain {
            reconciler: reconciler.clone(),
            seen: Mutex::new(Vec::new()),
        });
        reconciler.attach(chain.clone());
        reconciler.deliver(added("first"));

        assert_eq!(*chain.seen.lock(), ["first", "second"]);
        // Break the cycle.
        reconciler.detach();
    }

    #[test]
    fn panicking_consumer_does_not_wedge_draining() {
        struct Grumpy(Mutex<usize>);

        impl PackageChangeConsumer for Grumpy {
            fn on_appeared(&self, package: &str) {
                if package == "bad" {
                    panic!("refusing {package}");
                }
                *self.0.lock() += 1;
            }

            fn on_disappeared(&self, _: &str) {}
        }

        let reconciler = EventReconciler::new();
        let grumpy = Arc::new(Grumpy(Mutex::new(0)));
        reconciler.attach(grumpy.clone());

        reconciler.deliver(added("bad"));
        reconciler.deliver(added("good"));

        assert_eq!(*grumpy.0.lock(), 1);
        assert_eq!(reconciler.state(), ReconcilerState::Live);
    }
}
