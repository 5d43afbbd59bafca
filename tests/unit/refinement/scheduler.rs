use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::foundation::error::PreviewError;

type Pending = std::pin::Pin<Box<dyn Future<Output = PreviewResult<RgbaImage>>>>;

#[derive(Default)]
struct Probe {
    calls: Rc<Cell<usize>>,
    events: Rc<RefCell<Vec<(u64, RefinementKey, bool)>>>,
}

impl Probe {
    fn emitter(&self) -> impl Fn(RefinementEvent) + 'static {
        let events = Rc::clone(&self.events);
        move |ev| {
            let entry = match ev {
                RefinementEvent::Fired { request, key } => (request, key, false),
                RefinementEvent::Completed { request, key, .. } => (request, key, true),
            };
            events.borrow_mut().push(entry);
        }
    }

    fn request(&self, latency: Duration) -> impl FnOnce() -> Pending + 'static {
        let calls = Rc::clone(&self.calls);
        move || {
            calls.set(calls.get() + 1);
            let fut: Pending = Box::pin(async move {
                tokio::time::sleep(latency).await;
                Ok(RgbaImage::new(2, 2))
            });
            fut
        }
    }

    fn completed(&self) -> Vec<RefinementKey> {
        self.events
            .borrow()
            .iter()
            .filter(|(_, _, done)| *done)
            .map(|(_, k, _)| *k)
            .collect()
    }
}

fn key(n: u32) -> RefinementKey {
    RefinementKey::from_raw(n)
}

#[tokio::test(start_paused = true)]
async fn rapid_changes_issue_one_request_for_the_last_key() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let probe = Probe::default();
            let mut sched = RefinementScheduler::new(Duration::from_millis(850));

            sched.schedule(key(1), probe.request(Duration::ZERO), probe.emitter());
            tokio::time::sleep(Duration::from_millis(300)).await;
            sched.schedule(key(2), probe.request(Duration::ZERO), probe.emitter());
            tokio::time::sleep(Duration::from_millis(300)).await;
            let c = sched.schedule(key(3), probe.request(Duration::ZERO), probe.emitter());
            assert_eq!(sched.pending_key(), Some(key(3)));

            tokio::time::sleep(Duration::from_secs(2)).await;

            assert_eq!(probe.calls.get(), 1);
            assert_eq!(probe.completed(), vec![key(3)]);
            assert!(sched.is_current(c));
            sched.finish(c);
            assert!(!sched.is_current(c));
            assert_eq!(sched.pending_key(), None);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn superseded_in_flight_request_never_completes() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let probe = Probe::default();
            let mut sched = RefinementScheduler::new(Duration::from_millis(100));

            let slow = probe.request(Duration::from_secs(5));
            let a = sched.schedule(key(1), slow, probe.emitter());
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(probe.calls.get(), 1, "A is in flight");

            let fast = probe.request(Duration::from_millis(10));
            let b = sched.schedule(key(2), fast, probe.emitter());
            assert!(!sched.is_current(a));
            tokio::time::sleep(Duration::from_secs(10)).await;

            assert_eq!(probe.calls.get(), 2);
            assert_eq!(probe.completed(), vec![key(2)]);
            assert!(sched.is_current(b));
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn cancel_during_debounce_sends_nothing() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let probe = Probe::default();
            let mut sched = RefinementScheduler::new(Duration::from_millis(850));

            let id = sched.schedule(key(7), probe.request(Duration::ZERO), probe.emitter());
            tokio::time::sleep(Duration::from_millis(200)).await;
            sched.cancel();
            sched.cancel();
            assert!(!sched.is_current(id));

            tokio::time::sleep(Duration::from_secs(3)).await;
            assert_eq!(probe.calls.get(), 0);
            assert!(probe.events.borrow().is_empty());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn failures_are_delivered_as_results() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let seen = Rc::new(RefCell::new(None));
            let sink = Rc::clone(&seen);
            let mut sched = RefinementScheduler::new(Duration::from_millis(10));
            sched.schedule(
                key(9),
                || async { Err(PreviewError::collaborator("synthesis unavailable")) },
                move |ev| {
                    if let RefinementEvent::Completed { result, .. } = ev {
                        *sink.borrow_mut() = Some(result.is_err());
                    }
                },
            );
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(*seen.borrow(), Some(true));
        })
        .await;
}
