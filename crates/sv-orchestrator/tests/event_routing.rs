//! Integration tests for the event router's upstream hook accounting.
//!
//! The transport behind the router must carry at most one hook per command
//! kind, installed when the first listener appears and removed when the last
//! one leaves, however subscriptions and unsubscriptions interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sv_core::{Command, CommandKind, SurfaceId};
use sv_orchestrator::infrastructure::event_router::{CommandUpstream, EventRouter, Subscription};

#[derive(Default)]
struct HookLog {
    live: HashMap<CommandKind, usize>,
    max_live: usize,
    installs: usize,
    removals: usize,
}

#[derive(Default)]
struct RecordingUpstream {
    log: Mutex<HookLog>,
}

impl RecordingUpstream {
    fn live(&self, kind: CommandKind) -> usize {
        self.log.lock().unwrap().live.get(&kind).copied().unwrap_or(0)
    }

    fn max_live(&self) -> usize {
        self.log.lock().unwrap().max_live
    }
}

impl CommandUpstream for RecordingUpstream {
    fn install(&self, kind: CommandKind) {
        let mut log = self.log.lock().unwrap();
        let live = log.live.entry(kind).or_default();
        *live += 1;
        let live = *live;
        log.max_live = log.max_live.max(live);
        log.installs += 1;
    }

    fn remove(&self, kind: CommandKind) {
        let mut log = self.log.lock().unwrap();
        *log.live.entry(kind).or_default() -= 1;
        log.removals += 1;
    }
}

fn noop(router: &EventRouter, kind: CommandKind, scope: Option<SurfaceId>) -> Subscription {
    router.subscribe(kind, scope, |_| {})
}

#[test]
fn test_interleaved_subscriptions_never_stack_hooks() {
    // Arrange
    let upstream = Arc::new(RecordingUpstream::default());
    let router = EventRouter::new(upstream.clone());
    let kind = CommandKind::HostGetDesktopList;

    // Act: a deterministic but irregular sequence of subscribe/unsubscribe.
    let mut held: Vec<Subscription> = Vec::new();
    for step in 0..64u32 {
        if step % 3 == 2 && !held.is_empty() {
            let index = (step as usize * 7) % held.len();
            held.swap_remove(index).unsubscribe();
        } else {
            held.push(noop(&router, kind, Some(SurfaceId(step % 4))));
        }
        // Assert: exactly one hook while anyone listens, zero otherwise.
        let expected = usize::from(!held.is_empty());
        assert_eq!(upstream.live(kind), expected, "step {step}");
    }
    held.clear();

    // Assert
    assert_eq!(upstream.live(kind), 0);
    assert_eq!(upstream.max_live(), 1);
    assert_eq!(router.listener_count(kind), 0);
}

#[test]
fn test_each_kind_gets_its_own_hook() {
    let upstream = Arc::new(RecordingUpstream::default());
    let router = EventRouter::new(upstream.clone());

    let a = noop(&router, CommandKind::ClientMouseInput, None);
    let b = noop(&router, CommandKind::ClientKeyboardInput, None);
    let c = noop(&router, CommandKind::ClientMouseInput, Some(SurfaceId(1)));

    assert_eq!(upstream.live(CommandKind::ClientMouseInput), 1);
    assert_eq!(upstream.live(CommandKind::ClientKeyboardInput), 1);

    drop(a);
    assert_eq!(upstream.live(CommandKind::ClientMouseInput), 1);
    drop(c);
    assert_eq!(upstream.live(CommandKind::ClientMouseInput), 0);
    drop(b);
    assert_eq!(upstream.live(CommandKind::ClientKeyboardInput), 0);
}

#[test]
fn test_repeated_unsubscribe_removes_hook_once() {
    let upstream = Arc::new(RecordingUpstream::default());
    let router = EventRouter::new(upstream.clone());
    let sub = noop(&router, CommandKind::HostDisconnect, Some(SurfaceId(9)));

    sub.unsubscribe();
    sub.unsubscribe();
    drop(sub);

    let log = upstream.log.lock().unwrap();
    assert_eq!(log.installs, 1);
    assert_eq!(log.removals, 1);
}

#[test]
fn test_scoped_listener_only_sees_its_surface() {
    let router = EventRouter::detached();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _scoped = router.subscribe(CommandKind::HostDisconnect, Some(SurfaceId(2)), move |e| {
        sink.lock().unwrap().push(e.origin);
    });

    let first = router.dispatch(SurfaceId(1), Command::HostDisconnect);
    let second = router.dispatch(SurfaceId(2), Command::HostDisconnect);

    assert_eq!((first, second), (0, 1));
    assert_eq!(*seen.lock().unwrap(), vec![SurfaceId(2)]);
}

#[test]
fn test_subscription_outliving_router_is_harmless() {
    let router = EventRouter::detached();
    let sub = noop(&router, CommandKind::ConfigRequest, None);

    drop(router);
    sub.unsubscribe();

    assert!(!sub.is_active());
}
