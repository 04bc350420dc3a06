//! Integration tests for host reconciliation and the host surface flow.
//!
//! The orchestrator is driven the way the UI drives it: configuration updates
//! and scoped commands through the router.  The mock engine stands in for the
//! peer (authentication events, thumbnail batches).

use std::sync::Arc;
use std::time::Duration;

use sv_core::{
    Command, Config, Display, DisplayType, EngineEvent, NativeThumbnail, Notification, PageKind,
    PeerRole, TransportKind,
};
use sv_orchestrator::application::host_session::HostState;
use sv_orchestrator::application::orchestrator::Orchestrator;
use sv_orchestrator::application::SessionContext;
use sv_orchestrator::infrastructure::engine::mock::{EngineCall, MockEngine};
use sv_orchestrator::infrastructure::engine::InstanceId;
use sv_orchestrator::infrastructure::event_router::EventRouter;
use sv_orchestrator::infrastructure::storage::config::MemoryConfigStore;
use sv_orchestrator::infrastructure::ui_surface::mock::MockSurfaceFactory;
use sv_orchestrator::infrastructure::ui_surface::UiSurface;

struct Harness {
    engine: Arc<MockEngine>,
    surfaces: Arc<MockSurfaceFactory>,
    orchestrator: Orchestrator,
}

fn harness(config: Config) -> Harness {
    let engine = Arc::new(MockEngine::new());
    let surfaces = Arc::new(MockSurfaceFactory::new());
    let ctx = SessionContext::new(engine.clone(), EventRouter::detached(), surfaces.clone());
    let orchestrator = Orchestrator::new(ctx, Arc::new(MemoryConfigStore::new(config)));
    Harness {
        engine,
        surfaces,
        orchestrator,
    }
}

fn direct_host(port: &str) -> Config {
    Config {
        start_as_direct_host: true,
        direct_host_port: port.to_string(),
        ..Config::default()
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn host_instances(h: &Harness, transport: TransportKind) -> Vec<InstanceId> {
    h.engine.instances_of(PeerRole::Host, transport)
}

/// Authenticates a peer on the direct host and returns its surface.
async fn authenticate(h: &Harness) -> Arc<sv_orchestrator::infrastructure::ui_surface::mock::MockSurface> {
    let instance = *host_instances(h, TransportKind::Direct).last().unwrap();
    h.engine.emit(instance, EngineEvent::SessionUpdated);
    h.engine.emit(instance, EngineEvent::HostAuthenticated);
    eventually(|| h.surfaces.last(PageKind::DirectHost).is_some()).await;
    h.surfaces.last(PageKind::DirectHost).unwrap()
}

fn thumbnails(n: u32) -> Vec<NativeThumbnail> {
    (0..n)
        .map(|i| NativeThumbnail {
            data: vec![0xAB; 4],
            name: format!("Display {i}"),
            native_id: i,
            display_type: DisplayType::Monitor,
        })
        .collect()
}

// ── Reconciliation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_direct_host_binds_configured_port_then_stops() {
    // Arrange
    let h = harness(direct_host("9051"));

    // Act
    h.orchestrator.init().await;

    // Assert: one direct host, both channels on the configured port.
    let instances = host_instances(&h, TransportKind::Direct);
    assert_eq!(instances.len(), 1);
    let binds: Vec<_> = h
        .engine
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            EngineCall::StartServer {
                reliable,
                unreliable,
                ..
            } => Some((reliable, unreliable)),
            _ => None,
        })
        .collect();
    assert_eq!(
        binds,
        vec![("127.0.0.1:9051".to_string(), "127.0.0.1:9051".to_string())]
    );
    assert!(h.surfaces.opened(PageKind::DirectHost).is_empty(), "no surface before a peer");

    // Arrange: a peer authenticates so a host surface exists.
    let surface = authenticate(&h).await;

    // Act
    h.orchestrator.update_config(Config::default()).await;

    // Assert
    assert!(!h.orchestrator.has_host(TransportKind::Direct).await);
    assert_eq!(h.engine.close_count(instances[0]), 1);
    assert!(surface.is_closed());
    assert_eq!(surface.close_calls(), 1);
}

#[tokio::test]
async fn test_toggling_flag_creates_destroys_creates() {
    // Arrange
    let h = harness(Config::default());
    h.orchestrator.init().await;
    let on = Config {
        start_as_signal_host: true,
        ..Config::default()
    };

    // Act
    h.orchestrator.update_config(on.clone()).await;
    h.orchestrator.update_config(Config::default()).await;
    h.orchestrator.update_config(on.clone()).await;
    h.orchestrator.update_config(on).await;

    // Assert
    let created = host_instances(&h, TransportKind::Signal);
    assert_eq!(created.len(), 2, "one create per off→on edge");
    assert_eq!(h.engine.close_count(created[0]), 1);
    assert_eq!(h.engine.close_count(created[1]), 0);
    assert!(h.orchestrator.has_host(TransportKind::Signal).await);
    assert!(host_instances(&h, TransportKind::Direct).is_empty());
}

#[tokio::test]
async fn test_concurrent_updates_never_start_two_hosts() {
    let h = harness(Config::default());
    let config = direct_host("9051");

    tokio::join!(
        h.orchestrator.update_config(config.clone()),
        h.orchestrator.update_config(config),
    );

    assert_eq!(host_instances(&h, TransportKind::Direct).len(), 1);
}

#[tokio::test]
async fn test_failed_start_leaves_no_host() {
    let h = harness(direct_host("9051"));
    h.engine.fail_start_server("address in use");

    h.orchestrator.init().await;

    assert!(!h.orchestrator.has_host(TransportKind::Direct).await);
    let first = host_instances(&h, TransportKind::Direct)[0];
    assert_eq!(h.engine.close_count(first), 1);
}

// ── Authentication and disconnect ─────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_authentication_keeps_one_surface() {
    let h = harness(direct_host("9051"));
    h.orchestrator.init().await;
    let instance = host_instances(&h, TransportKind::Direct)[0];

    authenticate(&h).await;
    h.engine.emit(instance, EngineEvent::HostAuthenticated);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(h.surfaces.opened(PageKind::DirectHost).len(), 1);
    assert_eq!(
        h.orchestrator.host_state(TransportKind::Direct).await,
        Some(HostState::Authenticated)
    );
}

#[tokio::test]
async fn test_host_surface_close_returns_to_listening() {
    let h = harness(direct_host("9051"));
    h.orchestrator.init().await;
    let surface = authenticate(&h).await;

    surface.close();

    let orchestrator = h.orchestrator.clone();
    let mut settled = false;
    for _ in 0..100 {
        if orchestrator.host_surface(TransportKind::Direct).await.is_none() {
            settled = true;
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(settled, "host surface must be forgotten");
    assert_eq!(
        h.orchestrator.host_state(TransportKind::Direct).await,
        Some(HostState::Listening)
    );
}

// ── Desktop selection ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_desktop_list_two_batches_then_stop() {
    // Arrange
    let h = harness(direct_host("9051"));
    h.orchestrator.init().await;
    let surface = authenticate(&h).await;
    let router = h.orchestrator.router().clone();

    // Act
    router.dispatch(surface.id(), Command::HostGetDesktopList);
    eventually(|| h.engine.last_stream().is_some()).await;
    let stream = h.engine.last_stream().unwrap();
    assert!(h.engine.push_thumbnails(stream, thumbnails(2)));
    assert!(h.engine.push_thumbnails(stream, thumbnails(3)));
    router.dispatch(surface.id(), Command::HostStopDesktopList);
    let late = h.engine.push_thumbnails(stream, thumbnails(1));

    // Assert
    assert!(!late, "stream must be closed once stop is acknowledged");
    let batches: Vec<usize> = surface
        .notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::DesktopList { thumbnails } => Some(thumbnails.len()),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![2, 3]);
    assert_eq!(surface.enter_selection_calls(), 1);
    assert_eq!(surface.exit_selection_calls(), 1);
    assert_eq!(h.engine.thumbnail_close_count(stream), 1);
}

#[tokio::test]
async fn test_selection_update_replaces_shared_displays() {
    let h = harness(direct_host("9051"));
    h.orchestrator.init().await;
    let surface = authenticate(&h).await;
    let router = h.orchestrator.router().clone();

    router.dispatch(
        surface.id(),
        Command::HostUpdateDesktopList {
            displays: vec![Display::monitor(0), Display::window(42)],
            controllable: true,
        },
    );
    router.dispatch(
        surface.id(),
        Command::HostUpdateDesktopList {
            displays: vec![Display::monitor(1)],
            controllable: false,
        },
    );

    let shares = || {
        h.engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::ShareDisplays {
                    displays,
                    controllable,
                    ..
                } => Some((displays, controllable)),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    eventually(|| shares().len() == 2).await;
    assert_eq!(shares()[1], (vec![Display::monitor(1)], false));
    assert_eq!(
        h.orchestrator.host_state(TransportKind::Direct).await,
        Some(HostState::DisplaySharing)
    );
}
