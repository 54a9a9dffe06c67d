mod common;

use common::{Call, FakeResolver, Harness, stream_url};
use vodcontrol::{
    FailureKind, LoadRequest, PlaybackFailure, SessionEvent, SessionPhase, SourceCandidate, Title,
};

fn install_candidates(h: &Harness, sources: &[&str]) {
    h.session.set_source_candidates(
        Title {
            id: "42".to_string(),
            display_title: "Show".to_string(),
        },
        sources
            .iter()
            .map(|source| {
                SourceCandidate::new(*source, format!("Source {source}"), format!("{source}-42"))
            })
            .collect(),
    );
}

fn request(source: &str) -> LoadRequest {
    LoadRequest::new(source, format!("{source}-42"), "Show")
}

fn notices(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Notice(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_sweep_visits_each_source_once() {
    let resolver = FakeResolver::default()
        .with_source("a", 3)
        .with_source("b", 3)
        .with_source("c", 3);
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b", "c"]);
    h.session.load_video(request("a").episode(1)).unwrap();

    h.engine().fail("Network request failed");
    h.session.tick();
    let view = h.session.view();
    assert_eq!(view.source.unwrap().source_id, "b");
    assert_eq!(view.episode_index, Some(1));
    assert_eq!(view.phase, SessionPhase::Loading);
    assert_eq!(
        view.failure,
        Some(PlaybackFailure::LoadFailure(FailureKind::Network))
    );

    h.engine().fail("decoder crashed");
    h.session.tick();
    assert_eq!(h.session.view().source.unwrap().source_id, "c");

    h.engine().fail("SSL handshake failed");
    h.session.tick();

    let view = h.session.view();
    assert_eq!(view.phase, SessionPhase::Terminal);
    assert!(!view.is_loading);
    assert_eq!(
        view.failure,
        Some(PlaybackFailure::TerminalFailure(FailureKind::Ssl))
    );
    assert_eq!(
        view.status.unwrap().error.as_deref(),
        Some("SSL handshake failed")
    );
    assert_eq!(
        h.resolver.sources_called(),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
    assert_eq!(
        h.engine().loads(),
        vec![stream_url("a", 1), stream_url("b", 1), stream_url("c", 1)]
    );

    let events = h.drain_events();
    assert!(events.contains(&SessionEvent::PhaseChanged(SessionPhase::Error)));
    assert!(events.contains(&SessionEvent::Failure(PlaybackFailure::TerminalFailure(
        FailureKind::Ssl
    ))));
    assert_eq!(notices(&events).len(), 3);

    // Stalled: no further polling, no auto-retry.
    h.session.tick();
    assert_eq!(h.engine().loads().len(), 3);
}

#[test]
fn test_episode_resolution_failure_falls_back() {
    let resolver = FakeResolver::default()
        .with_failure("a", "Network unreachable")
        .with_source("b", 2);
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b"]);
    h.session.load_video(request("a")).unwrap();

    let view = h.session.view();
    assert_eq!(view.source.unwrap().source_id, "b");
    assert_eq!(h.engine().loads(), vec![stream_url("b", 0)]);
    assert!(
        notices(&h.drain_events())
            .iter()
            .any(|text| text.contains("Network"))
    );
}

#[test]
fn test_empty_episode_list_falls_back() {
    let resolver = FakeResolver::default()
        .with_source("a", 0)
        .with_source("b", 2);
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b"]);
    h.session.load_video(request("a")).unwrap();
    assert_eq!(h.engine().loads(), vec![stream_url("b", 0)]);
}

#[test]
fn test_backend_load_failure_falls_back() {
    let resolver = FakeResolver::default()
        .with_source("a", 2)
        .with_source("b", 2);
    let h = Harness::new(resolver);
    h.engine().failing_urls.insert(stream_url("a", 0));
    install_candidates(&h, &["a", "b"]);
    h.session.load_video(request("a")).unwrap();

    assert_eq!(h.engine().loads(), vec![stream_url("b", 0)]);
    assert_eq!(h.session.view().source.unwrap().source_id, "b");
}

#[test]
fn test_fallback_discards_resume_position() {
    let resolver = FakeResolver::default()
        .with_source("a", 2)
        .with_source("b", 2);
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b"]);
    h.session
        .load_video(request("a").resume_at(45_000))
        .unwrap();

    h.engine().fail("lost connection");
    h.session.tick();
    h.clear_calls();
    h.make_ready(600.0);

    assert!(!h.calls().iter().any(|call| matches!(call, Call::Seek(_))));
    assert_eq!(h.calls(), vec![Call::Play]);
}

#[test]
fn test_stale_error_report_is_ignored() {
    let resolver = FakeResolver::default()
        .with_source("a", 2)
        .with_source("b", 2);
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b"]);
    h.session.load_video(request("a")).unwrap();

    h.session
        .handle_video_error(FailureKind::Network, Some("http://old.cdn/0.m3u8"));
    assert_eq!(h.session.view().source.unwrap().source_id, "a");

    h.session.handle_video_error(FailureKind::Ssl, None);
    let view = h.session.view();
    assert_eq!(view.source.unwrap().source_id, "b");
    assert_eq!(
        view.failure,
        Some(PlaybackFailure::LoadFailure(FailureKind::Ssl))
    );
}

#[test]
fn test_manual_switch_starts_a_new_sweep() {
    let resolver = FakeResolver::default()
        .with_source("a", 2)
        .with_source("b", 2);
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b"]);
    h.session.load_video(request("a")).unwrap();

    h.engine().fail("Network request failed");
    h.session.tick();
    assert_eq!(h.session.view().source.unwrap().source_id, "b");

    h.session.switch_source("a").unwrap();
    h.engine().fail("Network request failed");
    h.session.tick();

    let view = h.session.view();
    assert_eq!(view.source.unwrap().source_id, "b");
    assert_ne!(view.phase, SessionPhase::Terminal);
}

#[test]
fn test_every_source_unresolvable_is_terminal() {
    let resolver = FakeResolver::default()
        .with_failure("a", "Network unreachable")
        .with_failure("b", "Certificate expired");
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b"]);
    h.session.load_video(request("a")).unwrap();

    let view = h.session.view();
    assert_eq!(view.phase, SessionPhase::Terminal);
    assert_eq!(
        view.failure,
        Some(PlaybackFailure::TerminalFailure(FailureKind::Ssl))
    );
    assert!(h.engine().loads().is_empty());
}

#[test]
fn test_fallback_shares_the_loading_deadline() {
    let resolver = FakeResolver::default()
        .with_source("a", 2)
        .with_source("b", 2);
    let h = Harness::new(resolver);
    install_candidates(&h, &["a", "b"]);
    h.session.load_video(request("a")).unwrap();

    h.clock.advance_millis(50_000);
    h.engine().fail("Network request failed");
    h.session.tick();
    assert_eq!(h.session.view().source.unwrap().source_id, "b");

    // The timeout tick is also the first observation of the new stream.
    h.clock.advance_millis(10_000);
    h.session.tick();

    let view = h.session.view();
    assert!(!view.is_loading);
    assert_eq!(view.phase, SessionPhase::Terminal);
    assert_eq!(view.failure, Some(PlaybackFailure::TimeoutFailure));
}
