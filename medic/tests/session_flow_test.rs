//! Session Flow Tests
//!
//! Drive a whole session through the UI boundary only:
//! - navigation between intro, rename and deduplicate
//! - drop acquisition through to the rename handoff
//! - cancellation bubbling from the drop machine to the app machine
//! - warnings for malformed drops

use medic::actors::{AppState, DropState, RenameStep};
use medic::backend::{BackendCall, CollectionReport, Host, ScriptedBackend};
use medic::runtime::Observer;
use medic::Session;
use shared_types::{CollectionResult, FileGroup, NoticeKind, NoticeLevel, SourcePath, UiCommand};
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(2);

async fn start() -> (Session, ScriptedBackend) {
    let (host, backend) = Host::scripted(16);
    let session = Session::start(host, Observer::default())
        .await
        .expect("Failed to start session");
    (session, backend)
}

async fn wait_drop_state(session: &Session, state: DropState) {
    let reached = timeout(WAIT, async {
        loop {
            let snapshot = session.snapshot().await.expect("snapshot");
            if snapshot.drop.as_ref().map(|d| d.state) == Some(state) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "drop machine never reached {state:?}");
}

fn photos(n: usize) -> CollectionResult {
    CollectionResult {
        file_count: n as u64,
        file_groups: (0..n)
            .map(|i| FileGroup {
                key: format!("/shoot/IMG_{i}"),
                paths: vec![format!("/shoot/IMG_{i}.jpg")],
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_full_rename_handoff() {
    let (session, backend) = start().await;

    session.dispatch(UiCommand::NavigateRename).await.unwrap();
    session.wait_for_path("rename.drop", WAIT).await.unwrap();

    session
        .dispatch(UiCommand::InputDropped {
            paths: vec!["/shoot".to_string()],
        })
        .await
        .unwrap();
    wait_drop_state(&session, DropState::Collecting).await;
    let started = timeout(WAIT, async {
        while backend.calls().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "collection was never started");
    assert_eq!(
        backend.calls()[..2],
        [
            BackendCall::ValidateSource(SourcePath::from("/shoot")),
            BackendCall::BeginCollection
        ]
    );

    assert_eq!(backend.complete_collection(photos(3)), 1);
    let page = session.wait_for_path("rename.page", WAIT).await.unwrap();
    assert_eq!(page.state, AppState::Rename(RenameStep::Page));
    assert_eq!(page.context.files_count(), Some(3));

    let input = session.rename_input().await.unwrap();
    assert_eq!(input.source, SourcePath::from("/shoot"));
    assert_eq!(input.file_groups, photos(3).file_groups);

    let snapshot = session.snapshot().await.unwrap();
    assert!(snapshot.drop.is_none());

    session.shutdown().await;
}

#[tokio::test]
async fn test_back_to_drop_starts_over() {
    let (session, backend) = start().await;

    session.dispatch(UiCommand::NavigateRename).await.unwrap();
    session.wait_for_path("rename.drop", WAIT).await.unwrap();
    session
        .dispatch(UiCommand::InputDropped {
            paths: vec!["/shoot".to_string()],
        })
        .await
        .unwrap();
    wait_drop_state(&session, DropState::Collecting).await;
    backend.complete_collection(photos(1));
    session.wait_for_path("rename.page", WAIT).await.unwrap();

    session.dispatch(UiCommand::NavigateToDrop).await.unwrap();
    let app = session.wait_for_path("rename.drop", WAIT).await.unwrap();
    assert!(app.context.is_empty());
    wait_drop_state(&session, DropState::Idle).await;

    let snapshot = session.snapshot().await.unwrap();
    let drop = snapshot.drop.expect("fresh drop machine");
    assert!(drop.context.source.is_none());
    assert_eq!(drop.events_processed, 0);

    session.shutdown().await;
}

#[tokio::test]
async fn test_cancel_returns_to_intro() {
    let (session, backend) = start().await;
    backend.hold_validations();

    session.dispatch(UiCommand::NavigateRename).await.unwrap();
    session.wait_for_path("rename.drop", WAIT).await.unwrap();
    session
        .dispatch(UiCommand::InputDropped {
            paths: vec!["/slow".to_string()],
        })
        .await
        .unwrap();
    wait_drop_state(&session, DropState::Validating).await;

    session.dispatch(UiCommand::Cancel).await.unwrap();
    session.wait_for_path("intro", WAIT).await.unwrap();

    // the abandoned validation resolves into nothing
    backend.release_validations();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.app.state, AppState::Intro);
    assert!(snapshot.drop.is_none());

    // cancel with nothing to cancel is a no-op
    session.dispatch(UiCommand::Cancel).await.unwrap();

    session.shutdown().await;
}

#[tokio::test]
async fn test_malformed_drop_warns() {
    let (session, backend) = start().await;
    let mut notices = session.notices();

    session.dispatch(UiCommand::NavigateRename).await.unwrap();
    session.wait_for_path("rename.drop", WAIT).await.unwrap();
    session
        .dispatch(UiCommand::InputDropped {
            paths: vec!["/a".to_string(), "/b".to_string()],
        })
        .await
        .unwrap();

    let notice = timeout(WAIT, notices.recv()).await.unwrap().unwrap();
    assert_eq!(notice.level, NoticeLevel::Warning);
    assert_eq!(notice.kind, NoticeKind::UserInput);

    let snapshot = session.snapshot().await.unwrap();
    let drop = snapshot.drop.unwrap();
    assert_eq!(drop.state, DropState::Idle);
    assert!(drop.context.source.is_none());
    assert!(backend.calls().is_empty());

    session.shutdown().await;
}

#[tokio::test]
async fn test_drop_outside_rename_is_ignored() {
    let (session, backend) = start().await;

    session
        .dispatch(UiCommand::InputDropped {
            paths: vec!["/a".to_string()],
        })
        .await
        .unwrap();
    session.dispatch(UiCommand::NavigateDeduplicate).await.unwrap();
    session.wait_for_path("deduplicate", WAIT).await.unwrap();
    session.dispatch(UiCommand::NavigateIntro).await.unwrap();
    session.wait_for_path("intro", WAIT).await.unwrap();

    assert!(backend.calls().is_empty());
    session.shutdown().await;
}

#[tokio::test]
async fn test_inspections_cover_every_machine() {
    let (session, _backend) = start().await;
    let mut inspections = session.inspections();

    session.dispatch(UiCommand::NavigateRename).await.unwrap();

    let mut seen_app = false;
    let mut seen_drop = false;
    let collected = timeout(WAIT, async {
        while !(seen_app && seen_drop) {
            let inspection = inspections.recv().await.unwrap();
            match inspection.machine.as_str() {
                "app" if inspection.state == "rename.drop" => seen_app = true,
                "drop" if inspection.state == "idle" => seen_drop = true,
                _ => {}
            }
        }
    })
    .await;
    assert!(collected.is_ok());

    session.shutdown().await;
}

#[tokio::test]
async fn test_abandoned_collection_never_reaches_rename() {
    let (session, backend) = start().await;

    session.dispatch(UiCommand::NavigateRename).await.unwrap();
    session.wait_for_path("rename.drop", WAIT).await.unwrap();
    session
        .dispatch(UiCommand::InputDropped {
            paths: vec!["/shoot-a".to_string()],
        })
        .await
        .unwrap();
    wait_drop_state(&session, DropState::Collecting).await;

    // walk of /shoot-a still running while the user starts over
    session.dispatch(UiCommand::Cancel).await.unwrap();
    session.wait_for_path("intro", WAIT).await.unwrap();
    session.dispatch(UiCommand::NavigateRename).await.unwrap();
    session.wait_for_path("rename.drop", WAIT).await.unwrap();
    session
        .dispatch(UiCommand::InputDropped {
            paths: vec!["/shoot-b".to_string()],
        })
        .await
        .unwrap();
    wait_drop_state(&session, DropState::Collecting).await;

    let stale = CollectionReport::succeeded(SourcePath::from("/shoot-a"), photos(30));
    assert!(backend.push_report(stale) >= 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.app.path, "rename.drop");
    assert_eq!(snapshot.drop.unwrap().state, DropState::Collecting);

    backend.complete_collection(photos(2));
    let page = session.wait_for_path("rename.page", WAIT).await.unwrap();
    assert_eq!(page.context.files_count(), Some(2));
    let input = session.rename_input().await.unwrap();
    assert_eq!(input.source, SourcePath::from("/shoot-b"));
    assert_eq!(input.file_groups, photos(2).file_groups);

    session.shutdown().await;
}

#[tokio::test]
async fn test_cancel_after_drop_child_stopped_is_ignored() {
    let (session, _backend) = start().await;

    session.dispatch(UiCommand::NavigateRename).await.unwrap();
    session.wait_for_path("rename.drop", WAIT).await.unwrap();
    let drop = session.drop_machine().await.unwrap();
    drop.stop(None);
    let stopped = timeout(WAIT, async {
        while drop.get_status() != ractor::ActorStatus::Stopped {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(stopped.is_ok());

    session.dispatch(UiCommand::Cancel).await.unwrap();
    let snapshot = session.snapshot().await.unwrap();
    assert_eq!(snapshot.app.path, "rename.drop");

    session.shutdown().await;
}
