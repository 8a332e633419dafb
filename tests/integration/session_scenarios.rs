use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tidy_downloads::backends::{HostAction, MemoryFileSystem, MemoryHost};
use tidy_downloads::events::{EventPayload, EventType};
use tidy_downloads::models::{LifecyclePhase, RenameStatus};
use tidy_downloads::services::{DetailPanel, Direction};
use tidy_downloads::utils::InferenceError;

use crate::common::{
    DownloadBuilder, MockInference, Reply, TestContext, advance, key, settings_without_stable_focus,
    settle, test_settings,
};

const MB: u64 = 1024 * 1024;

#[tokio::test(start_paused = true)]
async fn test_completed_jpeg_is_renamed_from_image() {
    let ctx = TestContext::start(test_settings(), Some(MockInference::replying(&["red-sports-car"])));
    ctx.fs.add_file("/dl/IMG_0001.jpg", vec![0xAB; 2 * MB as usize]);
    let mut renames = ctx.handle.bus().subscribe_to_types(vec![EventType::PodRenamed]);

    let download = DownloadBuilder::new("/dl/IMG_0001.jpg").with_content_type("image/jpeg");
    ctx.host.add(download.build());
    settle().await;
    ctx.host.change(
        DownloadBuilder::new("/dl/IMG_0001.jpg")
            .with_content_type("image/jpeg")
            .succeeded()
            .build(),
    );
    advance(2000).await;

    let new_key = key("/dl/red-sports-car.jpg");
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.order, vec![new_key.clone()]);

    let pod = snapshot.pod(&new_key).unwrap();
    assert_eq!(pod.rename_status, RenameStatus::Renamed);
    assert_eq!(pod.status_text, "Download renamed to:");
    assert_eq!(pod.display_name, "red-sports-car.jpg");
    assert!(pod.can_undo);
    assert!(ctx.fs.contains(Path::new("/dl/red-sports-car.jpg")));

    let requests = ctx.inference().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].image.as_ref().unwrap().mime_type, "image/jpeg");

    assert!(ctx.host.actions().iter().any(|action| matches!(
        action,
        HostAction::UpdateTarget(_, path) if path == Path::new("/dl/red-sports-car.jpg")
    )));

    let event = renames.recv().await.unwrap();
    match event.payload {
        EventPayload::Rename {
            old_key,
            new_key: renamed_to,
            display_name,
        } => {
            assert_eq!(old_key, key("/dl/IMG_0001.jpg"));
            assert_eq!(renamed_to, new_key);
            assert_eq!(display_name, "red-sports-car.jpg");
        }
        other => panic!("unexpected payload {:?}", other),
    }

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_oversized_file_skips_network_and_still_autohides() {
    let ctx = TestContext::start(test_settings(), Some(MockInference::replying(&["unused"])));
    ctx.fs.add_sized_file("/dl/archive.zip", 60 * MB);

    ctx.host
        .add(DownloadBuilder::new("/dl/archive.zip").succeeded().build());
    advance(2000).await;

    let archive = key("/dl/archive.zip");
    let snapshot = ctx.snapshot().await;
    let pod = snapshot.pod(&archive).unwrap();
    assert_eq!(pod.rename_status, RenameStatus::Failed);
    assert_eq!(pod.status_text, "File too large for AI analysis");
    assert_eq!(ctx.inference().call_count(), 0);
    assert_eq!(snapshot.autohide_scheduled, vec![archive.clone()]);

    // Detail fade, then removal
    advance(15_100).await;
    advance(150).await;
    let snapshot = ctx.snapshot().await;
    assert!(snapshot.order.is_empty());
    assert_eq!(snapshot.dismissed, vec![archive]);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_each_completion_takes_focus_without_stable_focus() {
    let ctx = TestContext::start(settings_without_stable_focus(), None);

    for path in ["/dl/a.pdf", "/dl/b.pdf", "/dl/c.pdf"] {
        ctx.host.add(DownloadBuilder::new(path).succeeded().build());
        let snapshot = ctx.snapshot().await;
        assert_eq!(snapshot.focused, Some(key(path)));
    }

    let snapshot = ctx.snapshot().await;
    assert_eq!(
        snapshot.order,
        vec![key("/dl/a.pdf"), key("/dl/b.pdf"), key("/dl/c.pdf")]
    );
    assert_eq!(snapshot.detail, DetailPanel::Shown(key("/dl/c.pdf")));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_forward_rotation_from_oldest_focus() {
    let ctx = TestContext::start(test_settings(), None);
    for path in ["/dl/a.iso", "/dl/b.iso", "/dl/c.iso"] {
        ctx.host.add(DownloadBuilder::new(path).build());
    }

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.focused, Some(key("/dl/a.iso")));

    ctx.handle.rotate(Direction::Forward).unwrap();
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.focused, Some(key("/dl/c.iso")));
    assert_eq!(
        snapshot.order,
        vec![key("/dl/a.iso"), key("/dl/b.iso"), key("/dl/c.iso")]
    );

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rotation_round_trip() {
    let ctx = TestContext::start(settings_without_stable_focus(), None);
    for path in ["/dl/1.bin", "/dl/2.bin", "/dl/3.bin", "/dl/4.bin"] {
        ctx.host.add(DownloadBuilder::new(path).build());
    }
    let before = ctx.snapshot().await;
    assert_eq!(before.focused, Some(key("/dl/4.bin")));

    ctx.handle.rotate(Direction::Forward).unwrap();
    let rotated = ctx.snapshot().await;
    assert_eq!(rotated.focused, Some(key("/dl/3.bin")));

    ctx.handle.rotate(Direction::Backward).unwrap();
    let after = ctx.snapshot().await;
    assert_eq!(after.order, before.order);
    assert_eq!(after.focused, before.focused);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_analysis_aborts_then_retry_succeeds() {
    let inference = MockInference::new([Reply::Hang, Reply::Text("city-skyline".to_string())]);
    let ctx = TestContext::start(test_settings(), Some(inference));
    ctx.fs.add_file("/dl/photo.png", vec![1, 2, 3]);
    let photo = key("/dl/photo.png");

    ctx.host
        .add(DownloadBuilder::new("/dl/photo.png").succeeded().build());
    advance(2000).await;

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.active_renames, vec![photo.clone()]);
    assert_eq!(
        snapshot.pod(&photo).unwrap().rename_status,
        RenameStatus::Analyzing
    );

    ctx.handle.cancel_download(photo.clone()).unwrap();
    let snapshot = ctx.snapshot().await;
    let pod = snapshot.pod(&photo).unwrap();
    assert!(snapshot.active_renames.is_empty());
    assert_eq!(pod.rename_status, RenameStatus::Idle);
    assert_eq!(pod.phase, LifecyclePhase::UserCanceled);
    assert!(ctx.fs.renames().is_empty());
    assert!(matches!(ctx.host.actions()[0], HostAction::Cancel(_)));

    // Aborting released the file for another attempt
    ctx.handle.rename(photo.clone()).unwrap();
    let snapshot = ctx.snapshot().await;
    let renamed = key("/dl/city-skyline.png");
    assert_eq!(snapshot.order, vec![renamed.clone()]);
    assert_eq!(
        snapshot.pod(&renamed).unwrap().rename_status,
        RenameStatus::Renamed
    );

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_rename_requests_rename_once() {
    let ctx = TestContext::start(
        test_settings(),
        Some(MockInference::replying(&["quarterly-report", "other-name"])),
    );
    ctx.fs.add_file("/dl/doc_123.pdf", "pdf");
    let doc = key("/dl/doc_123.pdf");

    ctx.host
        .add(DownloadBuilder::new("/dl/doc_123.pdf").succeeded().build());
    settle().await;
    ctx.handle.rename(doc.clone()).unwrap();
    ctx.handle.rename(doc.clone()).unwrap();
    advance(2000).await;

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.order, vec![key("/dl/quarterly-report.pdf")]);
    assert_eq!(ctx.fs.renames().len(), 1);
    assert_eq!(ctx.inference().call_count(), 1);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rename_avoids_existing_names() {
    let ctx = TestContext::start(test_settings(), Some(MockInference::replying(&["name"])));
    ctx.fs.add_file("/dl/download.ext", "new");
    ctx.fs.add_file("/dl/name.ext", "old");

    ctx.host
        .add(DownloadBuilder::new("/dl/download.ext").succeeded().build());
    advance(2000).await;

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.order, vec![key("/dl/name-1.ext")]);
    assert!(ctx.fs.contains(Path::new("/dl/name.ext")));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rename_leaves_no_reference_to_old_key() {
    let ctx = TestContext::start(test_settings(), Some(MockInference::replying(&["beach-sunset"])));
    ctx.fs.add_file("/dl/DSC0042.jpg", vec![0; 64]);
    ctx.fs.add_file("/dl/notes.txt", "notes");

    ctx.host
        .add(DownloadBuilder::new("/dl/notes.txt").build());
    ctx.host
        .add(DownloadBuilder::new("/dl/DSC0042.jpg").succeeded().build());
    advance(2000).await;

    let old = key("/dl/DSC0042.jpg");
    let new = key("/dl/beach-sunset.jpg");
    let snapshot = ctx.snapshot().await;

    assert!(!snapshot.order.contains(&old));
    assert_eq!(snapshot.order, vec![key("/dl/notes.txt"), new.clone()]);
    assert_eq!(snapshot.focused, Some(new.clone()));
    assert_eq!(snapshot.detail, DetailPanel::Shown(new.clone()));
    assert_eq!(snapshot.autohide_scheduled, vec![new]);
    assert!(snapshot.active_renames.is_empty());

    // A late echo carrying the old path does not bring the old key back
    ctx.host
        .change(DownloadBuilder::new("/dl/DSC0042.jpg").succeeded().build());
    let snapshot = ctx.snapshot().await;
    assert!(!snapshot.order.contains(&old));
    assert_eq!(snapshot.order.len(), 2);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_undo_moves_file_back() {
    let ctx = TestContext::start(test_settings(), Some(MockInference::replying(&["red-sports-car"])));
    ctx.fs.add_file("/dl/IMG_0001.jpg", vec![0; 16]);
    let mut undone = ctx
        .handle
        .bus()
        .subscribe_to_types(vec![EventType::PodRenameUndone]);

    ctx.host
        .add(DownloadBuilder::new("/dl/IMG_0001.jpg").succeeded().build());
    advance(2000).await;
    ctx.handle.undo(key("/dl/red-sports-car.jpg")).unwrap();

    let original = key("/dl/IMG_0001.jpg");
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.order, vec![original.clone()]);
    let pod = snapshot.pod(&original).unwrap();
    assert_eq!(pod.rename_status, RenameStatus::Idle);
    assert_eq!(pod.status_text, "Rename undone");
    assert!(!pod.can_undo);
    assert!(ctx.fs.contains(Path::new("/dl/IMG_0001.jpg")));

    let record = &ctx.host.records()[0];
    assert_eq!(record.path, Some(PathBuf::from("/dl/IMG_0001.jpg")));
    assert_eq!(record.suggested_name, None);

    let event = undone.recv().await.unwrap();
    assert_eq!(event.pod_key(), Some(&original));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_order_stays_unique_and_focus_valid() {
    let ctx = TestContext::start(settings_without_stable_focus(), None);
    let paths = ["/dl/a", "/dl/b", "/dl/c", "/dl/d", "/dl/e"];
    let mut seed: u64 = 42;
    let mut next = move |bound: usize| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((seed >> 33) as usize) % bound
    };

    for _ in 0..60 {
        let path = paths[next(paths.len())];
        let download = DownloadBuilder::new(path);
        match next(6) {
            0 => ctx.host.add(download.build()),
            1 => ctx.host.change(download.with_progress(10, 100).build()),
            2 => ctx.host.change(download.succeeded().build()),
            3 => ctx.host.remove(&download.build()),
            4 => ctx.handle.rotate(Direction::Forward).unwrap(),
            _ => ctx.handle.rotate(Direction::Backward).unwrap(),
        }

        let snapshot = ctx.snapshot().await;
        let unique: HashSet<_> = snapshot.order.iter().collect();
        assert_eq!(unique.len(), snapshot.order.len(), "duplicate in {:?}", snapshot.order);
        match &snapshot.focused {
            Some(focused) => assert!(snapshot.order.contains(focused)),
            None => assert!(snapshot.order.is_empty()),
        }
    }

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_restore_and_erase() {
    let ctx = TestContext::start(test_settings(), None);
    let mut dismissed_events = ctx
        .handle
        .bus()
        .subscribe_to_types(vec![EventType::PodDismissed, EventType::DownloadErased]);
    let a = key("/dl/a.zip");
    let b = key("/dl/b.zip");

    ctx.host.add(DownloadBuilder::new("/dl/a.zip").succeeded().build());
    ctx.host.add(DownloadBuilder::new("/dl/b.zip").succeeded().build());
    settle().await;
    ctx.handle.close(a.clone()).unwrap();

    let event = dismissed_events.recv().await.unwrap();
    assert_eq!(event.event_type, EventType::PodDismissed);
    match &event.payload {
        EventPayload::Pod { key, snapshot } => {
            assert_eq!(key, &a);
            assert_eq!(snapshot.display_name, "a.zip");
        }
        other => panic!("unexpected payload {:?}", other),
    }

    let listed = ctx.handle.list_dismissed().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, a);

    assert!(ctx.handle.restore(a.clone()).await.unwrap());
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.order, vec![b.clone(), a.clone()]);
    assert!(snapshot.dismissed.is_empty());

    // Erasing from host history works for live pods as well
    ctx.handle.delete_permanently(a.clone()).await.unwrap().unwrap();
    let event = dismissed_events.recv().await.unwrap();
    assert_eq!(event.event_type, EventType::DownloadErased);
    assert_eq!(event.pod_key(), Some(&a));

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.order, vec![b]);
    assert!(snapshot.dismissed.is_empty());
    assert_eq!(ctx.host.records().len(), 1);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_restore_fails_once_host_forgot_download() {
    let ctx = TestContext::start(test_settings(), None);
    let record = DownloadBuilder::new("/dl/gone.zip").succeeded().build();
    let gone = key("/dl/gone.zip");

    ctx.host.add(record.clone());
    ctx.host.add(DownloadBuilder::new("/dl/other.zip").succeeded().build());
    settle().await;
    ctx.handle.close(gone.clone()).unwrap();
    settle().await;

    ctx.host.remove(&record);
    assert!(!ctx.handle.restore(gone).await.unwrap());
    assert!(ctx.handle.list_dismissed().await.unwrap().is_empty());

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_startup_rebuilds_recent_downloads_only() {
    let host = Arc::new(MemoryHost::with_records(vec![
        DownloadBuilder::new("/dl/old.zip")
            .succeeded()
            .started_hours_ago(48)
            .build(),
        DownloadBuilder::new("/dl/recent.zip")
            .succeeded()
            .started_hours_ago(2)
            .build(),
        DownloadBuilder::new("/dl/running.iso")
            .started_hours_ago(72)
            .build(),
    ]));
    let ctx = TestContext::start_with(
        test_settings(),
        host,
        Arc::new(MemoryFileSystem::new()),
        Some(MockInference::replying(&["should-not-be-used"])),
    );

    let snapshot = ctx.snapshot().await;
    assert_eq!(
        snapshot.order,
        vec![key("/dl/running.iso"), key("/dl/recent.zip")]
    );
    assert!(snapshot.ai_enabled);

    advance(2000).await;
    assert_eq!(ctx.inference().call_count(), 0);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_host_disables_ai() {
    let ctx = TestContext::start_with(
        test_settings(),
        Arc::new(MemoryHost::unavailable()),
        Arc::new(MemoryFileSystem::new()),
        Some(MockInference::replying(&["unused"])),
    );

    let snapshot = ctx.snapshot().await;
    assert!(!snapshot.ai_enabled);
    assert!(snapshot.order.is_empty());

    let history = ctx.handle.bus().get_history().await;
    assert!(
        history
            .iter()
            .any(|event| event.event_type == EventType::AiRenamingDisabled)
    );

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rejected_key_disables_ai_but_keeps_pods() {
    let ctx = TestContext::start(test_settings(), Some(MockInference::rejecting_key()));
    ctx.fs.add_file("/dl/report.pdf", "pdf");

    ctx.host
        .add(DownloadBuilder::new("/dl/report.pdf").succeeded().build());
    advance(2000).await;

    let snapshot = ctx.snapshot().await;
    assert!(!snapshot.ai_enabled);
    assert_eq!(snapshot.order, vec![key("/dl/report.pdf")]);
    assert_eq!(ctx.inference().call_count(), 0);
    assert_eq!(snapshot.autohide_scheduled, vec![key("/dl/report.pdf")]);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_surfaces_status() {
    let inference = MockInference::new([Reply::Error(InferenceError::RateLimited {
        retry_after: None,
    })]);
    let ctx = TestContext::start(test_settings(), Some(inference));
    ctx.fs.add_file("/dl/data.csv", "a,b");

    ctx.host
        .add(DownloadBuilder::new("/dl/data.csv").succeeded().build());
    advance(2000).await;

    let snapshot = ctx.snapshot().await;
    let pod = snapshot.pod(&key("/dl/data.csv")).unwrap();
    assert_eq!(pod.status_text, "API rate limit reached");
    assert_eq!(pod.rename_status, RenameStatus::Failed);

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_restarted_download_drops_old_attempt() {
    let ctx = TestContext::start(test_settings(), None);
    let setup = key("/dl/setup.exe");

    ctx.host.add(DownloadBuilder::new("/dl/setup.exe").build());
    ctx.host
        .change(DownloadBuilder::new("/dl/setup.exe").errored("Network failure").build());
    let snapshot = ctx.snapshot().await;
    let pod = snapshot.pod(&setup).unwrap();
    assert_eq!(pod.status_text, "Download failed");
    assert_eq!(pod.progress_text, "Network failure");
    assert_eq!(snapshot.autohide_scheduled, vec![setup.clone()]);

    ctx.handle.resume(setup.clone()).unwrap();
    settle().await;
    ctx.host
        .change(DownloadBuilder::new("/dl/setup.exe").with_progress(50, 100).build());

    let snapshot = ctx.snapshot().await;
    let pod = snapshot.pod(&setup).unwrap();
    assert_eq!(pod.phase, LifecyclePhase::Downloading);
    assert!(snapshot.autohide_scheduled.is_empty());
    assert!(matches!(ctx.host.actions()[0], HostAction::Start(_)));

    ctx.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_open_hands_finished_file_to_host() {
    let ctx = TestContext::start(test_settings(), None);
    ctx.fs.add_file("/dl/manual.pdf", "%PDF-1.7");
    settle().await;

    ctx.host
        .add(DownloadBuilder::new("/dl/manual.pdf").succeeded().build());
    ctx.host.add(DownloadBuilder::new("/dl/movie.mkv").build());
    settle().await;

    ctx.handle.open(key("/dl/movie.mkv")).unwrap();
    ctx.handle.open(key("/dl/manual.pdf")).unwrap();
    settle().await;

    let actions = ctx.host.actions();
    assert_eq!(actions.len(), 1);
    match &actions[0] {
        HostAction::Launch(record) => {
            assert_eq!(record.path.as_deref(), Some(Path::new("/dl/manual.pdf")))
        }
        other => panic!("unexpected action {:?}", other),
    }

    ctx.shutdown().await;
}
