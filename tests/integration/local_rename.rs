use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tidy_downloads::backends::{DirectoryHost, InferenceApi, LocalFileSystem, MistralClient};
use tidy_downloads::events::{EventPayload, EventType};
use tidy_downloads::models::PodKey;
use tidy_downloads::services::{
    RenameFailure, RenameOutcome, RenamePipeline, RenameRequest, RenameStage,
};
use tidy_downloads::SessionWorker;

use crate::common::{MockInference, test_settings};

fn completion_response(text: &str) -> String {
    json!({
        "id": "cmpl-1",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": text },
                "finish_reason": "stop"
            }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_session_renames_file_on_disk() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion_response("quarterly-report"))
        .expect_at_least(2)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let original = dir.path().join("doc_123.txt");
    std::fs::write(&original, "Revenue grew in Q3").unwrap();

    let mut settings = test_settings();
    settings.renaming.api_url = format!("{}/v1/chat/completions", server.url());
    let client = MistralClient::from_settings(&settings.renaming).unwrap();

    let (handle, worker) = SessionWorker::spawn(
        settings,
        Arc::new(DirectoryHost::new(dir.path())),
        Arc::new(LocalFileSystem::new()),
        Some(Arc::new(client) as Arc<dyn InferenceApi>),
    );
    let mut renamed = handle.bus().subscribe_to_types(vec![EventType::PodRenamed]);

    // Restored downloads are only renamed on request
    let old_key = PodKey::from_path(&original);
    handle.rename(old_key.clone()).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), renamed.recv())
        .await
        .expect("no rename within 10s")
        .unwrap();
    let expected = dir.path().join("quarterly-report.txt");
    match event.payload {
        EventPayload::Rename {
            old_key: from,
            new_key,
            display_name,
        } => {
            assert_eq!(from, old_key);
            assert_eq!(new_key, PodKey::from_path(&expected));
            assert_eq!(display_name, "quarterly-report.txt");
        }
        other => panic!("unexpected payload {:?}", other),
    }

    assert!(expected.exists());
    assert!(!original.exists());
    assert_eq!(
        std::fs::read_to_string(&expected).unwrap(),
        "Revenue grew in Q3"
    );
    mock.assert_async().await;

    handle.shutdown().unwrap();
    worker.await.unwrap();
}

#[tokio::test]
async fn test_pipeline_keeps_existing_files() {
    let dir = TempDir::new().unwrap();
    let original = dir.path().join("IMG_2231.png");
    std::fs::write(&original, [0x89, b'P', b'N', b'G']).unwrap();
    std::fs::write(dir.path().join("team-photo.png"), "taken").unwrap();

    let inference = Arc::new(MockInference::replying(&["Team Photo"]));
    let pipeline = RenamePipeline::new(
        Arc::new(LocalFileSystem::new()),
        inference.clone(),
        test_settings().renaming,
    );

    let request = RenameRequest {
        key: PodKey::from_path(&original),
        path: original.clone(),
        original_name: "IMG_2231.png".to_string(),
        source_url: "https://example.com/IMG_2231.png".to_string(),
    };
    let outcome = pipeline.run(request.clone(), &|_: RenameStage| {}).await;

    let expected = dir.path().join("team-photo-1.png");
    assert_eq!(
        outcome,
        RenameOutcome::Renamed {
            old_path: original.clone(),
            new_path: expected.clone(),
            new_name: "team-photo-1.png".to_string(),
        }
    );
    assert!(expected.exists());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("team-photo.png")).unwrap(),
        "taken"
    );

    let image = inference.requests()[0].image.clone().unwrap();
    assert_eq!(image.mime_type, "image/png");

    // The original path stays claimed after a successful rename
    assert_eq!(
        pipeline.run(request, &|_: RenameStage| {}).await,
        RenameOutcome::Failed(RenameFailure::AlreadyProcessed)
    );
    assert_eq!(inference.call_count(), 1);
}
