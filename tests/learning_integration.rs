//! The language-learning facade over live HTTP stubs.

#![cfg(feature = "learning")]

mod support;

use linguaflow::{HealthStatus, LanguageLearningService, OrchestratorError};
use serde_json::json;
use support::{Reply, Stack, audio, completion, embedding, transport};

fn learning(stack: &Stack) -> LanguageLearningService {
    let orchestrator = stack
        .config()
        .build_orchestrator_with_transport(transport())
        .unwrap();
    LanguageLearningService::from_orchestrator(orchestrator).unwrap()
}

#[tokio::test]
async fn test_translate_and_examples() {
    let stack = Stack::start(completion("Hallo Welt"), embedding(), audio()).await;
    let service = learning(&stack);

    assert_eq!(service.translate("Hello world").await.unwrap(), "Hallo Welt");
    assert_eq!(service.examples("Akkusativ").await.unwrap(), "Hallo Welt");

    let bodies = stack.llm.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies[0]["messages"][0]["content"],
        "You are a German language translation assistant."
    );
    assert_eq!(
        bodies[1]["messages"][1]["content"],
        "Give me 3 example sentences using the German concept: Akkusativ"
    );
    assert_eq!(stack.embedding.calls(), 0);
    assert_eq!(stack.tts.calls(), 0);
}

#[tokio::test]
async fn test_pronounce_accepts_base64_audio() {
    let stack = Stack::start(
        completion("unused"),
        embedding(),
        Reply::Json(json!({"audio_data": "SUQz", "format": "wav", "sample_rate": 22050})),
    )
    .await;
    let service = learning(&stack);

    let speech = service.pronounce("Guten Tag").await.unwrap();
    assert_eq!(speech.audio, b"ID3".to_vec());
    assert_eq!(speech.format, "wav");
    assert_eq!(speech.sample_rate, Some(22050));
    assert_eq!(
        stack.tts.bodies()[0],
        json!({"text": "Guten Tag", "language": "de"})
    );
}

#[tokio::test]
async fn test_embed_and_learn() {
    let stack = Stack::healthy().await;
    let service = learning(&stack);

    assert_eq!(service.embed("Morgen").await.unwrap(), vec![0.1, 0.2, 0.3]);

    let speech = service.learn("Good morning").await.unwrap();
    assert_eq!(speech.audio, vec![0x49, 0x44, 0x33]);
    assert_eq!(stack.embedding.calls(), 2);
    assert_eq!(stack.llm.calls(), 1);
    assert_eq!(stack.tts.calls(), 1);

    let report = service.health().await;
    assert!(report.all_healthy());
    assert_eq!(report.get("language_model"), Some(HealthStatus::Healthy));
}

#[tokio::test]
async fn test_malformed_completion_is_shape_error() {
    let stack = Stack::start(Reply::Json(json!({"answer": "?"})), embedding(), audio()).await;
    let service = learning(&stack);

    let err = service.translate("Hello").await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::PayloadShape { ref stage, .. } if stage == "language_model"
    ));
}
