//! End-to-end batch runs against a mocked OpenAI endpoint and temporary documents.

use std::fs;
use std::time::Duration;

use tempfile::TempDir;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use survey_lens::batch::{run_score_batch, run_translation_batch, BatchFilter};
use survey_lens::openai::{OpenAiClient, Paced};
use survey_lens::retry::RetryPolicy;
use survey_lens::scoring::{ScorePipeline, ScoreSettings};
use survey_lens::store::{DataStore, SENTINEL_SCORE};
use survey_lens::transcript::Transcript;
use survey_lens::translation::{TranslationPipeline, TranslationSettings};

// ==================== Test Helpers ====================

fn create_openai_response(id: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "object": "chat.completion",
        "created": 1705312200,
        "model": "gpt-4o-2024-08-06",
        "choices": [
            {
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": content
                },
                "finish_reason": "stop"
            }
        ]
    })
}

fn seed_store(dir: &TempDir) -> DataStore {
    let store = DataStore::in_dir(dir.path());
    fs::write(
        &store.questions_file,
        r#"{"questions": [
            {"id": "q1", "textEn": "How happy are you?"},
            {"id": "q2", "textEn": "How much do you trust your neighbours?"}
        ]}"#,
    )
    .expect("write questions");
    fs::write(
        &store.languages_file,
        r#"{
            "en": {"name": "English", "prompt": "10 means very happy, 1 means not at all."},
            "fr": {"name": "French", "prompt": "10 means very happy, 1 means not at all."}
        }"#,
    )
    .expect("write languages");
    store
}

fn client_for(server: &MockServer) -> Paced<OpenAiClient> {
    Paced::new(
        OpenAiClient::new(
            &format!("{}/v1/chat/completions", server.uri()),
            "test-openai-key",
            "gpt-4o-2024-08-06",
        ),
        Duration::ZERO,
    )
}

fn fast_score_settings() -> ScoreSettings {
    ScoreSettings {
        retry: RetryPolicy::new(3, Duration::ZERO),
        ..ScoreSettings::default()
    }
}

async fn mount_reply(server: &MockServer, needle: &str, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains(needle))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(create_openai_response("chatcmpl-abc", content)),
        )
        .mount(server)
        .await;
}

async fn mount_translation_happy_path(server: &MockServer) {
    mount_reply(server, "from English to French", "Êtes-vous heureux ?").await;
    mount_reply(server, "from French to English", "Are you happy?").await;
    mount_reply(server, "translation quality evaluator", "5").await;
}

// ==================== Translation Batch ====================

#[tokio::test]
async fn test_translation_batch_end_to_end_and_idempotent() {
    let server = MockServer::start().await;
    mount_translation_happy_path(&server).await;

    let dir = TempDir::new().expect("temp dir");
    let store = seed_store(&dir);
    let client = client_for(&server);
    let transcript_path = dir.path().join("temp_output.txt");
    let transcript = Transcript::create(&transcript_path).expect("transcript");
    let pipeline = TranslationPipeline::new(&client, &transcript, TranslationSettings::default());

    let report = run_translation_batch(&store, &pipeline, "en", &BatchFilter::default())
        .await
        .expect("batch should run");
    assert_eq!(report.generated, 2);

    let written = fs::read_to_string(&store.translations_file).expect("read translations");
    assert!(written.contains("\"text\": \"Êtes-vous heureux ?\""));
    assert!(written.contains("\"backTranslation\": \"Are you happy?\""));
    assert!(written.contains("\"qualityScore\": 5"));
    assert!(written.contains("\"model\": \"gpt-4o-2024-08-06\""));
    assert!(!written.contains("\"en\""));

    let transcript_text = fs::read_to_string(&transcript_path).expect("read transcript");
    assert!(transcript_text.contains("=== Translation Process for fr ==="));

    // A second run with no force flag makes no calls and leaves the file unchanged
    let requests_before = server.received_requests().await.unwrap_or_default().len();
    let report = run_translation_batch(&store, &pipeline, "en", &BatchFilter::default())
        .await
        .expect("batch should run");
    assert_eq!(report.generated, 0);
    assert_eq!(report.skipped_existing, 2);
    assert_eq!(
        server.received_requests().await.unwrap_or_default().len(),
        requests_before
    );
    assert_eq!(
        fs::read_to_string(&store.translations_file).expect("read translations"),
        written
    );
}

#[tokio::test]
async fn test_translation_batch_back_translation_failure_writes_nothing() {
    let server = MockServer::start().await;
    mount_reply(&server, "from English to French", "Êtes-vous heureux ?").await;
    Mock::given(method("POST"))
        .and(body_string_contains("from French to English"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let store = seed_store(&dir);
    let client = client_for(&server);
    let transcript = Transcript::disabled();
    let pipeline = TranslationPipeline::new(&client, &transcript, TranslationSettings::default());

    let report = run_translation_batch(&store, &pipeline, "en", &BatchFilter::default())
        .await
        .expect("per-pair failures are not fatal");

    assert_eq!(report.failed, 2);
    assert_eq!(report.generated, 0);
    let translations = store.load_translations().expect("load translations");
    assert!(translations.values().all(|by_lang| by_lang.is_empty()));
}

// ==================== Score Batch ====================

#[tokio::test]
async fn test_score_batch_after_translation() {
    let server = MockServer::start().await;
    mount_translation_happy_path(&server).await;
    mount_reply(&server, "respondent in a values survey", "8").await;

    let dir = TempDir::new().expect("temp dir");
    let store = seed_store(&dir);
    let client = client_for(&server);
    let transcript = Transcript::disabled();

    let translate = TranslationPipeline::new(&client, &transcript, TranslationSettings::default());
    let filter = BatchFilter {
        question_id: Some("q1".to_string()),
        ..BatchFilter::default()
    };
    run_translation_batch(&store, &translate, "en", &filter)
        .await
        .expect("translation batch");

    let score = ScorePipeline::new(&client, &transcript, fast_score_settings());
    let report = run_score_batch(&store, &score, "en", &BatchFilter::default())
        .await
        .expect("score batch");

    // q1 in en and fr; q2 only in en because it has no French translation
    assert_eq!(report.generated, 3);
    assert_eq!(report.skipped_missing, 1);

    let scores = store.load_scores().expect("load scores");
    let fr = &scores["q1"]["fr"];
    assert_eq!(fr.score, 8);
    assert_eq!(fr.metadata.attempts, 1);
    assert_eq!(fr.metadata.language_code, "fr");
    assert_eq!(fr.metadata.response_id.as_deref(), Some("chatcmpl-abc"));
    assert_eq!(
        fr.metadata.prompt,
        "Êtes-vous heureux ? 10 means very happy, 1 means not at all."
    );
    assert!(!scores["q2"].contains_key("fr"));

    let written = fs::read_to_string(&store.scores_file).expect("read scores");
    assert!(written.contains("\"system_message\""));
    assert!(written.contains("\"raw_response\": \"8\""));
}

#[tokio::test]
async fn test_score_batch_sentinel_when_model_never_answers_with_a_number() {
    let server = MockServer::start().await;
    mount_reply(&server, "respondent in a values survey", "As an AI, I have no opinion.").await;

    let dir = TempDir::new().expect("temp dir");
    let store = seed_store(&dir);
    let client = client_for(&server);
    let transcript = Transcript::disabled();
    let pipeline = ScorePipeline::new(&client, &transcript, fast_score_settings());
    let filter = BatchFilter {
        question_id: Some("q1".to_string()),
        language_code: Some("en".to_string()),
        force: false,
    };

    let report = run_score_batch(&store, &pipeline, "en", &filter)
        .await
        .expect("score batch");

    assert_eq!(report.sentinel, 1);
    let scores = store.load_scores().expect("load scores");
    assert_eq!(scores["q1"]["en"].score, SENTINEL_SCORE);
    assert_eq!(scores["q1"]["en"].metadata.attempts, 3);
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 3);
}

#[tokio::test]
async fn test_score_batch_force_and_filter() {
    let server = MockServer::start().await;
    mount_reply(&server, "respondent in a values survey", "4").await;

    let dir = TempDir::new().expect("temp dir");
    let store = seed_store(&dir);
    let client = client_for(&server);
    let transcript = Transcript::disabled();
    let pipeline = ScorePipeline::new(&client, &transcript, fast_score_settings());

    run_score_batch(&store, &pipeline, "en", &BatchFilter::default())
        .await
        .expect("first run");
    let before = store.load_scores().expect("load scores");
    let q2_before = before["q2"]["en"].clone();

    // Rerun without force: nothing changes on disk
    let bytes_before = fs::read(&store.scores_file).expect("read scores");
    run_score_batch(&store, &pipeline, "en", &BatchFilter::default())
        .await
        .expect("second run");
    assert_eq!(fs::read(&store.scores_file).expect("read scores"), bytes_before);

    // Forced rerun limited to q1 overwrites q1 only
    let second_server = MockServer::start().await;
    mount_reply(&second_server, "respondent in a values survey", "6").await;
    let second_client = client_for(&second_server);
    let pipeline = ScorePipeline::new(&second_client, &transcript, fast_score_settings());
    let filter = BatchFilter {
        question_id: Some("q1".to_string()),
        language_code: None,
        force: true,
    };
    let report = run_score_batch(&store, &pipeline, "en", &filter)
        .await
        .expect("forced run");
    assert_eq!(report.generated, 1);

    let after = store.load_scores().expect("load scores");
    assert_eq!(before["q1"]["en"].score, 4);
    assert_eq!(after["q1"]["en"].score, 6);
    assert_eq!(after["q2"]["en"], q2_before);
}
