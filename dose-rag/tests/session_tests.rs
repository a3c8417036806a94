//! End-to-end answering through the document assistant.

mod common;

use std::path::Path;
use std::sync::Arc;

use dose_rag::session::NO_DOCUMENTS_INSTRUCTION;
use dose_rag::{
    ChatRequest, Conversation, DocumentAssistant, ErrorKind, LocalFileStore, MessageRole,
    RagConfig,
};

use common::{
    FailingEmbedder, RecordingEmbedder, ScriptedGenerator, docx_bytes, is_rewrite, pdf_bytes,
    write_file,
};

fn assistant(
    dir: &Path,
    config: RagConfig,
    embedder: Arc<RecordingEmbedder>,
    generator: Arc<ScriptedGenerator>,
) -> DocumentAssistant {
    DocumentAssistant::builder()
        .config(config)
        .embedding_provider(embedder)
        .generation_provider(generator)
        .file_store(Arc::new(LocalFileStore::new(dir)))
        .build()
        .unwrap()
}

/// Answers with the first line of context, or a fixed reply when there is none.
fn context_reader() -> ScriptedGenerator {
    ScriptedGenerator::new(|request| {
        let prompt = request.last_user_message().unwrap_or_default();
        Ok(prompt
            .strip_prefix("Context:\n")
            .and_then(|rest| rest.lines().next())
            .unwrap_or("I have no documents to go on.")
            .to_string())
    })
}

#[tokio::test]
async fn answers_from_a_single_text_file() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "france.txt", b"The capital of France is Paris.");
    let embedder = Arc::new(RecordingEmbedder::new());
    let generator = Arc::new(context_reader());
    let assistant = assistant(dir.path(), RagConfig::default(), embedder, generator);

    let result = assistant
        .answer("What is the capital of France?", &["france.txt".to_string()], &[])
        .await
        .unwrap();

    assert!(result.answer.contains("Paris"));
    assert_eq!(result.source_segments.len(), 1);
    assert_eq!(result.source_segments[0].source_id(), "france.txt");
    assert_eq!(result.source_segments[0].text, "The capital of France is Paris.");
}

#[tokio::test]
async fn no_files_bypasses_retrieval() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(RecordingEmbedder::new());
    let generator = Arc::new(context_reader());
    let assistant = assistant(dir.path(), RagConfig::default(), embedder.clone(), generator.clone());

    let result = assistant.answer("Hello, what can you do?", &[], &[]).await.unwrap();

    assert_eq!(result.answer, "I have no documents to go on.");
    assert!(result.source_segments.is_empty());
    assert_eq!(embedder.batch_calls(), 0);
    assert!(embedder.queries().is_empty());

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system_instruction(), Some(NO_DOCUMENTS_INSTRUCTION));
    assert_eq!(requests[0].last_user_message(), Some("Hello, what can you do?"));
}

#[tokio::test]
async fn no_files_still_sees_history() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::echo());
    let assistant =
        assistant(dir.path(), RagConfig::default(), Arc::new(RecordingEmbedder::new()), generator.clone());
    let mut conversation = Conversation::new();
    conversation.record_exchange("My favorite color is blue", "Noted.");

    assistant.answer("What did I just say?", &[], conversation.turns()).await.unwrap();

    let roles: Vec<MessageRole> = generator.requests()[0].messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![MessageRole::System, MessageRole::User, MessageRole::Assistant, MessageRole::User]
    );
}

#[tokio::test]
async fn second_turn_retrieves_with_rewritten_question() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "minutes.txt", b"The board approved the budget.");
    let embedder = Arc::new(RecordingEmbedder::new());
    let generator = Arc::new(ScriptedGenerator::new(|request| {
        if is_rewrite(request) {
            Ok("The user said their favorite color is blue. What did the user say?".into())
        } else {
            Ok("You said your favorite color is blue.".into())
        }
    }));
    let assistant = assistant(dir.path(), RagConfig::default(), embedder.clone(), generator.clone());
    let files = vec!["minutes.txt".to_string()];
    let mut conversation = Conversation::new();

    let first = assistant.answer("My favorite color is blue", &files, conversation.turns()).await.unwrap();
    conversation.record_exchange("My favorite color is blue", first.answer);
    assistant.answer("What did I just say?", &files, conversation.turns()).await.unwrap();

    let queries = embedder.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0], "My favorite color is blue");
    assert!(queries[1].contains("blue"));

    let requests = generator.requests();
    assert_eq!(requests.iter().filter(|r| is_rewrite(r)).count(), 1);
}

#[tokio::test]
async fn missing_file_fails_before_any_indexing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "present.txt", b"Some content.");
    let embedder = Arc::new(RecordingEmbedder::new());
    let generator = Arc::new(ScriptedGenerator::echo());
    let assistant = assistant(dir.path(), RagConfig::default(), embedder.clone(), generator.clone());

    let err = assistant
        .answer("question", &["present.txt".to_string(), "ghost.pdf".to_string()], &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FileNotFound);
    assert_eq!(err.file_id(), Some("ghost.pdf"));
    assert_eq!(embedder.batch_calls(), 0);
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn embedding_failure_during_indexing_ends_the_request() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "france.txt", b"The capital of France is Paris.");
    let generator = Arc::new(ScriptedGenerator::echo());
    let assistant = DocumentAssistant::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(FailingEmbedder))
        .generation_provider(generator.clone())
        .file_store(Arc::new(LocalFileStore::new(dir.path())))
        .build()
        .unwrap();

    let err = assistant
        .answer("What is the capital of France?", &["france.txt".to_string()], &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EmbeddingService);
    assert_eq!(err.stage(), None);
    assert!(generator.requests().is_empty());
}

#[tokio::test]
async fn segments_from_all_formats_are_pooled() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a.txt", b"Alpha text about lighthouses.");
    write_file(dir.path(), "b.pdf", &pdf_bytes(&["Beta page about glaciers"]));
    write_file(dir.path(), "c.docx", &docx_bytes(&["Gamma paragraph about volcanoes."]));
    let embedder = Arc::new(RecordingEmbedder::new());
    let generator = Arc::new(ScriptedGenerator::echo());
    let config = RagConfig::builder().top_k(10).build().unwrap();
    let assistant = assistant(dir.path(), config, embedder, generator);
    let files: Vec<String> = ["a.txt", "b.pdf", "c.docx", "a.txt"].map(String::from).to_vec();

    let result = assistant.answer("Tell me about glaciers", &files, &[]).await.unwrap();

    assert_eq!(result.source_segments.len(), 3);
    assert_eq!(result.source_segments[0].source_id(), "b.pdf");
    let mut sources: Vec<&str> = result.source_segments.iter().map(|s| s.source_id()).collect();
    sources.sort_unstable();
    assert_eq!(sources, vec!["a.txt", "b.pdf", "c.docx"]);
}

#[tokio::test]
async fn cached_index_is_reused_for_the_same_files() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "france.txt", b"The capital of France is Paris.");
    let embedder = Arc::new(RecordingEmbedder::new());
    let config = RagConfig::builder().cache_capacity(4).build().unwrap();
    let assistant =
        assistant(dir.path(), config, embedder.clone(), Arc::new(ScriptedGenerator::echo()));
    let files = vec!["france.txt".to_string()];

    assistant.answer("capital?", &files, &[]).await.unwrap();
    assistant.answer("capital again?", &files, &[]).await.unwrap();
    assert_eq!(embedder.batch_calls(), 1);

    write_file(dir.path(), "france.txt", b"The capital of France is Paris. It sits on the Seine.");
    assistant.answer("river?", &files, &[]).await.unwrap();
    assert_eq!(embedder.batch_calls(), 2);
}

#[tokio::test]
async fn index_is_rebuilt_per_request_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "france.txt", b"The capital of France is Paris.");
    let embedder = Arc::new(RecordingEmbedder::new());
    let assistant = assistant(
        dir.path(),
        RagConfig::default(),
        embedder.clone(),
        Arc::new(ScriptedGenerator::echo()),
    );
    let files = vec!["france.txt".to_string()];

    assistant.answer("capital?", &files, &[]).await.unwrap();
    assistant.answer("capital?", &files, &[]).await.unwrap();
    assert_eq!(embedder.batch_calls(), 2);
}

#[tokio::test]
async fn wire_request_round_trips_through_handle() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "france.txt", b"The capital of France is Paris.");
    let assistant = assistant(
        dir.path(),
        RagConfig::default(),
        Arc::new(RecordingEmbedder::new()),
        Arc::new(context_reader()),
    );
    let request: ChatRequest = serde_json::from_value(serde_json::json!({
        "message": "What is the capital of France?",
        "context": ["france.txt"],
    }))
    .unwrap();

    let response = assistant.handle(request).await.unwrap();

    assert!(response.response.contains("Paris"));
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].source_id, "france.txt");
    assert_eq!(response.sources[0].position, 0);
}
