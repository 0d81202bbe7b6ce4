//! End-to-end tests of ingestion and question answering with the mock
//! embedding provider, the mock model and the in-memory store.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pdfchat_rag::mock::{MockEmbeddingProvider, MockLlm};
use pdfchat_rag::{
    CollectionSpec, DirectoryLoader, DistanceMetric, Document, ErrorKind, InMemoryVectorStore,
    LoadPolicy, LoaderConfig, QaChain, RagConfig, RagError, RagInput, RagPipeline, TextLoader,
};

const DIM: usize = 256;
const COLLECTION: &str = "collectiondb";

fn pipeline_with(store: Arc<InMemoryVectorStore>, dimension: usize) -> RagPipeline {
    RagPipeline::builder()
        .config(RagConfig::builder().chunk_size(200).chunk_overlap(20).top_k(2).build().unwrap())
        .embedding_provider(Arc::new(MockEmbeddingProvider::new(dimension)))
        .vector_store(store, CollectionSpec::new(COLLECTION, DIM, DistanceMetric::Cosine))
        .build()
        .unwrap()
}

async fn seeded_pipeline() -> (Arc<RagPipeline>, Arc<InMemoryVectorStore>) {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone(), DIM);
    pipeline.ensure_collection().await.unwrap();
    pipeline
        .ingest_batch(&[
            Document::new("france", "Paris is the capital of France."),
            Document::new("bananas", "Bananas grow in tropical climates and are rich in potassium."),
            Document::new("rust", "Rust guarantees memory safety without a garbage collector."),
        ])
        .await
        .unwrap();
    (Arc::new(pipeline), store)
}

fn text_loader(root: &Path, policy: LoadPolicy) -> DirectoryLoader {
    DirectoryLoader::new(
        LoaderConfig {
            root: root.to_path_buf(),
            pattern: "**/*.txt".to_string(),
            concurrency: 4,
            policy,
        },
        Arc::new(TextLoader),
    )
}

fn write_corpus(root: &Path, good: usize, bad: usize) {
    for i in 0..good {
        fs::write(
            root.join(format!("good-{i}.txt")),
            format!("Document {i} talks about topic number {i} at some length."),
        )
        .unwrap();
    }
    for i in 0..bad {
        fs::write(root.join(format!("bad-{i}.txt")), [0xff, 0xfe, 0x80, i as u8]).unwrap();
    }
}

#[tokio::test]
async fn ingestion_skips_unreadable_files_and_stores_the_rest() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path(), 4, 2);

    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone(), DIM);
    pipeline.ensure_collection().await.unwrap();

    let report = pipeline
        .ingest_directory(&text_loader(temp.path(), LoadPolicy::SkipAndLog))
        .await
        .unwrap();

    assert_eq!(report.documents, 4);
    assert_eq!(report.failures.len(), 2);
    assert!(!report.is_clean());
    assert!(report.failures.iter().all(|f| f.path.to_string_lossy().contains("bad-")));
    assert!(report.chunks >= 4);
    assert_eq!(store.len(COLLECTION).await, Some(report.chunks));
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test]
async fn abort_policy_stops_at_the_first_bad_file() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path(), 2, 1);

    let pipeline = pipeline_with(Arc::new(InMemoryVectorStore::new()), DIM);
    pipeline.ensure_collection().await.unwrap();

    let err = pipeline
        .ingest_directory(&text_loader(temp.path(), LoadPolicy::Abort))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
}

#[tokio::test]
async fn empty_directory_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(Arc::new(InMemoryVectorStore::new()), DIM);
    pipeline.ensure_collection().await.unwrap();

    let err = pipeline
        .ingest_directory(&text_loader(temp.path(), LoadPolicy::SkipAndLog))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ValidationError(_)));
}

#[tokio::test]
async fn reingesting_the_same_files_does_not_duplicate_chunks() {
    let temp = tempfile::tempdir().unwrap();
    write_corpus(temp.path(), 3, 0);

    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone(), DIM);
    pipeline.ensure_collection().await.unwrap();

    let loader = text_loader(temp.path(), LoadPolicy::SkipAndLog);
    let first = pipeline.ingest_directory(&loader).await.unwrap();
    let second = pipeline.ingest_directory(&loader).await.unwrap();
    assert_eq!(first.chunks, second.chunks);
    assert_eq!(store.len(COLLECTION).await, Some(first.chunks));
}

#[tokio::test]
async fn dimension_mismatch_fails_before_any_write() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone(), DIM / 2);

    let err = pipeline.ensure_collection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert_eq!(store.len(COLLECTION).await, None);
}

#[tokio::test]
async fn stored_chunk_is_its_own_best_match() {
    let (pipeline, _) = seeded_pipeline().await;
    let results = pipeline.retrieve("Paris is the capital of France.", None).await.unwrap();
    assert_eq!(results[0].entry.document_id, "france");
    assert!((results[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn answers_the_capital_question_from_context() {
    let (pipeline, _) = seeded_pipeline().await;
    let llm = MockLlm::scripted(["Paris", " is the capital", " of France."]);
    let chain = QaChain::new(pipeline, Arc::new(llm.clone()));

    let answer = chain.invoke(RagInput::new("What is the capital of France?")).await.unwrap();

    assert_eq!(answer.answer, "Paris is the capital of France.");
    assert_eq!(answer.docs.len(), 2);
    assert_eq!(answer.docs[0].entry.text, "Paris is the capital of France.");
    assert!(answer.docs[0].score >= answer.docs[1].score);

    let prompt = llm.last_prompt().unwrap();
    assert!(prompt.starts_with("\nAnswer given the following context:\nParis is the capital of France."));
    assert!(prompt.ends_with("Question: What is the capital of France?\n"));
    assert_eq!(llm.close_count(), 1);
}

#[tokio::test]
async fn empty_collection_still_answers() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store, DIM);
    pipeline.ensure_collection().await.unwrap();

    let llm = MockLlm::scripted(["I don't know."]);
    let chain = QaChain::new(Arc::new(pipeline), Arc::new(llm.clone()));
    let answer = chain.invoke(RagInput::new("Anything?")).await.unwrap();

    assert!(answer.docs.is_empty());
    assert_eq!(answer.answer, "I don't know.");
    assert!(llm.last_prompt().unwrap().contains("context:\n\n\nQuestion: Anything?"));
}

#[tokio::test]
async fn blank_question_never_reaches_the_model() {
    let (pipeline, _) = seeded_pipeline().await;
    let llm = MockLlm::scripted(["unused"]);
    let chain = QaChain::new(pipeline, Arc::new(llm.clone()));

    let err = chain.invoke(RagInput::new("   ")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(chain.stream(RagInput::new("")).await.is_err());
    assert_eq!(llm.open_count(), 0);
}

#[tokio::test]
async fn streaming_yields_docs_then_tokens() {
    let (pipeline, _) = seeded_pipeline().await;
    let llm = MockLlm::scripted(["Paris", "."]);
    let chain = QaChain::new(pipeline, Arc::new(llm.clone()));

    let mut stream = chain.stream(RagInput::new("What is the capital of France?")).await.unwrap();
    assert_eq!(stream.docs()[0].entry.document_id, "france");

    let mut tokens = Vec::new();
    while let Some(token) = stream.next().await {
        tokens.push(token.unwrap());
    }
    assert_eq!(tokens, vec!["Paris", "."]);
    assert_eq!(stream.partial_answer(), "Paris.");
    assert_eq!(llm.close_count(), 1);
}

#[tokio::test]
async fn cancelling_after_the_first_token_releases_the_model() {
    let (pipeline, _) = seeded_pipeline().await;
    let llm = MockLlm::scripted(["one", "two", "three"]);
    let chain = QaChain::new(pipeline, Arc::new(llm.clone()));

    let mut stream = chain.stream(RagInput::new("What is the capital of France?")).await.unwrap();
    assert_eq!(stream.next_token().await.unwrap().unwrap(), "one");
    assert_eq!(llm.close_count(), 0);

    stream.cancel();
    assert_eq!(llm.open_count(), 1);
    assert_eq!(llm.close_count(), 1);
}

#[tokio::test]
async fn mid_stream_failure_fails_the_whole_answer() {
    let (pipeline, _) = seeded_pipeline().await;
    let chain = QaChain::new(pipeline.clone(), Arc::new(MockLlm::failing_after(["Par"], "reset")));
    let err = chain.invoke(RagInput::new("What is the capital of France?")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);

    let llm = MockLlm::failing_after(["Par"], "reset");
    let chain = QaChain::new(pipeline, Arc::new(llm.clone()));
    let mut stream = chain.stream(RagInput::new("What is the capital of France?")).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "Par");
    assert!(stream.next().await.unwrap().is_err());
    assert!(stream.next().await.is_none());
    drop(stream);
    assert_eq!(llm.close_count(), 1);
}

#[tokio::test]
async fn model_refusing_to_start_is_a_generation_error() {
    let (pipeline, _) = seeded_pipeline().await;
    let chain = QaChain::new(pipeline, Arc::new(MockLlm::failing("quota exceeded")));
    let err = chain.stream(RagInput::new("What is the capital of France?")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Generation);
}

#[tokio::test(start_paused = true)]
async fn stalled_generation_times_out_and_closes() {
    let (pipeline, _) = seeded_pipeline().await;
    let llm = MockLlm::stalled();
    let chain = QaChain::new(pipeline, Arc::new(llm.clone()))
        .with_generation_timeout(Duration::from_secs(5));

    let err = chain.invoke(RagInput::new("What is the capital of France?")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(llm.close_count(), 1);
}

#[tokio::test]
async fn concurrent_questions_share_one_chain() {
    let (pipeline, _) = seeded_pipeline().await;
    let chain = Arc::new(QaChain::new(pipeline, Arc::new(MockLlm::echo())));

    let questions = ["capital of France?", "What grows in tropical climates?", "memory safety?"];
    let answers = futures::future::join_all(
        questions.iter().map(|q| {
            let chain = chain.clone();
            async move { chain.invoke(RagInput::new(*q)).await }
        }),
    )
    .await;

    for (question, answer) in questions.iter().zip(answers) {
        let answer = answer.unwrap();
        let last_word = question.split_whitespace().last().unwrap();
        assert!(answer.answer.trim_end().ends_with(last_word));
    }
}
