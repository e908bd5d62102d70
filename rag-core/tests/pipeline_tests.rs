//! Integration tests for the ingestion loop and the cached query flow.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rag_core::{
    Chunker, Document, DocumentLoader, Embedder, ErrorContext, ErrorHandler, IngestOutcome,
    IngestStage, InMemoryVectorStore, LoadOptions, Metadata, Operation, QUERY_FAILURE_MESSAGE,
    RagConfig, RagError, RagPipeline, Result, SearchResult, TextGenerator, TwoStageChunker,
    VectorStore,
};
use serde_json::json;

// ── Mocks ──────────────────────────────────────────────────────────

/// Serves `pages` in order, then empty pages. Records every (limit, offset).
#[derive(Default)]
struct PagedLoader {
    pages: Vec<Vec<Document>>,
    fail_at_call: Option<usize>,
    calls: Mutex<Vec<(usize, usize)>>,
}

impl PagedLoader {
    fn new(pages: Vec<Vec<Document>>) -> Self {
        Self { pages, ..Default::default() }
    }

    fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentLoader for PagedLoader {
    async fn load(&self, limit: usize, offset: usize, _extra: &LoadOptions) -> Result<Vec<Document>> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push((limit, offset));
        if self.fail_at_call == Some(index) {
            return Err(RagError::Loader { source_name: "mock".into(), message: "unreachable".into() });
        }
        Ok(self.pages.get(index).cloned().unwrap_or_default())
    }
}

/// Returns a constant vector per text and records the batch sizes it saw.
#[derive(Default)]
struct CountingEmbedder {
    batches: Mutex<Vec<usize>>,
    drop_one: bool,
    fail: bool,
}

impl CountingEmbedder {
    fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.lock().unwrap().push(texts.len());
        if self.fail {
            return Err(RagError::Embedding { provider: "mock".into(), message: "throttled".into() });
        }
        let n = if self.drop_one { texts.len().saturating_sub(1) } else { texts.len() };
        Ok(vec![vec![1.0, 0.0, 0.0]; n])
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        3
    }
}

/// Records adds and serves a fixed search result.
#[derive(Default)]
struct RecordingStore {
    adds: Mutex<Vec<(usize, usize, usize)>>,
    searches: Mutex<Vec<(String, usize)>>,
    results: Vec<SearchResult>,
    fail_add: bool,
    fail_search: bool,
}

#[async_trait]
impl VectorStore for RecordingStore {
    async fn add(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        embeddings: Option<Vec<Vec<f32>>>,
    ) -> Result<()> {
        self.adds.lock().unwrap().push((
            texts.len(),
            metadatas.map_or(0, <[Metadata]>::len),
            embeddings.map_or(0, |e| e.len()),
        ));
        if self.fail_add {
            return Err(RagError::VectorStore { backend: "mock".into(), message: "disk full".into() });
        }
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.searches.lock().unwrap().push((query.to_string(), k));
        if self.fail_search {
            return Err(RagError::VectorStore { backend: "mock".into(), message: "connection reset".into() });
        }
        Ok(self.results.clone())
    }
}

/// Echoes a fixed answer, or fails for the first `failures` calls.
#[derive(Default)]
struct ScriptedGenerator {
    prompts: Mutex<Vec<String>>,
    failures: usize,
}

impl ScriptedGenerator {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());
        if prompts.len() <= self.failures {
            return Err(RagError::Generation { provider: "mock".into(), message: "timeout".into() });
        }
        Ok("X is a thing.".to_string())
    }
}

#[derive(Default)]
struct CollectingHandler {
    seen: Mutex<Vec<(ErrorContext, String)>>,
}

impl CollectingHandler {
    fn seen(&self) -> Vec<(ErrorContext, String)> {
        self.seen.lock().unwrap().clone()
    }
}

impl ErrorHandler for CollectingHandler {
    fn handle_error(&self, context: &ErrorContext, error: &RagError) {
        self.seen.lock().unwrap().push((context.clone(), error.kind().to_string()));
    }
}

/// Chunker that yields nothing, to exercise the empty-batch path.
struct NothingChunker;

impl Chunker for NothingChunker {
    fn chunk(&self, _document: &Document) -> Result<Vec<rag_core::Chunk>> {
        Ok(Vec::new())
    }
}

// ── Harness ────────────────────────────────────────────────────────

fn doc(content: &str, id: u64) -> Document {
    let mut metadata = Metadata::new();
    metadata.insert("id".to_string(), json!(id));
    Document::new(content, metadata)
}

struct Harness {
    loader: Arc<PagedLoader>,
    embedder: Arc<CountingEmbedder>,
    store: Arc<RecordingStore>,
    generator: Arc<ScriptedGenerator>,
    handler: Arc<CollectingHandler>,
}

impl Harness {
    fn new(loader: PagedLoader) -> Self {
        Self {
            loader: Arc::new(loader),
            embedder: Arc::new(CountingEmbedder::default()),
            store: Arc::new(RecordingStore::default()),
            generator: Arc::new(ScriptedGenerator::default()),
            handler: Arc::new(CollectingHandler::default()),
        }
    }

    fn pipeline(&self, config: RagConfig, chunker: Arc<dyn Chunker>) -> RagPipeline {
        RagPipeline::builder()
            .config(config)
            .loader(self.loader.clone())
            .chunker(chunker)
            .embedder(self.embedder.clone())
            .vector_store(self.store.clone())
            .generator(self.generator.clone())
            .error_handler(self.handler.clone())
            .build()
            .unwrap()
    }

    fn default_pipeline(&self) -> RagPipeline {
        self.pipeline(RagConfig::default(), Arc::new(TwoStageChunker::default()))
    }
}

fn small_batches(batch_size: usize) -> RagConfig {
    RagConfig::builder().batch_size(batch_size).build().unwrap()
}

// ── Ingestion ──────────────────────────────────────────────────────

#[tokio::test]
async fn ingestion_pages_until_empty() {
    let pages = vec![
        vec![doc("one", 1), doc("two", 2)],
        vec![doc("three", 3), doc("four", 4)],
        vec![doc("five", 5), doc("six", 6)],
    ];
    let h = Harness::new(PagedLoader::new(pages));
    let outcome = h.pipeline(small_batches(2), Arc::new(TwoStageChunker::default())).ingest().await.unwrap();

    assert_eq!(h.loader.calls(), vec![(2, 0), (2, 2), (2, 4), (2, 6)]);
    let IngestOutcome::Exhausted(stats) = outcome else {
        panic!("expected exhaustion, got {outcome:?}");
    };
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.documents, 6);
    assert_eq!(stats.chunks, 6);
    assert_eq!(stats.next_offset, 6);
    assert_eq!(h.embedder.batches(), vec![2, 2, 2]);
    assert!(h.handler.seen().is_empty());
}

#[tokio::test]
async fn offsets_advance_by_batch_size_even_for_short_pages() {
    let pages = vec![vec![doc("only one", 1)], vec![doc("another", 2)]];
    let h = Harness::new(PagedLoader::new(pages));
    h.pipeline(small_batches(10), Arc::new(TwoStageChunker::default())).ingest().await.unwrap();

    assert_eq!(h.loader.calls(), vec![(10, 0), (10, 10), (10, 20)]);
}

#[tokio::test]
async fn empty_source_is_exhausted_immediately() {
    let h = Harness::new(PagedLoader::new(Vec::new()));
    let outcome = h.default_pipeline().ingest().await.unwrap();

    assert!(outcome.is_exhausted());
    assert_eq!(outcome.stats().batches, 0);
    assert_eq!(h.loader.calls(), vec![(100, 0)]);
    assert!(h.embedder.batches().is_empty());
}

#[tokio::test]
async fn batches_without_chunks_are_skipped() {
    let pages = vec![vec![doc("ignored", 1)], vec![doc("also ignored", 2)]];
    let h = Harness::new(PagedLoader::new(pages));
    let outcome = h.pipeline(small_batches(1), Arc::new(NothingChunker)).ingest().await.unwrap();

    assert!(outcome.is_exhausted());
    assert_eq!(h.loader.calls(), vec![(1, 0), (1, 1), (1, 2)]);
    assert!(h.embedder.batches().is_empty());
    assert!(h.store.adds.lock().unwrap().is_empty());
    assert_eq!(outcome.stats().chunks, 0);
}

#[tokio::test]
async fn long_unbroken_document_becomes_ten_chunks_in_one_call() {
    let h = Harness::new(PagedLoader::new(vec![vec![doc(&"A".repeat(1500), 1)]]));
    let outcome = h.default_pipeline().ingest().await.unwrap();

    assert_eq!(outcome.stats().chunks, 10);
    assert_eq!(h.embedder.batches(), vec![10]);
    assert_eq!(*h.store.adds.lock().unwrap(), vec![(10, 10, 10)]);
}

#[tokio::test]
async fn chunks_reach_the_store_with_document_metadata() {
    let embedder = Arc::new(CountingEmbedder::default());
    let store = Arc::new(InMemoryVectorStore::new(embedder.clone()));
    let loader = Arc::new(PagedLoader::new(vec![vec![doc(&"B".repeat(450), 7)]]));
    let pipeline = RagPipeline::builder()
        .config(RagConfig::default())
        .loader(loader)
        .chunker(Arc::new(TwoStageChunker::default()))
        .embedder(embedder)
        .vector_store(store.clone())
        .generator(Arc::new(ScriptedGenerator::default()))
        .build()
        .unwrap();

    pipeline.ingest().await.unwrap();

    let records = store.records().await;
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(records.iter().all(|r| r.metadata.get("id") == Some(&json!(7))));
}

#[tokio::test]
async fn store_failure_aborts_and_is_reported_once() {
    let pages = vec![vec![doc("first", 1)], vec![doc("second", 2)]];
    let mut h = Harness::new(PagedLoader::new(pages));
    h.store = Arc::new(RecordingStore { fail_add: true, ..Default::default() });
    let outcome = h.pipeline(small_batches(1), Arc::new(TwoStageChunker::default())).ingest().await.unwrap();

    match outcome {
        IngestOutcome::Failed { stage, reason, stats } => {
            assert_eq!(stage, IngestStage::EmbeddingAndStoring { offset: 0 });
            assert!(reason.contains("disk full"));
            assert_eq!(stats.chunks, 0);
            assert_eq!(stats.batches, 1);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // No further pages are requested after the abort.
    assert_eq!(h.loader.calls(), vec![(1, 0)]);

    let seen = h.handler.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.operation, Operation::Ingestion);
    assert_eq!(seen[0].1, "vector_store");
}

#[tokio::test]
async fn short_embedding_response_is_a_failure() {
    let mut h = Harness::new(PagedLoader::new(vec![vec![doc("a b c", 1), doc("d e f", 2)]]));
    h.embedder = Arc::new(CountingEmbedder { drop_one: true, ..Default::default() });
    let outcome = h.default_pipeline().ingest().await.unwrap();

    assert!(matches!(outcome, IngestOutcome::Failed { stage: IngestStage::EmbeddingAndStoring { .. }, .. }));
    assert!(h.store.adds.lock().unwrap().is_empty());
    let seen = h.handler.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1, "pipeline");
}

#[tokio::test]
async fn loader_failure_keeps_committed_batches() {
    let loader = PagedLoader { fail_at_call: Some(1), ..PagedLoader::new(vec![vec![doc("kept", 1)]]) };
    let h = Harness::new(loader);
    let outcome = h.pipeline(small_batches(1), Arc::new(TwoStageChunker::default())).ingest().await.unwrap();

    match outcome {
        IngestOutcome::Failed { stage, stats, .. } => {
            assert_eq!(stage, IngestStage::Loading { offset: 1 });
            assert_eq!(stats.chunks, 1);
            assert_eq!(stats.next_offset, 1);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.store.adds.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_document_content_is_not_contained() {
    let h = Harness::new(PagedLoader::new(vec![vec![doc("", 1)]]));
    let err = h.default_pipeline().ingest().await.unwrap_err();

    assert!(err.is_precondition());
    assert!(h.handler.seen().is_empty());
}

// ── Query ──────────────────────────────────────────────────────────

fn facts() -> Vec<SearchResult> {
    vec![SearchResult::new("fact one", 0.1), SearchResult::new("fact two", 0.3)]
}

#[tokio::test]
async fn query_renders_retrieved_context_into_the_prompt() {
    let mut h = Harness::new(PagedLoader::default());
    h.store = Arc::new(RecordingStore { results: facts(), ..Default::default() });
    let answer = h.default_pipeline().query("What is X?").await;

    assert_eq!(answer, "X is a thing.");
    assert_eq!(
        h.generator.prompts(),
        vec!["Context:\nfact one\nfact two\n\nQuestion:\nWhat is X?\n\nAnswer:".to_string()]
    );
    assert_eq!(*h.store.searches.lock().unwrap(), vec![("What is X?".to_string(), 4)]);
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let mut h = Harness::new(PagedLoader::default());
    h.store = Arc::new(RecordingStore { results: facts(), ..Default::default() });
    let pipeline = h.default_pipeline();

    let first = pipeline.query("What is X?").await;
    let second = pipeline.query("What is X?").await;

    assert_eq!(first, second);
    assert_eq!(h.generator.prompts().len(), 1);
    assert_eq!(h.store.searches.lock().unwrap().len(), 1);
    assert!(pipeline.cache().contains("What is X?").await);
}

#[tokio::test]
async fn generator_failure_returns_sentinel_and_is_not_cached() {
    let mut h = Harness::new(PagedLoader::default());
    h.generator = Arc::new(ScriptedGenerator { failures: 1, ..Default::default() });
    let pipeline = h.default_pipeline();

    assert_eq!(pipeline.query("What is X?").await, QUERY_FAILURE_MESSAGE);
    assert!(!pipeline.cache().contains("What is X?").await);

    let seen = h.handler.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.operation, Operation::Query);
    assert_eq!(seen[0].0.detail.as_deref(), Some("What is X?"));

    // The next attempt reaches the generator again and succeeds.
    assert_eq!(pipeline.query("What is X?").await, "X is a thing.");
    assert_eq!(h.generator.prompts().len(), 2);
}

#[tokio::test]
async fn retrieval_failure_returns_sentinel_without_generating() {
    let mut h = Harness::new(PagedLoader::default());
    h.store = Arc::new(RecordingStore { fail_search: true, ..Default::default() });
    let pipeline = h.default_pipeline();

    assert_eq!(pipeline.query("What is X?").await, QUERY_FAILURE_MESSAGE);

    let seen = h.handler.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.operation, Operation::Query);
    assert_eq!(seen[0].1, "vector_store");
    assert!(h.generator.prompts().is_empty());
    assert!(pipeline.cache().is_empty().await);
}

#[tokio::test]
async fn custom_template_and_top_k_are_honoured() {
    let mut h = Harness::new(PagedLoader::default());
    h.store = Arc::new(RecordingStore { results: facts(), ..Default::default() });
    let config = RagConfig::builder()
        .top_k(2)
        .prompt_template("Q: {query}\nC: {context}")
        .build()
        .unwrap();
    let pipeline = h.pipeline(config, Arc::new(TwoStageChunker::default()));

    pipeline.query("why?").await;

    assert_eq!(h.generator.prompts(), vec!["Q: why?\nC: fact one\nfact two".to_string()]);
    assert_eq!(h.store.searches.lock().unwrap()[0].1, 2);
}

#[test]
fn builder_requires_every_component() {
    let err = RagPipeline::builder().config(RagConfig::default()).build().err().unwrap();
    assert!(matches!(err, RagError::Config(_)));
}
