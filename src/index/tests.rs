use super::*;
use crate::embeddings::chunking::ChunkMetadata;
use crate::testing::{DIMENSION, KeywordEmbedder};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

fn chunk(doc: &str, page: u32, text: &str) -> Chunk {
    let metadata = ChunkMetadata::document(doc, Some(page));
    Chunk {
        content: format!("{}\n{}", metadata.citation_tag(), text),
        metadata,
    }
}

fn sample_chunks() -> Vec<Chunk> {
    vec![
        chunk("garden.pdf", 1, "tomatoes need full sun and regular watering"),
        chunk("garden.pdf", 2, "prune roses in late winter"),
        chunk("kitchen.pdf", 1, "bake bread at high heat with steam"),
    ]
}

#[test]
fn create_rejects_empty_batch() {
    let embedder = KeywordEmbedder::default();
    let result = VectorIndex::create(&embedder, Vec::new());

    assert!(matches!(result, Err(DocuError::EmptyBatch)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn create_and_search_best_first() {
    let embedder = KeywordEmbedder::default();
    let index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");

    assert_eq!(index.len(), 3);
    assert_eq!(index.model(), "keyword-test");
    assert_eq!(index.dimension(), DIMENSION);

    let hits = index
        .search(&embedder, "when should I prune roses", 2)
        .expect("should search");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.metadata.page, Some(2));
    assert!(hits[0].score >= hits[1].score);
}

#[test]
fn search_k_bounds() {
    let embedder = KeywordEmbedder::default();
    let index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");

    assert!(index.search(&embedder, "bread", 0).expect("search").is_empty());
    assert_eq!(index.search(&embedder, "bread", 10).expect("search").len(), 3);
}

#[test]
fn ties_keep_insertion_order() {
    let embedder = KeywordEmbedder::default();
    let chunks = vec![
        chunk("a.pdf", 1, "identical words"),
        chunk("a.pdf", 1, "identical words!"),
        chunk("a.pdf", 1, "identical words?"),
    ];
    let index = VectorIndex::create(&embedder, chunks.clone()).expect("should create");

    let hits = index.search(&embedder, "identical words", 3).expect("search");
    let ranked: Vec<Chunk> = hits.into_iter().map(|hit| hit.chunk).collect();

    assert_eq!(ranked, chunks);
}

#[test]
fn embedding_failure_is_an_indexing_error() {
    let embedder = KeywordEmbedder::failing();
    let result = VectorIndex::create(&embedder, sample_chunks());

    match result {
        Err(DocuError::Indexing(message)) => assert!(message.contains("503")),
        other => panic!("expected indexing error, got {other:?}"),
    }
}

#[test]
fn query_embedding_failure_is_a_retrieval_error() {
    let embedder = KeywordEmbedder::default();
    let index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");

    embedder.fail.store(true, Ordering::SeqCst);
    let result = index.search(&embedder, "roses", 2);
    assert!(matches!(result, Err(DocuError::Retrieval(_))));
}

#[test]
fn append_makes_new_chunks_retrievable() {
    let embedder = KeywordEmbedder::default();
    let mut index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");
    let query = "volcano eruption lava";

    let before = index.search(&embedder, query, 3).expect("search");
    assert!(
        before
            .iter()
            .all(|hit| hit.chunk.metadata.doc_name.as_deref() != Some("geology.pdf"))
    );

    let added = index
        .append(
            &embedder,
            vec![chunk("geology.pdf", 7, "volcano eruption produces lava flows")],
        )
        .expect("should append");

    assert_eq!(added, 1);
    assert_eq!(index.len(), 4);
    let after = index.search(&embedder, query, 1).expect("search");
    assert_eq!(
        after[0].chunk.metadata.doc_name.as_deref(),
        Some("geology.pdf")
    );
}

#[test]
fn append_keeps_existing_entries() {
    let embedder = KeywordEmbedder::default();
    let mut index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");
    let before = index.entries.clone();

    index
        .append(&embedder, vec![chunk("new.pdf", 1, "fresh content")])
        .expect("should append");

    assert_eq!(&index.entries[..3], &before[..]);
    assert_eq!(index.append(&embedder, Vec::new()).expect("no-op"), 0);
}

#[test]
fn append_rejects_other_embedding_model() {
    let embedder = KeywordEmbedder::default();
    let mut index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");
    let other = KeywordEmbedder::with_model("other-model");

    let result = index.append(&other, vec![chunk("x.pdf", 1, "text")]);
    assert!(matches!(result, Err(DocuError::Indexing(_))));
    assert_eq!(index.len(), 3);
    assert!(matches!(
        index.search(&other, "text", 1),
        Err(DocuError::Retrieval(_))
    ));
}

#[test]
fn load_missing_or_empty_is_absent() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let missing = temp_dir.path().join("index");
    assert!(VectorIndex::load(&missing).expect("should load").is_none());

    fs::create_dir(&missing).expect("should create dir");
    assert!(!VectorIndex::exists(&missing));
    assert!(VectorIndex::load(&missing).expect("should load").is_none());
}

#[test]
fn persist_load_round_trip_is_search_equivalent() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    let embedder = KeywordEmbedder::default();
    let index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");

    index.persist(&path).expect("should persist");
    assert!(VectorIndex::exists(&path));

    let loaded = VectorIndex::load(&path)
        .expect("should load")
        .expect("index should exist");
    loaded.persist(&path).expect("should persist again");
    let reloaded = VectorIndex::load(&path)
        .expect("should load")
        .expect("index should exist");

    assert_eq!(reloaded.len(), index.len());
    assert_eq!(reloaded.model(), index.model());
    for query in ["roses", "bread heat", "sun watering tomatoes"] {
        let expected: Vec<Chunk> = index
            .search(&embedder, query, 3)
            .expect("search")
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();
        let actual: Vec<Chunk> = reloaded
            .search(&embedder, query, 3)
            .expect("search")
            .into_iter()
            .map(|hit| hit.chunk)
            .collect();
        assert_eq!(actual, expected, "query '{query}' should rank identically");
    }
}

#[test]
fn load_then_append_then_persist() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    let embedder = KeywordEmbedder::default();
    VectorIndex::create(&embedder, sample_chunks())
        .expect("should create")
        .persist(&path)
        .expect("should persist");

    let mut loaded = VectorIndex::load(&path)
        .expect("should load")
        .expect("index should exist");
    loaded
        .append(&embedder, vec![chunk("later.pdf", 1, "appended later")])
        .expect("should append");
    loaded.persist(&path).expect("should persist");

    let reloaded = VectorIndex::load(&path)
        .expect("should load")
        .expect("index should exist");
    assert_eq!(reloaded.len(), 4);
}

#[test]
fn persist_keeps_the_index_directory_in_place() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    let embedder = KeywordEmbedder::default();
    let index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");

    index.persist(&path).expect("first persist");
    index.persist(&path).expect("second persist replaces");

    let names: Vec<String> = fs::read_dir(temp_dir.path())
        .expect("should read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["index".to_string()]);
    assert!(path.join(INDEX_FILE_NAME).is_file());
}

#[test]
fn persisting_another_index_replaces_every_row() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    let embedder = KeywordEmbedder::default();
    VectorIndex::create(&embedder, sample_chunks())
        .expect("should create")
        .persist(&path)
        .expect("should persist");

    let replacement = VectorIndex::create(&embedder, vec![chunk("only.pdf", 1, "single page")])
        .expect("should create");
    replacement.persist(&path).expect("should persist");

    let loaded = VectorIndex::load(&path)
        .expect("should load")
        .expect("index should exist");
    assert_eq!(loaded.len(), 1);
    assert_eq!(
        loaded.chunks().next().and_then(|c| c.metadata.doc_name.as_deref()),
        Some("only.pdf")
    );
}

#[test]
fn appended_rows_follow_the_stored_ones() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    let embedder = KeywordEmbedder::default();
    let mut index = VectorIndex::create(&embedder, sample_chunks()).expect("should create");
    index.persist(&path).expect("should persist");

    index
        .append(&embedder, vec![chunk("notes.pdf", 3, "late addition")])
        .expect("should append");
    index.persist(&path).expect("should persist");

    let loaded = VectorIndex::load(&path)
        .expect("should load")
        .expect("index should exist");
    assert_eq!(loaded.entries, index.entries);
    assert_eq!(loaded.updated_at(), index.updated_at());
}

#[test]
fn readers_never_see_a_missing_index_while_persisting() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    let embedder = KeywordEmbedder::default();
    let large = VectorIndex::create(&embedder, sample_chunks()).expect("should create");
    let small = VectorIndex::create(&embedder, vec![chunk("one.pdf", 1, "one page")])
        .expect("should create");
    large.persist(&path).expect("should persist");

    let done = AtomicBool::new(false);
    let (reads, failures) = std::thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut reads = 0_usize;
            let mut failures = Vec::new();
            while !done.load(Ordering::SeqCst) {
                match VectorIndex::load(&path) {
                    Ok(Some(index)) if index.len() == 1 || index.len() == 3 => {}
                    other => failures.push(format!("{other:?}")),
                }
                reads += 1;
            }
            (reads, failures)
        });

        for round in 0..150 {
            let next = if round % 2 == 0 { &small } else { &large };
            next.persist(&path).expect("should persist");
        }
        done.store(true, Ordering::SeqCst);
        reader.join().expect("reader should not panic")
    });

    assert!(reads > 0);
    assert!(failures.is_empty(), "unexpected reads: {failures:?}");
}

#[test]
fn non_database_index_file_is_an_error() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    fs::create_dir(&path).expect("should create dir");
    fs::write(path.join(INDEX_FILE_NAME), "{ not a database").expect("should write");

    assert!(matches!(
        VectorIndex::load(&path),
        Err(DocuError::Indexing(_))
    ));
}

#[test]
fn destroy_removes_index() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let path = temp_dir.path().join("index");
    let embedder = KeywordEmbedder::default();
    VectorIndex::create(&embedder, sample_chunks())
        .expect("should create")
        .persist(&path)
        .expect("should persist");

    VectorIndex::destroy(&path).expect("should destroy");
    assert!(!path.exists());
    assert!(VectorIndex::load(&path).expect("should load").is_none());
    VectorIndex::destroy(&path).expect("destroying twice is fine");
}

#[test]
fn cosine_similarity_values() {
    assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
}
