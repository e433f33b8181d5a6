mod helpers;

use helpers::index_options;
use tempfile::TempDir;
use vigil::error::VigilError;
use vigil::index::{persist, DurableVectorIndex, IndexPaths};

fn unit(dim: usize, hot: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot] = 1.0;
    v
}

#[tokio::test]
async fn force_save_then_reopen_restores_vectors_and_texts() {
    let tmp = TempDir::new().unwrap();
    let paths = IndexPaths::in_dir(tmp.path());

    let index = DurableVectorIndex::open(paths.clone(), index_options(8)).unwrap();
    for i in 0..5 {
        index.add_async(unit(8, i), format!("inc_{i}\tincident {i}")).unwrap();
    }
    index.force_save().await.unwrap();
    let saved_texts = index.texts();
    index.shutdown().await.unwrap();
    drop(index);

    let reopened = DurableVectorIndex::open(paths, index_options(8)).unwrap();
    assert_eq!(reopened.count(), 5);
    assert_eq!(reopened.texts(), saved_texts);

    let hits = reopened.search(&unit(8, 3), 1).unwrap();
    assert_eq!(reopened.text(hits.ids[0]).as_deref(), Some("inc_3\tincident 3"));
    assert!(hits.distances[0].abs() < 1e-6);
}

#[tokio::test]
async fn shutdown_drains_queue_and_saves() {
    let tmp = TempDir::new().unwrap();
    let paths = IndexPaths::in_dir(tmp.path());

    let index = DurableVectorIndex::open(paths.clone(), index_options(4)).unwrap();
    for i in 0..3 {
        index.add_async(unit(4, i), format!("t{i}")).unwrap();
    }
    // Batch size is far above 3 and the save interval is an hour: nothing is on disk yet.
    assert!(!paths.index.exists());

    index.shutdown().await.unwrap();
    assert_eq!(index.pending_count(), 0);

    let info = persist::inspect(&paths, 4);
    assert!(info.is_consistent(), "{:?}", info.problems);
    assert_eq!(info.vector_count, Some(3));
    assert_eq!(info.text_count, Some(3));
}

#[tokio::test]
async fn add_after_shutdown_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let index = DurableVectorIndex::open(IndexPaths::in_dir(tmp.path()), index_options(4)).unwrap();
    index.shutdown().await.unwrap();

    let err = index.add_async(unit(4, 0), "late").unwrap_err();
    assert!(matches!(err, VigilError::WriterClosed));
}

#[tokio::test]
async fn wrong_dimension_is_rejected_before_queueing() {
    let tmp = TempDir::new().unwrap();
    let index = DurableVectorIndex::open(IndexPaths::in_dir(tmp.path()), index_options(4)).unwrap();

    let err = index.add_async(vec![1.0, 0.0], "short").unwrap_err();
    assert!(matches!(
        err,
        VigilError::DimensionMismatch { expected: 4, actual: 2 }
    ));
    assert_eq!(index.count(), 0);
}

#[tokio::test]
async fn full_queue_returns_queue_full() {
    let tmp = TempDir::new().unwrap();
    let mut options = index_options(4);
    options.queue_capacity = 1;
    let index = DurableVectorIndex::open(IndexPaths::in_dir(tmp.path()), options).unwrap();

    // The writer may pick up items as they arrive; keep pushing until the bound bites.
    let mut saw_full = false;
    for i in 0..10_000 {
        match index.add_async(unit(4, i % 4), format!("t{i}")) {
            Ok(()) => {}
            Err(VigilError::QueueFull) => {
                saw_full = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(saw_full);
    index.shutdown().await.unwrap();
}

#[tokio::test]
async fn reopen_with_other_dimension_starts_empty() {
    let tmp = TempDir::new().unwrap();
    let paths = IndexPaths::in_dir(tmp.path());

    let index = DurableVectorIndex::open(paths.clone(), index_options(4)).unwrap();
    index.add_async(unit(4, 1), "four").unwrap();
    index.shutdown().await.unwrap();
    drop(index);

    let reopened = DurableVectorIndex::open(paths, index_options(8)).unwrap();
    assert_eq!(reopened.count(), 0);
    assert_eq!(reopened.dimension(), 8);
}

#[tokio::test]
async fn corrupt_index_file_starts_empty() {
    let tmp = TempDir::new().unwrap();
    let paths = IndexPaths::in_dir(tmp.path());
    std::fs::write(&paths.index, b"definitely not an index").unwrap();
    std::fs::write(&paths.texts, b"[]").unwrap();

    let index = DurableVectorIndex::open(paths.clone(), index_options(4)).unwrap();
    assert_eq!(index.count(), 0);

    // A save replaces the corrupt file with a valid one.
    index.add_async(unit(4, 2), "fresh").unwrap();
    index.force_save().await.unwrap();
    assert_eq!(persist::read_header(&paths.index).unwrap(), (4, 1));
}

#[tokio::test]
async fn sidecar_shorter_than_index_truncates_both() {
    let tmp = TempDir::new().unwrap();
    let paths = IndexPaths::in_dir(tmp.path());

    let index = DurableVectorIndex::open(paths.clone(), index_options(4)).unwrap();
    for i in 0..3 {
        index.add_async(unit(4, i), format!("t{i}")).unwrap();
    }
    index.shutdown().await.unwrap();
    drop(index);

    std::fs::write(&paths.texts, br#"["t0","t1"]"#).unwrap();
    assert!(!persist::inspect(&paths, 4).is_consistent());

    let reopened = DurableVectorIndex::open(paths, index_options(4)).unwrap();
    assert_eq!(reopened.count(), 2);
    assert_eq!(reopened.texts(), vec!["t0".to_string(), "t1".to_string()]);
}
