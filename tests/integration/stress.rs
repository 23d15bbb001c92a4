//! Stress tests: concurrent adds, injected store latency and cancellation.

use std::sync::Arc;
use std::time::Duration;

use reef_adder::{AddError, AddState, AdderConfig, FileInput, FileNode};
use reef_integration_tests::{TestRepo, test_data_seeded};
use reef_types::{ChunkerConfig, Layout};
use tokio_util::sync::CancellationToken;

fn small_chunks() -> AdderConfig {
    AdderConfig {
        chunker: ChunkerConfig::FixedSize { size: 1024 },
        raw_leaves: true,
        max_concurrent_puts: 4,
        ..AdderConfig::default()
    }
}

/// Out-of-order put completion never changes the root.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_latency_does_not_change_roots() {
    let data = test_data_seeded(64 * 1024, 5);

    for layout in [Layout::default(), Layout::trickle()] {
        let config = AdderConfig {
            layout,
            ..small_chunks()
        };
        let expected = TestRepo::memory()
            .add_bytes(config.clone(), "f", &data)
            .await;

        for seed in 0..4 {
            let repo = TestRepo::slow(seed);
            let root = repo.add_bytes(config.clone(), "f", &data).await;
            assert_eq!(root, expected, "{layout:?} seed {seed}");
            assert_eq!(repo.cat(&root).await, data);
        }
    }
}

/// Many adds against one repository at once all succeed and stay readable.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_concurrent_adds_share_repo() {
    let repo = Arc::new(TestRepo::slow(42));

    let mut handles = Vec::new();
    for i in 0..20u32 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let data = test_data_seeded(10_000 + i as usize * 997, i);
            let root = repo.add_bytes(small_chunks(), &format!("f{i}"), &data).await;
            (root, data)
        }));
    }

    let mut roots = Vec::new();
    for handle in handles {
        let (root, data) = handle.await.unwrap();
        assert_eq!(repo.cat(&root).await, data);
        roots.push(root);
    }

    let pinned = repo.pinner().len();
    roots.sort();
    roots.dedup();
    assert_eq!(pinned, roots.len());
}

/// Cancelling mid-add fails it without a pin, and the repository keeps
/// working for the next add.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ntest::timeout(30000)]
async fn test_cancel_mid_add() {
    let repo = TestRepo::slow(9);
    let config = AdderConfig {
        max_concurrent_puts: 1,
        ..small_chunks()
    };
    let data = test_data_seeded(2 * 1024 * 1024, 1);

    let adder = repo.adder(config.clone());
    let cancel = CancellationToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };
    let node = FileNode::File(FileInput::from_bytes("big", data));
    let result = adder.add_all_and_pin(node, None, &cancel).await;
    trigger.await.unwrap();

    assert!(matches!(result, Err(AddError::Cancelled)), "{result:?}");
    assert_eq!(adder.state(), AddState::Failed);
    assert!(repo.pinner().is_empty());

    let small = test_data_seeded(5_000, 2);
    let root = repo.add_bytes(config, "after", &small).await;
    assert_eq!(repo.cat(&root).await, small);
}

fn repeated_chunks() -> AdderConfig {
    AdderConfig {
        chunker: ChunkerConfig::FixedSize { size: 4096 },
        raw_leaves: true,
        max_concurrent_puts: 16,
        ..AdderConfig::default()
    }
}

/// A zero-filled file stores the same leaf from many workers at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_zero_file_on_disk() {
    let zeros = vec![0u8; 1024 * 1024];

    for round in 0..10 {
        let repo = TestRepo::on_disk();
        let root = repo.add_bytes(repeated_chunks(), "zeros", &zeros).await;
        assert_eq!(repo.cat(&root).await, zeros, "round {round}");
        // 256 identical leaves: the leaf, a full and a partial node, the root.
        assert_eq!(repo.stored_block_count().await, 4, "round {round}");
    }

    let repo = TestRepo::on_disk();
    let path = repo.write_source("sparse.img", &zeros);
    let root = repo.add_path(repeated_chunks(), &path).await;
    assert_eq!(repo.cat(&root).await, zeros);
}

/// Two adds of the same repetitive file into one on-disk repository race on
/// every block and agree on the root.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_identical_adds_on_disk() {
    let record = test_data_seeded(4096, 77);
    let mut data = record.repeat(200);
    data.extend_from_slice(&record[..1234]);
    let data = Arc::new(data);
    let repo = Arc::new(TestRepo::on_disk());

    let add = |name: &'static str| {
        let repo = repo.clone();
        let data = data.clone();
        tokio::spawn(async move { repo.add_bytes(repeated_chunks(), name, &data).await })
    };
    let (a, b) = tokio::join!(add("same"), add("same"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a, b);
    assert_eq!(repo.cat(&a).await, *data);

    let reopened = repo.reopen().await;
    assert_eq!(reopened.cat(&a).await, *data);
}
