//! Integration test: no-copy adds.
//!
//! Raw leaves stay in their source files; only the reference and the
//! internal nodes reach the block store. The reference index survives a
//! restart, and edits to the source are caught on read.

use reef_adder::{AdderConfig, ErrorKind, FileInput, FileNode, read_file};
use reef_dag::decode_node;
use reef_integration_tests::{TestRepo, test_data};
use reef_store::BlockStore;
use reef_types::ChunkerConfig;

fn no_copy(chunk: u32) -> AdderConfig {
    AdderConfig {
        raw_leaves: true,
        no_copy: true,
        chunker: ChunkerConfig::FixedSize { size: chunk },
        ..AdderConfig::default()
    }
}

/// Leaves are referenced, not copied, and point at the right offsets.
#[tokio::test]
async fn test_leaves_referenced_in_place() {
    let repo = TestRepo::on_disk();
    let data = test_data(300_000);
    let source = repo.write_source("big.bin", &data);

    let root = repo.add_path(no_copy(65_536), &source).await;

    assert_eq!(repo.filestore().reference_count(), 5);
    // Only the file node was copied.
    assert_eq!(repo.stored_block_count().await, 1);

    let copied = repo.filestore().inner().list().await.unwrap();
    assert_eq!(copied, [root.clone()]);

    let root_block = repo.blocks().get(&root).await.unwrap().unwrap();
    let node = decode_node(root_block.data()).unwrap();
    assert_eq!(node.links.len(), 5);
    for (i, link) in node.links.iter().enumerate() {
        let reference = repo.filestore().reference(&link.cid).unwrap();
        assert_eq!(reference.path, source);
        assert_eq!(reference.offset, i as u64 * 65_536);
    }

    assert_eq!(repo.cat(&root).await, data);
}

/// Reopening the repository keeps every reference readable.
#[tokio::test]
async fn test_references_survive_reopen() {
    let repo = TestRepo::on_disk();
    let data = test_data(1_000_000);
    let source = repo.write_source("video.bin", &data);
    let root = repo.add_path(no_copy(262_144), &source).await;

    let reopened = repo.reopen().await;
    assert_eq!(reopened.filestore().reference_count(), 4);
    assert_eq!(reopened.cat(&root).await, data);
}

/// An edited source fails the read instead of returning wrong bytes.
#[tokio::test]
async fn test_modified_source_detected() {
    let repo = TestRepo::on_disk();
    let mut data = test_data(200_000);
    let source = repo.write_source("doc.bin", &data);
    let root = repo.add_path(no_copy(65_536), &source).await;

    data[100_000] ^= 0x01;
    std::fs::write(&source, &data).unwrap();

    assert!(read_file(repo.blocks().as_ref(), &root).await.is_err());
}

/// A removed source fails the read.
#[tokio::test]
async fn test_removed_source_detected() {
    let repo = TestRepo::on_disk();
    let source = repo.write_source("gone.bin", &test_data(100_000));
    let root = repo.add_path(no_copy(65_536), &source).await;

    std::fs::remove_file(&source).unwrap();
    assert!(read_file(repo.blocks().as_ref(), &root).await.is_err());
}

/// Without raw leaves, no-copy degrades to copying every block.
#[tokio::test]
async fn test_wrapped_leaves_are_copied() {
    let repo = TestRepo::on_disk();
    let data = test_data(200_000);
    let source = repo.write_source("plain.bin", &data);

    let config = AdderConfig {
        raw_leaves: false,
        ..no_copy(65_536)
    };
    let root = repo.add_path(config, &source).await;

    assert_eq!(repo.filestore().reference_count(), 0);
    // Four leaves and the file node.
    assert_eq!(repo.stored_block_count().await, 5);

    std::fs::remove_file(&source).unwrap();
    assert_eq!(repo.cat(&root).await, data);
}

/// In-memory input has no path to reference, so the add is refused.
#[tokio::test]
async fn test_memory_input_rejected() {
    let repo = TestRepo::memory();
    let node = FileNode::File(FileInput::from_bytes("mem", test_data(1000)));
    let err = repo.add(no_copy(256), node).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);
    assert!(repo.pinner().is_empty());
}
