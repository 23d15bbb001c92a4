//! Integration test: directory trees.
//!
//! Adds trees from the local filesystem and from memory, then walks the
//! stored directory nodes to find every file again.

use reef_adder::{AdderConfig, DirectoryInput, FileInput, FileNode, list_directory, read_file};
use reef_integration_tests::{TestRepo, added_names, test_data_seeded};
use reef_types::{Cid, Codec};

/// The well-known identifier of an empty UnixFS directory.
const EMPTY_DIR: &str = "bafybeiczsscdsbs7ffqz55asqdf3smv6klcw3gofszvwlyarci47bgf354";

/// Follow `path` from `root` through directory links.
async fn resolve(repo: &TestRepo, root: &Cid, path: &str) -> Cid {
    let blocks = repo.blocks();
    let mut cid = root.clone();
    for segment in path.split('/') {
        let links = list_directory(blocks.as_ref(), &cid).await.unwrap();
        cid = links
            .into_iter()
            .find(|link| link.name == segment)
            .unwrap_or_else(|| panic!("{segment} missing under {cid}"))
            .cid;
    }
    cid
}

/// A nested tree added from disk reads back entry by entry.
#[tokio::test]
async fn test_filesystem_tree_roundtrip() {
    let repo = TestRepo::on_disk();
    let files = [
        ("tree/readme.md", 120),
        ("tree/src/main.rs", 3_000),
        ("tree/src/lib.rs", 700_000),
        ("tree/src/util/mod.rs", 42),
        ("tree/assets/logo.bin", 300_000),
    ];
    for (i, (path, size)) in files.iter().enumerate() {
        repo.write_source(path, &test_data_seeded(*size, i as u32));
    }
    std::fs::create_dir_all(repo.scratch().join("tree/empty")).unwrap();

    let root = repo
        .add_path(AdderConfig::default(), &repo.scratch().join("tree"))
        .await;

    for (i, (path, size)) in files.iter().enumerate() {
        let relative = path.strip_prefix("tree/").unwrap();
        let cid = resolve(&repo, &root, relative).await;
        let data = read_file(repo.blocks().as_ref(), &cid).await.unwrap();
        assert_eq!(data.as_ref(), &test_data_seeded(*size, i as u32)[..], "{path}");
    }

    let empty = resolve(&repo, &root, "empty").await;
    assert_eq!(empty.to_string(), EMPTY_DIR);
}

/// Entries are listed in byte order of their names, whatever order the
/// filesystem returns them in.
#[tokio::test]
async fn test_directory_entries_sorted() {
    let repo = TestRepo::memory();
    for name in ["zeta", "Alpha", "beta", "alpha", "_x", "10", "9"] {
        repo.write_source(&format!("dir/{name}"), name.as_bytes());
    }

    let root = repo
        .add_path(AdderConfig::default(), &repo.scratch().join("dir"))
        .await;
    let names: Vec<String> = list_directory(repo.blocks().as_ref(), &root)
        .await
        .unwrap()
        .into_iter()
        .map(|link| link.name)
        .collect();

    assert_eq!(names, ["10", "9", "Alpha", "_x", "alpha", "beta", "zeta"]);
}

/// Each file and directory gets one completion event, children before
/// their parent.
#[tokio::test]
async fn test_completion_events_bottom_up() {
    let repo = TestRepo::memory();
    let tree = FileNode::Directory(DirectoryInput::from_nodes(
        "photos",
        [
            FileNode::File(FileInput::from_bytes("a.jpg", vec![1u8; 10])),
            FileNode::Directory(DirectoryInput::from_nodes(
                "2024",
                [
                    FileNode::File(FileInput::from_bytes("b.jpg", vec![2u8; 10])),
                    FileNode::File(FileInput::from_bytes("c.jpg", vec![3u8; 10])),
                ],
            )),
        ],
    ));

    let (root, events) = repo.add(AdderConfig::default(), tree).await.unwrap();

    assert_eq!(
        added_names(&events),
        [
            "photos/a.jpg",
            "photos/2024/b.jpg",
            "photos/2024/c.jpg",
            "photos/2024",
            "photos",
        ]
    );
    let last = events.last().unwrap();
    assert_eq!(last.cid.as_ref(), Some(&root));
    assert_eq!(root.codec(), Codec::DagPb);
}

/// Wrapping puts the added root one level down, under its own name.
#[tokio::test]
async fn test_wrap_single_file() {
    let repo = TestRepo::memory();
    let data = test_data_seeded(5_000, 3);

    let plain = repo
        .add_bytes(AdderConfig::default(), "notes.txt", &data)
        .await;
    let wrapped = repo
        .add_bytes(
            AdderConfig {
                wrap: true,
                ..AdderConfig::default()
            },
            "notes.txt",
            &data,
        )
        .await;

    let links = list_directory(repo.blocks().as_ref(), &wrapped).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].name, "notes.txt");
    assert_eq!(links[0].cid, plain);
    assert_eq!(repo.cat(&links[0].cid).await, data);
}

/// Two trees sharing a file share its blocks.
#[tokio::test]
async fn test_shared_files_deduplicate() {
    let repo = TestRepo::memory();
    let shared = test_data_seeded(600_000, 11);
    let config = AdderConfig {
        raw_leaves: true,
        ..AdderConfig::default()
    };

    let first = FileNode::Directory(DirectoryInput::from_nodes(
        "one",
        [FileNode::File(FileInput::from_bytes("big", shared.clone()))],
    ));
    repo.add(config.clone(), first).await.unwrap();
    let after_first = repo.stored_block_count().await;

    let second = FileNode::Directory(DirectoryInput::from_nodes(
        "two",
        [
            FileNode::File(FileInput::from_bytes("big", shared)),
            FileNode::File(FileInput::from_bytes("small", b"x".to_vec())),
        ],
    ));
    repo.add(config, second).await.unwrap();

    // Only the new directory node and the new small leaf.
    assert_eq!(repo.stored_block_count().await, after_first + 2);
}
