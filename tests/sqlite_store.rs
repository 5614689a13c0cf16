use tempfile::TempDir;

use course_reconciler::config::Config;
use course_reconciler::migrate::run_migrations;
use course_reconciler::sqlite_store::SqliteStore;
use course_reconciler_core::fetch::tree_fingerprint;
use course_reconciler_core::models::NodeDraft;
use course_reconciler_core::{
    Assignment, ContentNode, CourseMetadata, NodeBody, NodeKind, ReconcileOptions,
    ReconcileRequest, Reconciler, Store, Strategy,
};

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config: Config = toml::from_str(&format!(
        "[db]\npath = \"{}/data/courserec.sqlite\"\n",
        tmp.path().display()
    ))
    .unwrap();
    run_migrations(&config).await.unwrap();
    let store = SqliteStore::open(&config).await.unwrap();
    store
        .insert_course(
            "c1",
            &CourseMetadata {
                title: "Rust 101".to_string(),
                description: Some("Ownership".to_string()),
                published: false,
            },
        )
        .await
        .unwrap();
    (tmp, store)
}

fn sample() -> Vec<ContentNode> {
    vec![ContentNode::module("M").with_children(vec![ContentNode::lesson("L")
        .with_children(vec![ContentNode::unit("U1"), ContentNode::unit("U2")])])]
}

fn request(tree: Vec<ContentNode>, strategy: Strategy) -> ReconcileRequest {
    ReconcileRequest {
        course_id: "c1".to_string(),
        metadata: CourseMetadata {
            title: "Rust 101".to_string(),
            description: Some("Ownership".to_string()),
            published: true,
        },
        tree,
        strategy,
        expected_version: None,
    }
}

fn assignment(id: &str, unit_id: &str) -> Assignment {
    Assignment {
        id: id.to_string(),
        course_id: "c1".to_string(),
        unit_id: unit_id.to_string(),
        title: format!("Quiz {}", id),
        deleted: false,
    }
}

fn u1_id(tree: &[ContentNode]) -> String {
    tree[0].children[0].children[0].id.clone().unwrap()
}

#[tokio::test]
async fn test_fetch_tree_orders_by_position_then_insertion() {
    let (_tmp, store) = open_store().await;
    let m = store
        .create_node("c1", &ContentNode::module("M").draft(0))
        .await
        .unwrap();
    let l = store
        .create_node(&m, &ContentNode::lesson("L").draft(0))
        .await
        .unwrap();
    store.create_node(&l, &ContentNode::unit("b").draft(1)).await.unwrap();
    store.create_node(&l, &ContentNode::unit("a").draft(0)).await.unwrap();
    store.create_node(&l, &ContentNode::unit("c").draft(1)).await.unwrap();

    let tree = store.fetch_tree("c1").await.unwrap();
    let titles: Vec<&str> = tree[0].children[0]
        .children
        .iter()
        .map(|u| u.title.as_str())
        .collect();
    assert_eq!(titles, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_unit_fields_round_trip() {
    let (_tmp, store) = open_store().await;
    let m = store
        .create_node("c1", &ContentNode::module("M").draft(0))
        .await
        .unwrap();
    let l = store
        .create_node(&m, &ContentNode::lesson("L").draft(0))
        .await
        .unwrap();
    let body = NodeBody::Unit {
        content: Some("Read chapter 4".to_string()),
        video_url: Some("https://cdn.example.com/v.mp4".to_string()),
        file_url: None,
        duration_minutes: Some(12),
    };
    let draft = NodeDraft {
        title: "Borrowing".to_string(),
        sort_position: 0,
        body: body.clone(),
    };
    store.create_node(&l, &draft).await.unwrap();

    let tree = store.fetch_tree("c1").await.unwrap();
    assert_eq!(tree[0].children[0].children[0].body, body);
}

#[tokio::test]
async fn test_create_under_missing_parent_fails() {
    let (_tmp, store) = open_store().await;
    let err = store
        .create_node("no-such-lesson", &ContentNode::unit("U").draft(0))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("parent no-such-lesson not found"));
}

#[tokio::test]
async fn test_delete_nodes_counts_rows() {
    let (_tmp, store) = open_store().await;
    let m = store
        .create_node("c1", &ContentNode::module("M").draft(0))
        .await
        .unwrap();
    let other = store
        .create_node("c1", &ContentNode::module("N").draft(1))
        .await
        .unwrap();
    let deleted = store
        .delete_nodes(NodeKind::Module, &[m, other, "ghost".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(store.delete_nodes(NodeKind::Unit, &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_repoint_skips_deleted_assignment() {
    let (_tmp, store) = open_store().await;
    store.insert_assignment(&assignment("A", "u-old")).await.unwrap();
    assert!(store.repoint_assignment("A", "u-new").await.unwrap());
    assert!(store.delete_assignment("A").await.unwrap());
    assert!(!store.repoint_assignment("A", "u-other").await.unwrap());

    let a = store.get_assignment("A").await.unwrap().unwrap();
    assert!(a.deleted);
    assert_eq!(a.unit_id, "u-new");
    assert!(store.assignments_for_course("c1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_course_lock_is_exclusive_and_reentrant() {
    let (_tmp, store) = open_store().await;
    assert!(store.try_lock_course("c1", "a", 300).await.unwrap());
    assert!(store.try_lock_course("c1", "a", 300).await.unwrap());
    assert!(!store.try_lock_course("c1", "b", 300).await.unwrap());

    store.unlock_course("c1", "b").await.unwrap();
    assert!(!store.try_lock_course("c1", "b", 300).await.unwrap());

    store.unlock_course("c1", "a").await.unwrap();
    assert!(store.try_lock_course("c1", "b", 300).await.unwrap());
}

#[tokio::test]
async fn test_expired_lock_is_taken_over() {
    let (_tmp, store) = open_store().await;
    assert!(store.try_lock_course("c1", "crashed", 300).await.unwrap());
    // A zero TTL treats any existing lock as expired.
    assert!(store.try_lock_course("c1", "next", 0).await.unwrap());
}

#[tokio::test]
async fn test_destructive_reconcile_restores_assignment() {
    let (_tmp, store) = open_store().await;
    let reconciler = Reconciler::new(&store, ReconcileOptions::default());
    reconciler
        .reconcile(&request(sample(), Strategy::Destructive))
        .await;
    let old_u1 = u1_id(&store.fetch_tree("c1").await.unwrap());
    store.insert_assignment(&assignment("A", &old_u1)).await.unwrap();

    let result = reconciler
        .reconcile(&request(sample(), Strategy::Destructive))
        .await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.counts.deleted, 4);
    assert_eq!(result.assignments_restored, 1);

    let new_u1 = u1_id(&store.fetch_tree("c1").await.unwrap());
    assert_ne!(new_u1, old_u1);
    assert_eq!(store.get_assignment("A").await.unwrap().unwrap().unit_id, new_u1);
    assert!(store.get_course("c1").await.unwrap().unwrap().metadata.published);
}

#[tokio::test]
async fn test_incremental_soft_preserves_and_renames_in_place() {
    let (_tmp, store) = open_store().await;
    let reconciler = Reconciler::new(&store, ReconcileOptions::default());
    let mut two = sample();
    two.push(ContentNode::module("Legacy").with_children(vec![
        ContentNode::lesson("Old").with_children(vec![ContentNode::unit("X")]),
    ]));
    reconciler
        .reconcile(&request(two, Strategy::Destructive))
        .await;
    let before = store.fetch_tree("c1").await.unwrap();
    let u1 = u1_id(&before);
    store.insert_assignment(&assignment("A", &u1)).await.unwrap();

    // Rename U1 by identity and drop "Legacy" from the submission.
    let mut edited = vec![before[0].clone()];
    edited[0].children[0].children[0].title = "U1 (revised)".to_string();
    let result = reconciler
        .reconcile(&request(edited, Strategy::Incremental))
        .await;
    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.counts.updated, 1);
    assert_eq!(result.counts.preserved, 3);
    assert_eq!(result.counts.deleted, 0);
    assert_eq!(result.assignments_restored, 1);

    let after = store.fetch_tree("c1").await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[1].title, "Legacy");
    assert_eq!(after[0].children[0].children[0].id.as_deref(), Some(u1.as_str()));
    assert_eq!(store.get_assignment("A").await.unwrap().unwrap().unit_id, u1);
}

#[tokio::test]
async fn test_version_after_matches_stored_tree() {
    let (_tmp, store) = open_store().await;
    let reconciler = Reconciler::new(&store, ReconcileOptions::default());
    let result = reconciler
        .reconcile(&request(sample(), Strategy::Incremental))
        .await;
    let tree = store.fetch_tree("c1").await.unwrap();
    assert_eq!(result.version_after, Some(tree_fingerprint(&tree)));

    let mut next = request(sample(), Strategy::Incremental);
    next.expected_version = result.version_after.clone();
    assert!(reconciler.reconcile(&next).await.success);
}
