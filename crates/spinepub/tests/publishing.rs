use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use spinepub::{
    Activity, Container, ExtensionRegistry, FilesystemStorage, InMemoryLiveStore, LiveStore,
    MemoryStorage, ObjectStorage, Position, PublishError, Publisher, PublisherConfig,
    RepositoryLayout, Repository, SaveOptions, SchemaConfig, TeachingElement, UrlOptions,
};

const SCHEMA: &str = r#"
id: COURSE_SCHEMA
structure:
  - type: COURSE
    contentContainers: [SECTION, EXAM]
    relationships:
      - type: prerequisites
      - type: related
  - type: MODULE
    contentContainers: [SECTION]
contentContainers:
  - type: EXAM
    publishedAs: exam
"#;

struct Fixture {
    store: Arc<InMemoryLiveStore>,
    storage: Arc<MemoryStorage>,
    publisher: Publisher,
}

fn repository(id: i64) -> Repository {
    serde_json::from_value(json!({
        "id": id, "uid": format!("r-{id}"), "schema": "COURSE_SCHEMA", "name": format!("Repo {id}")
    }))
    .unwrap()
}

fn activity(id: i64, repository_id: i64, parent_id: Option<i64>, kind: &str) -> Activity {
    serde_json::from_value(json!({
        "id": id, "repositoryId": repository_id, "parentId": parent_id, "type": kind,
        "position": 1, "data": { "title": format!("Activity {id}") }
    }))
    .unwrap()
}

fn container(id: i64, activity_id: i64, kind: &str) -> Container {
    Container {
        id,
        uid: Some(format!("c-{id}")),
        activity_id,
        kind: kind.into(),
        position: Position(id as f64),
        created_at: None,
        updated_at: None,
    }
}

fn fixture(layout: RepositoryLayout) -> Fixture {
    let store = Arc::new(InMemoryLiveStore::default());
    store.insert_schema(serde_yaml::from_str::<SchemaConfig>(SCHEMA).unwrap());
    store.insert_repository(repository(1));
    let storage = Arc::new(MemoryStorage::new());
    let config = PublisherConfig {
        layout,
        ..PublisherConfig::default()
    };
    let publisher = Publisher::new(
        &config,
        storage.clone(),
        store.clone(),
        ExtensionRegistry::new(),
    );
    Fixture {
        store,
        storage,
        publisher,
    }
}

impl Fixture {
    fn add_text(&self, id: i64, activity_id: i64, container_id: i64, position: f64) {
        self.store.insert_element(
            Some(activity_id),
            Some(container_id),
            TeachingElement::new(id, "TEXT", json!({ "content": format!("text {id}") }))
                .with_position(position),
        );
    }

    async fn publish(&self, activity_id: i64) -> spinepub::PublishOutcome {
        let activity = self.store.activity(activity_id).await.unwrap();
        self.publisher.publish_activity(&activity).await.unwrap()
    }

    fn spine(&self) -> Value {
        self.storage.json("repository/1/index.json").unwrap()
    }
}

#[tokio::test]
async fn single_container_scenario() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_container(container(1, 1, "SECTION"));
    fx.add_text(10, 1, 1, 1.0);
    fx.add_text(11, 1, 1, 2.0);

    let outcome = fx.publish(1).await;

    let snapshot = fx.storage.json("repository/1/1/1.container.json").unwrap();
    let positions: Vec<&Value> = snapshot["elements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| &e["position"])
        .collect();
    assert_eq!(positions, [&json!(1), &json!(2)]);

    let spine = fx.spine();
    assert_eq!(spine["structure"].as_array().unwrap().len(), 1);
    assert_eq!(
        spine["structure"][0]["contentContainers"],
        json!([{ "id": 1, "uid": "c-1", "type": "SECTION", "publishedAs": "container", "elementCount": 2 }])
    );
    assert_eq!(spine["version"], json!(outcome.version.unwrap()));
    assert_eq!(spine["structure"][0]["meta"], json!({ "title": "Activity 1" }));
}

#[tokio::test]
async fn flat_layout_shares_the_repository_folder() {
    let fx = fixture(RepositoryLayout::Flat);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_container(container(1, 1, "SECTION"));
    fx.store.insert_container(container(2, 1, "EXAM"));

    fx.publish(1).await;

    assert!(fx.storage.contains("repository/1/1.container.json"));
    assert!(fx.storage.contains("repository/1/2.exam.json"));
    assert!(fx.storage.contains("repository/1/1.assessments.json"));
}

#[tokio::test]
async fn relationships_mirror_schema_types_and_refs() {
    let fx = fixture(RepositoryLayout::Nested);
    let mut course = activity(1, 1, None, "COURSE");
    course.refs.insert("prerequisites".into(), json!([5, 6]));
    course.refs.insert("undeclared".into(), json!([9]));
    fx.store.insert_activity(course);

    fx.publish(1).await;

    assert_eq!(
        fx.spine()["structure"][0]["relationships"],
        json!({ "prerequisites": [5, 6], "related": [] })
    );
}

#[tokio::test]
async fn republishing_unchanged_content_keeps_version() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_container(container(1, 1, "SECTION"));
    fx.add_text(10, 1, 1, 1.0);

    let first = fx.publish(1).await;
    let second = fx.publish(1).await;

    assert_eq!(first.version, second.version);
    assert_eq!(fx.spine()["structure"].as_array().unwrap().len(), 1);

    fx.add_text(11, 1, 1, 2.0);
    let third = fx.publish(1).await;
    assert_ne!(third.version, second.version);
}

#[tokio::test]
async fn positions_are_dense_after_live_gaps() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_container(container(1, 1, "SECTION"));
    fx.add_text(10, 1, 1, 9.0);
    fx.add_text(11, 1, 1, 1.0);
    fx.add_text(12, 1, 1, 5.0);

    fx.publish(1).await;

    let snapshot = fx.storage.json("repository/1/1/1.container.json").unwrap();
    let order: Vec<(i64, i64)> = snapshot["elements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["id"].as_i64().unwrap(), e["position"].as_i64().unwrap()))
        .collect();
    assert_eq!(order, [(11, 1), (12, 2), (10, 3)]);
}

#[tokio::test]
async fn predecessors_are_added_once_without_summary() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_activity(activity(2, 1, Some(1), "MODULE"));
    fx.store.add_predecessor(2, 1);

    fx.publish(2).await;
    let spine = fx.spine();
    let ids: Vec<i64> = spine["structure"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, [1, 2]);
    assert!(spine["structure"][0].get("contentContainers").is_none());
    assert!(spine["structure"][0]["publishedAt"].is_null());

    fx.publish(2).await;
    assert_eq!(fx.spine()["structure"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unpublish_removes_subtree_and_owned_files() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_activity(activity(2, 1, Some(1), "MODULE"));
    fx.store.insert_activity(activity(3, 1, Some(2), "MODULE"));
    fx.store.insert_activity(activity(4, 1, None, "COURSE"));
    for (container_id, activity_id) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
        fx.store.insert_container(container(container_id, activity_id, "SECTION"));
    }
    fx.store.insert_element(
        Some(1),
        None,
        TeachingElement::new(50, "ASSESSMENT", json!({ "question": [] })),
    );
    for id in [1, 2, 3, 4] {
        fx.publish(id).await;
    }

    let repository = repository(1);
    let target = fx.store.activity(1).await.unwrap();
    let report = fx
        .publisher
        .unpublish_activity(&repository, &target)
        .await
        .unwrap();

    assert!(report.is_complete());
    let mut removed = report.removed.clone();
    removed.sort();
    assert_eq!(removed, [1, 2, 3]);
    for key in [
        "repository/1/1/1.container.json",
        "repository/1/1/assessments.json",
        "repository/1/2/2.container.json",
        "repository/1/2/assessments.json",
        "repository/1/3/3.container.json",
        "repository/1/3/assessments.json",
    ] {
        assert!(!fx.storage.contains(key), "{key} should be deleted");
    }
    assert!(fx.storage.contains("repository/1/4/4.container.json"));
    assert!(fx.storage.contains("repository/1/4/assessments.json"));

    let spine = fx.spine();
    let ids: Vec<i64> = spine["structure"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, [4]);
    assert!(fx.store.activity(1).await.unwrap().published_at.is_none());

    let again = fx
        .publisher
        .unpublish_activity(&repository, &target)
        .await
        .unwrap();
    assert!(again.removed.is_empty());
    assert!(again.is_complete());
}

#[tokio::test]
async fn unpublish_leaves_no_files_for_activity_without_assessments() {
    for layout in [RepositoryLayout::Nested, RepositoryLayout::Flat] {
        let fx = fixture(layout);
        fx.store.insert_activity(activity(1, 1, None, "COURSE"));
        fx.store.insert_container(container(1, 1, "SECTION"));
        fx.add_text(10, 1, 1, 1.0);
        fx.publish(1).await;
        let snapshot_files = |fx: &Fixture| -> Vec<String> {
            fx.storage
                .keys()
                .into_iter()
                .filter(|key| !key.ends_with("index.json"))
                .collect()
        };
        assert_eq!(snapshot_files(&fx).len(), 2, "{layout:?}");

        let target = fx.store.activity(1).await.unwrap();
        let report = fx
            .publisher
            .unpublish_activity(&repository(1), &target)
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.deleted_files.len(), 2);
        assert!(snapshot_files(&fx).is_empty(), "{layout:?}: {:?}", snapshot_files(&fx));
    }
}

#[tokio::test]
async fn concurrent_publishes_in_one_repository_keep_every_node() {
    let fx = fixture(RepositoryLayout::Nested);
    let ids: Vec<i64> = (1..=8).collect();
    for &id in &ids {
        fx.store.insert_activity(activity(id, 1, None, "COURSE"));
        fx.store.insert_container(container(id, id, "SECTION"));
        fx.add_text(100 + id, id, id, 1.0);
    }
    let mut activities = Vec::new();
    for &id in &ids {
        activities.push(fx.store.activity(id).await.unwrap());
    }

    let results = futures::future::join_all(
        activities
            .iter()
            .map(|activity| fx.publisher.publish_activity(activity)),
    )
    .await;

    assert!(results.iter().all(Result::is_ok));
    let spine = fx.spine();
    let mut published: Vec<i64> = spine["structure"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    published.sort();
    assert_eq!(published, ids);
    let catalog = fx.storage.json("repository/index.json").unwrap();
    assert_eq!(catalog.as_array().unwrap().len(), 1);
    assert_eq!(catalog[0]["publishedAt"], spine["publishedAt"]);
}

#[tokio::test]
async fn catalog_tracks_latest_publish_per_repository() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_repository(repository(2));
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_activity(activity(2, 2, None, "COURSE"));
    fx.store.insert_activity(activity(3, 1, None, "COURSE"));

    fx.publish(1).await;
    fx.publish(2).await;
    let last = fx.publish(3).await;

    let catalog = fx.storage.json("repository/index.json").unwrap();
    let entries = catalog.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let first = entries.iter().find(|e| e["id"] == 1).unwrap();
    assert_eq!(first["publishedAt"], serde_json::to_value(last.published_at).unwrap());
    assert_eq!(first["publishedAt"], fx.spine()["publishedAt"]);
    assert!(first.get("structure").is_none());
}

#[tokio::test]
async fn repository_details_leave_structure_alone() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.publish(1).await;

    let mut renamed = repository(1);
    renamed.name = "Renamed".into();
    renamed.data = json!({ "color": "blue" });
    let spine = fx.publisher.publish_repository_details(&renamed).await.unwrap();

    assert_eq!(spine.structure.len(), 1);
    let stored = fx.spine();
    assert_eq!(stored["name"], "Renamed");
    assert_eq!(stored["meta"], json!({ "color": "blue" }));
    let catalog = fx.storage.json("repository/index.json").unwrap();
    assert_eq!(catalog[0]["name"], "Renamed");
}

#[tokio::test]
async fn integrity_failure_keeps_previous_spine() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_container(container(1, 1, "SECTION"));
    fx.add_text(10, 1, 1, 1.0);
    fx.publish(1).await;
    let before = fx.spine();

    fx.store.insert_element(
        Some(1),
        Some(1),
        TeachingElement::new(
            11,
            "SCORM",
            json!({ "root": "pkg", "assets": { "readme": "storage://x/readme.txt" } }),
        )
        .with_position(2.0),
    );
    let activity = fx.store.activity(1).await.unwrap();
    let err = fx.publisher.publish_activity(&activity).await.unwrap_err();

    assert!(err.is_integrity());
    assert!(err.to_string().contains("publishing activity 1"));
    assert_eq!(fx.spine(), before);
}

#[tokio::test]
async fn image_upload_round_trip() {
    let fx = fixture(RepositoryLayout::Nested);
    fx.store.insert_activity(activity(1, 1, None, "COURSE"));
    fx.store.insert_container(container(1, 1, "SECTION"));
    let bytes = b"png-bytes".to_vec();
    let uri = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
    fx.store.insert_element(
        Some(1),
        Some(1),
        TeachingElement::new("img-1", "IMAGE", json!({ "url": uri })).with_position(1.0),
    );

    fx.publish(1).await;

    let snapshot = fx.storage.json("repository/1/1/1.container.json").unwrap();
    let key = snapshot["elements"][0]["data"]["url"].as_str().unwrap().to_string();
    let mut input = b"img-1".to_vec();
    input.extend_from_slice(&bytes);
    let expected = format!("repository/assets/img-1/{}.png", md5_hex(&input));
    assert_eq!(key, expected);
    assert_eq!(fx.storage.get_file(&key).await.unwrap(), Some(bytes));

    let repository = repository(1);
    let activity = fx.store.activity(1).await.unwrap();
    let mut element = TeachingElement::new("img-1", "IMAGE", json!({ "url": key }));
    element.position = Some(Position(1.0));
    fx.store.insert_element(Some(1), Some(1), element);
    let content = fx
        .publisher
        .fetch_activity_content(&repository, &activity, true)
        .await
        .unwrap();
    assert_eq!(
        content.containers[0].elements[0].data["url"],
        json!(format!("memory:///{expected}"))
    );

    fx.storage.delete_file(&expected).await.unwrap();
    let content = fx
        .publisher
        .fetch_activity_content(&repository, &activity, true)
        .await
        .unwrap();
    assert_eq!(content.containers[0].elements[0].data["url"], json!(expected));
}

fn md5_hex(input: &[u8]) -> String {
    use md5::{Digest, Md5};
    hex::encode(Md5::digest(input))
}

/// Storage whose deletes fail for one key.
struct FlakyStorage {
    inner: MemoryStorage,
    broken: String,
}

#[async_trait]
impl ObjectStorage for FlakyStorage {
    async fn get_file(&self, key: &str) -> Result<Option<Vec<u8>>, PublishError> {
        self.inner.get_file(key).await
    }

    async fn save_file(
        &self,
        key: &str,
        data: Vec<u8>,
        options: SaveOptions,
    ) -> Result<(), PublishError> {
        self.inner.save_file(key, data, options).await
    }

    async fn delete_file(&self, key: &str) -> Result<(), PublishError> {
        if key == self.broken {
            return Err(PublishError::Storage("permission denied".into()));
        }
        self.inner.delete_file(key).await
    }

    async fn copy_file(&self, key: &str, new_key: &str) -> Result<(), PublishError> {
        self.inner.copy_file(key, new_key).await
    }

    async fn file_exists(&self, key: &str) -> Result<bool, PublishError> {
        self.inner.file_exists(key).await
    }

    async fn get_file_url(&self, key: &str, options: UrlOptions) -> Result<String, PublishError> {
        self.inner.get_file_url(key, options).await
    }
}

#[tokio::test]
async fn failed_deletes_are_reported_without_blocking_the_rest() {
    let store = Arc::new(InMemoryLiveStore::default());
    store.insert_schema(serde_yaml::from_str::<SchemaConfig>(SCHEMA).unwrap());
    store.insert_repository(repository(1));
    store.insert_activity(activity(1, 1, None, "COURSE"));
    store.insert_activity(activity(2, 1, Some(1), "MODULE"));
    store.insert_container(container(1, 1, "SECTION"));
    store.insert_container(container(2, 2, "SECTION"));
    let storage = Arc::new(FlakyStorage {
        inner: MemoryStorage::new(),
        broken: "repository/1/1/1.container.json".into(),
    });
    let publisher = Publisher::new(
        &PublisherConfig::default(),
        storage.clone(),
        store.clone(),
        ExtensionRegistry::new(),
    );
    for id in [1, 2] {
        let activity = store.activity(id).await.unwrap();
        publisher.publish_activity(&activity).await.unwrap();
    }

    let target = store.activity(1).await.unwrap();
    let report = publisher
        .unpublish_activity(&repository(1), &target)
        .await
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.failed_files.len(), 1);
    assert_eq!(report.failed_files[0].key, "repository/1/1/1.container.json");
    assert_eq!(
        report.deleted_files,
        [
            "repository/1/2/assessments.json",
            "repository/1/2/2.container.json",
            "repository/1/1/assessments.json",
        ]
    );
    assert!(!storage.inner.contains("repository/1/2/2.container.json"));
    let spine = storage.inner.json("repository/1/index.json").unwrap();
    assert_eq!(spine["structure"], json!([]));
}

#[tokio::test]
async fn filesystem_storage_backs_a_full_publish() {
    let temp = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryLiveStore::default());
    store.insert_schema(serde_yaml::from_str::<SchemaConfig>(SCHEMA).unwrap());
    store.insert_repository(repository(1));
    store.insert_activity(activity(1, 1, None, "COURSE"));
    store.insert_container(container(1, 1, "SECTION"));
    store.insert_element(
        Some(1),
        Some(1),
        TeachingElement::new(10, "TEXT", json!({ "content": "hello" })).with_position(3.0),
    );
    let storage = Arc::new(FilesystemStorage::new(temp.path(), "/storage"));
    let publisher = Publisher::new(
        &PublisherConfig::default(),
        storage,
        store.clone(),
        ExtensionRegistry::new(),
    );

    let activity = store.activity(1).await.unwrap();
    publisher.publish_activity(&activity).await.unwrap();

    let snapshot: Value = serde_json::from_slice(
        &std::fs::read(temp.path().join("repository/1/1/1.container.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["elements"][0]["position"], 1);
    assert!(temp.path().join("repository/1/index.json").is_file());
    assert!(temp.path().join("repository/index.json").is_file());
}
