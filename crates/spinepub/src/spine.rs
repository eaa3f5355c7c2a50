use std::collections::BTreeSet;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::content::ContentSummary;
use crate::error::PublishError;
use crate::layout::{CATALOG_KEY, spine_key};
use crate::model::{Activity, ElementId, Position, Repository, TeachingElement, Timestamp, now};
use crate::schema::SchemaConfig;
use crate::storage::{ObjectStorage, SaveOptions};

const VERSION_FIELD: &str = "version";
const PUBLISHED_AT_FIELD: &str = "publishedAt";

/// Content summary of one published container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub published_as: String,
    pub element_count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSummary {
    pub id: ElementId,
    #[serde(default)]
    pub uid: Option<String>,
}

impl From<&TeachingElement> for AssessmentSummary {
    fn from(element: &TeachingElement) -> Self {
        Self {
            id: element.id.clone(),
            uid: element.uid.clone(),
        }
    }
}

/// One published activity inside a spine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpineNode {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub meta: Value,
    #[serde(default)]
    pub published_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Schema-declared relationship type to the activity's refs of that type.
    #[serde(default)]
    pub relationships: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_containers: Option<Vec<ContainerSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessments: Option<Vec<AssessmentSummary>>,
}

impl SpineNode {
    /// Flattens an activity into a spine record. Content summaries are attached separately.
    pub fn from_activity(activity: &Activity, schema: &SchemaConfig) -> Self {
        let relationships = schema
            .relationship_types(&activity.kind)
            .map(|kind| {
                let refs = activity
                    .refs
                    .get(kind)
                    .cloned()
                    .unwrap_or_else(|| Value::Array(Vec::new()));
                (kind.to_string(), refs)
            })
            .collect();

        Self {
            id: activity.id,
            uid: activity.uid.clone(),
            parent_id: activity.parent_id,
            kind: activity.kind.clone(),
            position: activity.position,
            meta: activity.data.clone(),
            published_at: activity.published_at,
            updated_at: activity.updated_at,
            created_at: activity.created_at,
            relationships,
            content_containers: None,
            assessments: None,
        }
    }

    pub fn attach_summary(&mut self, summary: ContentSummary) {
        self.content_containers = Some(summary.content_containers);
        self.assessments = Some(summary.assessments);
    }
}

/// Published, versioned snapshot of one repository's structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Spine {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub meta: Value,
    #[serde(default)]
    pub structure: Vec<SpineNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
}

impl Spine {
    /// Empty spine carrying the repository's current attributes.
    pub fn for_repository(repository: &Repository) -> Self {
        Self {
            id: repository.id,
            uid: repository.uid.clone(),
            schema: repository.schema.clone(),
            name: repository.name.clone(),
            description: repository.description.clone(),
            meta: repository.data.clone(),
            structure: Vec::new(),
            version: None,
            published_at: None,
        }
    }

    /// Overwrites repository-level attributes; `structure` is untouched.
    pub fn apply_repository(&mut self, repository: &Repository) {
        self.id = repository.id;
        self.uid = repository.uid.clone();
        self.schema = repository.schema.clone();
        self.name = repository.name.clone();
        self.description = repository.description.clone();
        self.meta = repository.data.clone();
    }

    pub fn node(&self, id: i64) -> Option<&SpineNode> {
        self.structure.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: i64) -> Option<&mut SpineNode> {
        self.structure.iter_mut().find(|node| node.id == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.node(id).is_some()
    }

    /// Replaces the record with the same id in place, or appends it.
    pub fn upsert(&mut self, node: SpineNode) {
        match self.node_mut(node.id) {
            Some(existing) => *existing = node,
            None => self.structure.push(node),
        }
    }

    /// Every node whose parent chain leads back to `id`, children before grandchildren.
    /// Revisited ids are skipped so a corrupt parent cycle cannot loop.
    pub fn descendants(&self, id: i64) -> Vec<&SpineNode> {
        let mut visited = BTreeSet::from([id]);
        let mut found = Vec::new();
        self.collect_descendants(id, &mut visited, &mut found);
        found
    }

    fn collect_descendants<'a>(
        &'a self,
        id: i64,
        visited: &mut BTreeSet<i64>,
        found: &mut Vec<&'a SpineNode>,
    ) {
        let children: Vec<&SpineNode> = self
            .structure
            .iter()
            .filter(|node| node.parent_id == Some(id) && visited.insert(node.id))
            .collect();
        found.extend(children.iter().copied());
        for child in children {
            self.collect_descendants(child.id, visited, found);
        }
    }

    pub fn remove_nodes(&mut self, ids: &BTreeSet<i64>) {
        self.structure.retain(|node| !ids.contains(&node.id));
    }

    /// Stable content hash, independent of key order. Publish timestamps are
    /// excluded at both spine and node level so re-publishing unchanged content
    /// keeps the version.
    pub fn compute_version(&self) -> Result<String, PublishError> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(spine) = &mut value {
            spine.remove(VERSION_FIELD);
            spine.remove(PUBLISHED_AT_FIELD);
            if let Some(Value::Array(nodes)) = spine.get_mut("structure") {
                for node in nodes.iter_mut().filter_map(Value::as_object_mut) {
                    node.remove(PUBLISHED_AT_FIELD);
                }
            }
        }

        let canonical = serde_json::to_vec(&sorted(value))?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sorted(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// One repository in the global catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub meta: Value,
    #[serde(default)]
    pub published_at: Option<Timestamp>,
    /// Fields written by other tooling survive a merge.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(repository: &Repository, published_at: Option<Timestamp>) -> Self {
        Self {
            id: repository.id,
            uid: repository.uid.clone(),
            schema: repository.schema.clone(),
            name: repository.name.clone(),
            description: repository.description.clone(),
            meta: repository.data.clone(),
            published_at,
            extra: Map::new(),
        }
    }

    fn merge(&mut self, update: CatalogEntry) {
        self.uid = update.uid;
        self.schema = update.schema;
        self.name = update.name;
        self.description = update.description;
        self.meta = update.meta;
        self.published_at = update.published_at;
    }
}

/// Reads and writes spines and the catalog in object storage.
#[derive(Clone)]
pub struct SpineManager {
    storage: Arc<dyn ObjectStorage>,
}

impl SpineManager {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Stored spine, or an empty one synthesized from the repository.
    pub async fn load(&self, repository: &Repository) -> Result<Spine, PublishError> {
        let key = spine_key(repository.id);
        match self.read_json::<Spine>(&key).await? {
            Some(spine) => Ok(spine),
            None => {
                debug!(repository = repository.id, "no published spine, starting empty");
                Ok(Spine::for_repository(repository))
            }
        }
    }

    /// Stamps version and `publishedAt`, writes the spine, and returns the stamped copy.
    pub async fn save(&self, spine: &Spine) -> Result<Spine, PublishError> {
        let mut saved = spine.clone();
        saved.version = Some(spine.compute_version()?);
        saved.published_at = Some(now());

        let key = spine_key(saved.id);
        self.write_json(&key, &saved).await?;
        info!(
            repository = saved.id,
            version = saved.version.as_deref().unwrap_or_default(),
            nodes = saved.structure.len(),
            "saved spine"
        );
        Ok(saved)
    }

    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>, PublishError> {
        Ok(self.read_json(CATALOG_KEY).await?.unwrap_or_default())
    }

    /// Merges the repository's attributes and `published_at` into the catalog.
    /// Read-modify-write of the whole file; callers serialize concurrent updates.
    pub async fn update_catalog(
        &self,
        repository: &Repository,
        published_at: Option<Timestamp>,
    ) -> Result<Vec<CatalogEntry>, PublishError> {
        let mut catalog = self.catalog().await?;
        let entry = CatalogEntry::new(repository, published_at);
        match catalog.iter_mut().find(|it| it.id == repository.id) {
            Some(existing) => existing.merge(entry),
            None => catalog.push(entry),
        }
        self.write_json(CATALOG_KEY, &catalog).await?;
        debug!(repository = repository.id, entries = catalog.len(), "updated catalog");
        Ok(catalog)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, PublishError> {
        let Some(bytes) = self.storage.get_file(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| PublishError::from(err).context(key))
    }

    async fn write_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(value)?;
        self.storage
            .save_file(key, payload, SaveOptions::for_key(key))
            .await
            .map_err(|err| err.context(key))
    }
}
