use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{PublisherConfig, RepositoryLayout};
use crate::content::{ActivityContent, ContentPublisher, ContentSummary};
use crate::error::PublishError;
use crate::locks::PublishLocks;
use crate::model::{Activity, Repository, Timestamp, now};
use crate::registry::ExtensionRegistry;
use crate::spine::{Spine, SpineManager, SpineNode};
use crate::statics::StaticResolver;
use crate::storage::ObjectStorage;
use crate::store::LiveStore;

/// Result of a successful publish.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub repository_id: i64,
    pub activity_id: i64,
    pub version: Option<String>,
    pub published_at: Option<Timestamp>,
    pub content: ContentSummary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDeletion {
    pub key: String,
    pub error: String,
}

/// What an unpublish removed. Deletion is best-effort per file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpublishReport {
    pub removed: Vec<i64>,
    pub deleted_files: Vec<String>,
    pub failed_files: Vec<FailedDeletion>,
}

impl UnpublishReport {
    /// False when some snapshot file could not be deleted.
    pub fn is_complete(&self) -> bool {
        self.failed_files.is_empty()
    }
}

/// Writes content snapshots, then the spine, then the catalog, and records
/// `publishedAt` on the live activity last. A failed step leaves the previous
/// spine in place, so calls can be retried.
pub struct Publisher {
    store: Arc<dyn LiveStore>,
    storage: Arc<dyn ObjectStorage>,
    layout: RepositoryLayout,
    content: ContentPublisher,
    spines: SpineManager,
    locks: PublishLocks,
}

impl Publisher {
    pub fn new(
        config: &PublisherConfig,
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn LiveStore>,
        registry: ExtensionRegistry,
    ) -> Self {
        let registry = Arc::new(registry);
        let statics = Arc::new(StaticResolver::new(
            storage.clone(),
            registry.clone(),
            config.assets_path.clone(),
        ));
        let content = ContentPublisher::new(
            storage.clone(),
            store.clone(),
            registry,
            statics,
            config.layout,
        );
        Self {
            spines: SpineManager::new(storage.clone()),
            store,
            storage,
            layout: config.layout,
            content,
            locks: PublishLocks::new(),
        }
    }

    pub fn spines(&self) -> &SpineManager {
        &self.spines
    }

    pub fn store(&self) -> &dyn LiveStore {
        self.store.as_ref()
    }

    /// Publishes `activity` and its content, then stamps it as published.
    pub async fn publish_activity(&self, activity: &Activity) -> Result<PublishOutcome, PublishError> {
        self.publish(activity)
            .await
            .map_err(|err| err.context(format!("publishing activity {}", activity.id)))
    }

    async fn publish(&self, activity: &Activity) -> Result<PublishOutcome, PublishError> {
        let repository = self.store.repository(activity.repository_id).await?;
        let _guard = self.locks.repository(repository.id).await;

        let (schema, mut spine, predecessors) = futures::try_join!(
            self.store.schema_config(&repository),
            self.spines.load(&repository),
            self.store.predecessors(activity),
        )?;

        for predecessor in &predecessors {
            if !spine.contains(predecessor.id) {
                debug!(activity = activity.id, predecessor = predecessor.id, "adding predecessor");
                spine.upsert(SpineNode::from_activity(predecessor, &schema));
            }
        }

        let mut activity = activity.clone();
        activity.published_at = Some(now());
        spine.upsert(SpineNode::from_activity(&activity, &schema));

        let content = self.content.publish(&schema, &activity).await?;
        let summary = content.summary();
        if let Some(node) = spine.node_mut(activity.id) {
            node.attach_summary(summary.clone());
        }

        let saved = self.spines.save(&spine).await?;
        self.update_catalog(&repository, saved.published_at).await?;
        self.store
            .save_published_at(&activity, activity.published_at)
            .await?;

        info!(
            repository = repository.id,
            activity = activity.id,
            version = saved.version.as_deref().unwrap_or_default(),
            containers = summary.content_containers.len(),
            "published activity"
        );
        Ok(PublishOutcome {
            repository_id: repository.id,
            activity_id: activity.id,
            version: saved.version,
            published_at: saved.published_at,
            content: summary,
        })
    }

    /// Removes `activity` and its descendants from the spine and deletes their
    /// snapshot files. An activity that was never published is a no-op.
    pub async fn unpublish_activity(
        &self,
        repository: &Repository,
        activity: &Activity,
    ) -> Result<UnpublishReport, PublishError> {
        self.unpublish(repository, activity)
            .await
            .map_err(|err| err.context(format!("unpublishing activity {}", activity.id)))
    }

    async fn unpublish(
        &self,
        repository: &Repository,
        activity: &Activity,
    ) -> Result<UnpublishReport, PublishError> {
        let _guard = self.locks.repository(repository.id).await;
        let mut spine = self.spines.load(repository).await?;
        let Some(node) = spine.node(activity.id) else {
            debug!(activity = activity.id, "activity is not published");
            return Ok(UnpublishReport::default());
        };

        let mut deleted: Vec<&SpineNode> = spine.descendants(activity.id);
        deleted.push(node);
        let keys: Vec<String> = deleted
            .iter()
            .flat_map(|node| self.snapshot_keys(repository.id, node))
            .collect();
        let removed: BTreeSet<i64> = deleted.iter().map(|node| node.id).collect();

        let results = join_all(keys.iter().map(|key| self.storage.delete_file(key))).await;
        let mut report = UnpublishReport {
            removed: deleted.iter().map(|node| node.id).collect(),
            ..UnpublishReport::default()
        };
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(()) => report.deleted_files.push(key),
                Err(err) => {
                    warn!(key, error = %err, "failed to delete snapshot file");
                    report.failed_files.push(FailedDeletion {
                        key,
                        error: err.to_string(),
                    });
                }
            }
        }

        spine.remove_nodes(&removed);
        let saved = self.spines.save(&spine).await?;
        self.update_catalog(repository, saved.published_at).await?;
        self.store.save_published_at(activity, None).await?;

        info!(
            repository = repository.id,
            activity = activity.id,
            removed = report.removed.len(),
            deleted = report.deleted_files.len(),
            failed = report.failed_files.len(),
            "unpublished activity"
        );
        Ok(report)
    }

    /// Refreshes repository-level attributes on the spine and catalog.
    pub async fn publish_repository_details(
        &self,
        repository: &Repository,
    ) -> Result<Spine, PublishError> {
        let _guard = self.locks.repository(repository.id).await;
        let mut spine = self.spines.load(repository).await?;
        spine.apply_repository(repository);
        let saved = self.spines.save(&spine).await?;
        self.update_catalog(repository, saved.published_at).await?;
        info!(repository = repository.id, "published repository details");
        Ok(saved)
    }

    pub async fn fetch_activity_content(
        &self,
        repository: &Repository,
        activity: &Activity,
        signed: bool,
    ) -> Result<ActivityContent, PublishError> {
        let schema = self.store.schema_config(repository).await?;
        self.content
            .fetch_activity_content(&schema, activity, signed)
            .await
    }

    async fn update_catalog(
        &self,
        repository: &Repository,
        published_at: Option<Timestamp>,
    ) -> Result<(), PublishError> {
        let _guard = self.locks.catalog().await;
        self.spines.update_catalog(repository, published_at).await?;
        Ok(())
    }

    /// Snapshot files a published node owns. Publishing always writes the
    /// assessments file, so it is always listed; missing keys delete cleanly.
    fn snapshot_keys(&self, repository_id: i64, node: &SpineNode) -> Vec<String> {
        let mut names = vec![self.layout.assessments_name(node.id)];
        names.extend(
            node.content_containers
                .iter()
                .flatten()
                .map(|container| {
                    RepositoryLayout::container_name(container.id, &container.published_as)
                }),
        );
        names
            .iter()
            .map(|name| self.layout.snapshot_key(repository_id, node.id, name))
            .collect()
    }
}
