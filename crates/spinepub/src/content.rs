use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RepositoryLayout;
use crate::error::PublishError;
use crate::fetch::{PublishedContainer, fetch_assessments, fetch_containers};
use crate::model::{Activity, TeachingElement};
use crate::registry::ExtensionRegistry;
use crate::schema::SchemaConfig;
use crate::spine::{AssessmentSummary, ContainerSummary};
use crate::statics::StaticResolver;
use crate::storage::{ObjectStorage, SaveOptions};
use crate::store::LiveStore;

/// Everything published for one activity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityContent {
    pub containers: Vec<PublishedContainer>,
    pub assessments: Vec<TeachingElement>,
}

/// Compact per-activity summary recorded on the spine node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub content_containers: Vec<ContainerSummary>,
    pub assessments: Vec<AssessmentSummary>,
}

impl ActivityContent {
    pub fn summary(&self) -> ContentSummary {
        ContentSummary {
            content_containers: self.container_summaries(),
            assessments: self.assessment_summaries(),
        }
    }

    pub fn container_summaries(&self) -> Vec<ContainerSummary> {
        self.containers
            .iter()
            .map(|container| ContainerSummary {
                id: container.id,
                uid: container.uid.clone(),
                kind: container.kind.clone(),
                published_as: container.published_as.clone(),
                element_count: container.elements.len(),
            })
            .collect()
    }

    pub fn assessment_summaries(&self) -> Vec<AssessmentSummary> {
        self.assessments.iter().map(AssessmentSummary::from).collect()
    }
}

pub struct ContentPublisher {
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn LiveStore>,
    registry: Arc<ExtensionRegistry>,
    statics: Arc<StaticResolver>,
    layout: RepositoryLayout,
}

impl ContentPublisher {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn LiveStore>,
        registry: Arc<ExtensionRegistry>,
        statics: Arc<StaticResolver>,
        layout: RepositoryLayout,
    ) -> Self {
        Self {
            storage,
            store,
            registry,
            statics,
            layout,
        }
    }

    /// Fetches, canonicalizes and writes every container and the assessment group.
    /// Writes run concurrently; a failed write aborts the call but leaves the
    /// files already written in place.
    pub async fn publish(
        &self,
        schema: &SchemaConfig,
        activity: &Activity,
    ) -> Result<ActivityContent, PublishError> {
        let content = self.fetch(schema, activity).await?;
        let content = self.process(content).await?;

        let container_writes = content.containers.iter().map(|container| async move {
            self.save_snapshot(activity, &container.file_name(), container).await
        });
        let assessments_name = self.layout.assessments_name(activity.id);
        futures::try_join!(
            try_join_all(container_writes),
            self.save_snapshot(activity, &assessments_name, &content.assessments),
        )?;

        info!(
            activity = activity.id,
            containers = content.containers.len(),
            assessments = content.assessments.len(),
            "published activity content"
        );
        Ok(content)
    }

    /// Same fetch as publish without writing. With `signed`, every element's assets
    /// are resolved to servable URLs.
    pub async fn fetch_activity_content(
        &self,
        schema: &SchemaConfig,
        activity: &Activity,
        signed: bool,
    ) -> Result<ActivityContent, PublishError> {
        let content = self.fetch(schema, activity).await?;
        if !signed {
            return Ok(content);
        }

        let containers = try_join_all(
            content
                .containers
                .into_iter()
                .map(|container| self.resolve_container(container)),
        );
        let assessments = self.statics.resolve_all(content.assessments);
        let (containers, assessments) = futures::try_join!(containers, assessments)?;
        Ok(ActivityContent {
            containers,
            assessments,
        })
    }

    async fn fetch(
        &self,
        schema: &SchemaConfig,
        activity: &Activity,
    ) -> Result<ActivityContent, PublishError> {
        let store = self.store.as_ref();
        let (containers, assessments) = futures::try_join!(
            fetch_containers(store, &self.registry, schema, activity),
            fetch_assessments(store, activity),
        )?;
        Ok(ActivityContent {
            containers,
            assessments,
        })
    }

    async fn process(&self, content: ActivityContent) -> Result<ActivityContent, PublishError> {
        let containers = try_join_all(content.containers.into_iter().map(
            |mut container| async move {
                let elements = std::mem::take(&mut container.elements);
                container.elements = self.statics.process_all(elements).await?;
                Ok::<_, PublishError>(container)
            },
        ));
        let assessments = self.statics.process_all(content.assessments);
        let (containers, assessments) = futures::try_join!(containers, assessments)?;
        Ok(ActivityContent {
            containers,
            assessments,
        })
    }

    async fn resolve_container(
        &self,
        container: PublishedContainer,
    ) -> Result<PublishedContainer, PublishError> {
        match self.registry.container(&container.kind) {
            Some(extension) => extension.resolve_statics(container, &self.statics).await,
            None => self.statics.resolve_container(container).await,
        }
    }

    async fn save_snapshot<T: Serialize + Sync>(
        &self,
        activity: &Activity,
        name: &str,
        value: &T,
    ) -> Result<(), PublishError> {
        let key = self
            .layout
            .snapshot_key(activity.repository_id, activity.id, name);
        let payload = serde_json::to_vec(value)?;
        self.storage
            .save_file(&key, payload, SaveOptions::for_key(&key))
            .await
            .map_err(|err| err.context(&key))?;
        debug!(key, "wrote snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{Container, Position};
    use crate::store::{ASSESSMENT_TYPE, InMemoryLiveStore};
    use crate::storage::MemoryStorage;

    fn schema() -> SchemaConfig {
        serde_yaml::from_str("id: S\nstructure:\n  - type: MODULE\n    contentContainers: [SECTION]\n")
            .unwrap()
    }

    fn activity() -> Activity {
        serde_json::from_value(json!({ "id": 10, "repositoryId": 1, "type": "MODULE" })).unwrap()
    }

    fn fixture(layout: RepositoryLayout) -> (Arc<MemoryStorage>, ContentPublisher) {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(InMemoryLiveStore::default());
        store.insert_container(Container {
            id: 3,
            uid: Some("c3".into()),
            activity_id: 10,
            kind: "SECTION".into(),
            position: Position(1.0),
            created_at: None,
            updated_at: None,
        });
        store.insert_element(
            Some(10),
            Some(3),
            TeachingElement::new(
                1,
                "VIDEO",
                json!({ "assets": { "url": "storage://repository/assets/1/v.mp4" } }),
            )
            .with_position(4.0),
        );
        store.insert_element(
            Some(10),
            None,
            TeachingElement::new(2, ASSESSMENT_TYPE, json!({ "question": [] })),
        );

        let registry = Arc::new(ExtensionRegistry::new());
        let statics = Arc::new(StaticResolver::new(
            storage.clone(),
            registry.clone(),
            "repository/assets",
        ));
        let publisher = ContentPublisher::new(storage.clone(), store, registry, statics, layout);
        (storage, publisher)
    }

    #[tokio::test]
    async fn nested_layout_writes_under_activity_folder() {
        let (storage, publisher) = fixture(RepositoryLayout::Nested);
        let content = publisher.publish(&schema(), &activity()).await.unwrap();

        assert_eq!(
            storage.keys(),
            ["repository/1/10/3.container.json", "repository/1/10/assessments.json"]
        );
        let container = storage.json("repository/1/10/3.container.json").unwrap();
        assert_eq!(container["publishedAs"], "container");
        assert_eq!(container["elements"][0]["position"], 1);

        let summaries = content.container_summaries();
        assert_eq!(summaries[0].element_count, 1);
        assert_eq!(summaries[0].uid.as_deref(), Some("c3"));
        assert_eq!(content.assessment_summaries()[0].id, 2.into());
    }

    #[tokio::test]
    async fn flat_layout_prefixes_assessments_with_activity_id() {
        let (storage, publisher) = fixture(RepositoryLayout::Flat);
        publisher.publish(&schema(), &activity()).await.unwrap();
        assert!(storage.contains("repository/1/10.assessments.json"));
        assert!(storage.contains("repository/1/3.container.json"));
    }

    #[tokio::test]
    async fn signed_fetch_resolves_assets_without_writing() {
        let (storage, publisher) = fixture(RepositoryLayout::Nested);

        let plain = publisher
            .fetch_activity_content(&schema(), &activity(), false)
            .await
            .unwrap();
        assert_eq!(
            plain.containers[0].elements[0].data["assets"]["url"],
            "storage://repository/assets/1/v.mp4"
        );

        let signed = publisher
            .fetch_activity_content(&schema(), &activity(), true)
            .await
            .unwrap();
        assert_eq!(
            signed.containers[0].elements[0].data["assets"]["url"],
            "memory:///repository/assets/1/v.mp4"
        );
        assert!(storage.keys().is_empty());
    }
}
