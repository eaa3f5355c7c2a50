use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{IntegrityError, PublishError};
use crate::model::{Activity, Container, Repository, TeachingElement, Timestamp};
use crate::schema::SchemaConfig;

/// Element type of assessment items stored directly under an activity.
pub const ASSESSMENT_TYPE: &str = "ASSESSMENT";

/// Narrow view of the relational store the publisher consumes.
#[async_trait]
pub trait LiveStore: Send + Sync {
    async fn repository(&self, id: i64) -> Result<Repository, PublishError>;
    async fn activity(&self, id: i64) -> Result<Activity, PublishError>;
    async fn schema_config(&self, repository: &Repository) -> Result<SchemaConfig, PublishError>;
    /// Child containers of `activity` whose type is one of `types`.
    async fn containers(
        &self,
        activity: &Activity,
        types: &[String],
    ) -> Result<Vec<Container>, PublishError>;
    /// Elements of a container, ordered by stored position ascending.
    async fn teaching_elements(
        &self,
        container: &Container,
    ) -> Result<Vec<TeachingElement>, PublishError>;
    /// Assessment elements attached directly to `activity`.
    async fn assessments(&self, activity: &Activity) -> Result<Vec<TeachingElement>, PublishError>;
    /// Activities that must be present in the spine before `activity`.
    async fn predecessors(&self, activity: &Activity) -> Result<Vec<Activity>, PublishError>;
    async fn save_published_at(
        &self,
        activity: &Activity,
        published_at: Option<Timestamp>,
    ) -> Result<(), PublishError>;
}

#[async_trait]
impl<S> LiveStore for Arc<S>
where
    S: LiveStore + ?Sized,
{
    async fn repository(&self, id: i64) -> Result<Repository, PublishError> {
        (**self).repository(id).await
    }

    async fn activity(&self, id: i64) -> Result<Activity, PublishError> {
        (**self).activity(id).await
    }

    async fn schema_config(&self, repository: &Repository) -> Result<SchemaConfig, PublishError> {
        (**self).schema_config(repository).await
    }

    async fn containers(
        &self,
        activity: &Activity,
        types: &[String],
    ) -> Result<Vec<Container>, PublishError> {
        (**self).containers(activity, types).await
    }

    async fn teaching_elements(
        &self,
        container: &Container,
    ) -> Result<Vec<TeachingElement>, PublishError> {
        (**self).teaching_elements(container).await
    }

    async fn assessments(&self, activity: &Activity) -> Result<Vec<TeachingElement>, PublishError> {
        (**self).assessments(activity).await
    }

    async fn predecessors(&self, activity: &Activity) -> Result<Vec<Activity>, PublishError> {
        (**self).predecessors(activity).await
    }

    async fn save_published_at(
        &self,
        activity: &Activity,
        published_at: Option<Timestamp>,
    ) -> Result<(), PublishError> {
        (**self).save_published_at(activity, published_at).await
    }
}

/// Stored element together with the records that own it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredElement {
    #[serde(default)]
    pub activity_id: Option<i64>,
    #[serde(default)]
    pub container_id: Option<i64>,
    #[serde(flatten)]
    pub element: TeachingElement,
}

/// Serializable dump of live content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiveSnapshot {
    pub schemas: Vec<SchemaConfig>,
    pub repositories: Vec<Repository>,
    pub activities: Vec<Activity>,
    pub containers: Vec<Container>,
    pub elements: Vec<StoredElement>,
    /// `(activity, predecessor)` pairs.
    pub predecessors: Vec<(i64, i64)>,
}

/// Live store held in memory, loadable from and savable to a JSON snapshot.
#[derive(Default)]
pub struct InMemoryLiveStore {
    snapshot: Mutex<LiveSnapshot>,
}

impl InMemoryLiveStore {
    pub fn new(snapshot: LiveSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let snapshot: LiveSnapshot = serde_json::from_str(&content).map_err(|err| {
            PublishError::Serialization(format!("invalid live snapshot {}: {err}", path.display()))
        })?;
        Ok(Self::new(snapshot))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PublishError> {
        let payload = serde_json::to_string_pretty(&*self.snapshot.lock())?;
        fs::write(path, payload)?;
        Ok(())
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        self.snapshot.lock().clone()
    }

    pub fn insert_repository(&self, repository: Repository) {
        let mut snapshot = self.snapshot.lock();
        snapshot.repositories.retain(|it| it.id != repository.id);
        snapshot.repositories.push(repository);
    }

    pub fn insert_schema(&self, schema: SchemaConfig) {
        let mut snapshot = self.snapshot.lock();
        snapshot.schemas.retain(|it| it.id != schema.id);
        snapshot.schemas.push(schema);
    }

    pub fn insert_activity(&self, activity: Activity) {
        let mut snapshot = self.snapshot.lock();
        snapshot.activities.retain(|it| it.id != activity.id);
        snapshot.activities.push(activity);
    }

    pub fn insert_container(&self, container: Container) {
        let mut snapshot = self.snapshot.lock();
        snapshot.containers.retain(|it| it.id != container.id);
        snapshot.containers.push(container);
    }

    pub fn insert_element(
        &self,
        activity_id: Option<i64>,
        container_id: Option<i64>,
        element: TeachingElement,
    ) {
        let mut snapshot = self.snapshot.lock();
        snapshot.elements.retain(|it| it.element.id != element.id);
        snapshot.elements.push(StoredElement {
            activity_id,
            container_id,
            element,
        });
    }

    pub fn add_predecessor(&self, activity_id: i64, predecessor_id: i64) {
        self.snapshot
            .lock()
            .predecessors
            .push((activity_id, predecessor_id));
    }
}

#[async_trait]
impl LiveStore for InMemoryLiveStore {
    async fn repository(&self, id: i64) -> Result<Repository, PublishError> {
        self.snapshot
            .lock()
            .repositories
            .iter()
            .find(|it| it.id == id)
            .cloned()
            .ok_or_else(|| IntegrityError::UnknownRepository(id).into())
    }

    async fn activity(&self, id: i64) -> Result<Activity, PublishError> {
        self.snapshot
            .lock()
            .activities
            .iter()
            .find(|it| it.id == id)
            .cloned()
            .ok_or_else(|| IntegrityError::UnknownActivity(id).into())
    }

    async fn schema_config(&self, repository: &Repository) -> Result<SchemaConfig, PublishError> {
        self.snapshot
            .lock()
            .schemas
            .iter()
            .find(|it| it.id == repository.schema)
            .cloned()
            .ok_or_else(|| IntegrityError::UnknownSchema(repository.schema.clone()).into())
    }

    async fn containers(
        &self,
        activity: &Activity,
        types: &[String],
    ) -> Result<Vec<Container>, PublishError> {
        let mut containers: Vec<Container> = self
            .snapshot
            .lock()
            .containers
            .iter()
            .filter(|it| it.activity_id == activity.id && types.contains(&it.kind))
            .cloned()
            .collect();
        containers.sort_by(|a, b| a.position.0.total_cmp(&b.position.0));
        Ok(containers)
    }

    async fn teaching_elements(
        &self,
        container: &Container,
    ) -> Result<Vec<TeachingElement>, PublishError> {
        let mut elements: Vec<TeachingElement> = self
            .snapshot
            .lock()
            .elements
            .iter()
            .filter(|it| it.container_id == Some(container.id))
            .map(|it| it.element.clone())
            .collect();
        elements.sort_by(|a, b| {
            let a = a.position.map(|p| p.0).unwrap_or_default();
            let b = b.position.map(|p| p.0).unwrap_or_default();
            a.total_cmp(&b)
        });
        Ok(elements)
    }

    async fn assessments(&self, activity: &Activity) -> Result<Vec<TeachingElement>, PublishError> {
        Ok(self
            .snapshot
            .lock()
            .elements
            .iter()
            .filter(|it| {
                it.activity_id == Some(activity.id)
                    && it.container_id.is_none()
                    && it.element.kind == ASSESSMENT_TYPE
            })
            .map(|it| it.element.clone())
            .collect())
    }

    async fn predecessors(&self, activity: &Activity) -> Result<Vec<Activity>, PublishError> {
        let snapshot = self.snapshot.lock();
        Ok(snapshot
            .predecessors
            .iter()
            .filter(|(id, _)| *id == activity.id)
            .filter_map(|(_, predecessor)| {
                snapshot.activities.iter().find(|it| it.id == *predecessor).cloned()
            })
            .collect())
    }

    async fn save_published_at(
        &self,
        activity: &Activity,
        published_at: Option<Timestamp>,
    ) -> Result<(), PublishError> {
        let mut snapshot = self.snapshot.lock();
        let record = snapshot
            .activities
            .iter_mut()
            .find(|it| it.id == activity.id)
            .ok_or(IntegrityError::UnknownActivity(activity.id))?;
        record.published_at = published_at;
        Ok(())
    }
}
