use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::PublishError;
use crate::model::{Activity, Container, Position, TeachingElement, Timestamp};
use crate::registry::ExtensionRegistry;
use crate::schema::{DEFAULT_PUBLISHED_AS, SchemaConfig};
use crate::store::LiveStore;

/// A container with its ordered elements, as written to its snapshot file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedContainer {
    pub id: i64,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default = "default_published_as")]
    pub published_as: String,
    #[serde(default)]
    pub elements: Vec<TeachingElement>,
    /// Attributes contributed by extension containers.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_published_as() -> String {
    DEFAULT_PUBLISHED_AS.to_string()
}

impl PublishedContainer {
    pub fn new(container: &Container, elements: Vec<TeachingElement>) -> Self {
        Self {
            id: container.id,
            uid: container.uid.clone(),
            kind: container.kind.clone(),
            position: container.position,
            created_at: container.created_at,
            updated_at: container.updated_at,
            published_as: default_published_as(),
            elements,
            extra: Map::new(),
        }
    }

    /// Snapshot file stem, `<id>.<publishedAs>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.published_as)
    }
}

/// Every container allowed under `activity`, core types first, then extension types.
pub async fn fetch_containers(
    store: &dyn LiveStore,
    registry: &ExtensionRegistry,
    schema: &SchemaConfig,
    activity: &Activity,
) -> Result<Vec<PublishedContainer>, PublishError> {
    let allowed = schema.container_types(&activity.kind);
    let (core, custom): (Vec<String>, Vec<String>) = allowed
        .iter()
        .cloned()
        .partition(|kind| registry.is_core_container(kind));

    let core_fetch = async {
        if core.is_empty() {
            return Ok::<_, PublishError>(Vec::new());
        }
        let containers = store.containers(activity, &core).await?;
        try_join_all(
            containers
                .iter()
                .map(|container| fetch_default_container(store, container)),
        )
        .await
    };
    let custom_fetch = try_join_all(custom.iter().filter_map(|kind| {
        registry
            .container(kind)
            .map(|extension| extension.fetch(activity, store))
    }));

    let (core, custom) = futures::try_join!(core_fetch, custom_fetch)?;
    let mut containers: Vec<PublishedContainer> =
        core.into_iter().chain(custom.into_iter().flatten()).collect();
    for container in &mut containers {
        container.published_as = schema.published_as(&container.kind).to_string();
    }
    debug!(activity = activity.id, count = containers.len(), "fetched containers");
    Ok(containers)
}

/// Loads a core container's elements and renumbers their positions densely from 1.
pub async fn fetch_default_container(
    store: &dyn LiveStore,
    container: &Container,
) -> Result<PublishedContainer, PublishError> {
    let mut elements = store.teaching_elements(container).await?;
    elements.sort_by(|a, b| {
        let a = a.position.map(|p| p.0).unwrap_or_default();
        let b = b.position.map(|p| p.0).unwrap_or_default();
        a.total_cmp(&b)
    });
    for (index, element) in elements.iter_mut().enumerate() {
        element.position = Some(Position::ordinal(index));
    }
    Ok(PublishedContainer::new(container, elements))
}

pub async fn fetch_assessments(
    store: &dyn LiveStore,
    activity: &Activity,
) -> Result<Vec<TeachingElement>, PublishError> {
    store.assessments(activity).await
}
