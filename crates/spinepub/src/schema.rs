use serde::{Deserialize, Serialize};

pub const DEFAULT_PUBLISHED_AS: &str = "container";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub structure: Vec<ActivityConfig>,
    #[serde(default)]
    pub content_containers: Vec<ContainerConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityConfig {
    #[serde(rename = "type")]
    pub kind: String,
    /// Container types allowed directly under this activity type.
    #[serde(default)]
    pub content_containers: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub published_as: Option<String>,
}

impl SchemaConfig {
    pub fn activity(&self, kind: &str) -> Option<&ActivityConfig> {
        self.structure.iter().find(|config| config.kind == kind)
    }

    pub fn container_types(&self, activity_kind: &str) -> &[String] {
        self.activity(activity_kind)
            .map(|config| config.content_containers.as_slice())
            .unwrap_or_default()
    }

    pub fn relationship_types(&self, activity_kind: &str) -> impl Iterator<Item = &str> {
        self.activity(activity_kind)
            .into_iter()
            .flat_map(|config| config.relationships.iter())
            .map(|relationship| relationship.kind.as_str())
    }

    /// Published representation name of a container type.
    pub fn published_as(&self, container_kind: &str) -> &str {
        self.content_containers
            .iter()
            .find(|config| config.kind == container_kind)
            .and_then(|config| config.published_as.as_deref())
            .unwrap_or(DEFAULT_PUBLISHED_AS)
    }
}
