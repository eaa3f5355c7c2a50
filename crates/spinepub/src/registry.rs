use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PublishError;
use crate::fetch::PublishedContainer;
use crate::model::{Activity, TeachingElement};
use crate::statics::StaticResolver;
use crate::store::LiveStore;

/// Custom container type with its own storage shape.
#[async_trait]
pub trait ContainerExtension: Send + Sync {
    /// Loads every container of this type under `activity`.
    async fn fetch(
        &self,
        activity: &Activity,
        store: &dyn LiveStore,
    ) -> Result<Vec<PublishedContainer>, PublishError>;

    async fn resolve_statics(
        &self,
        container: PublishedContainer,
        statics: &StaticResolver,
    ) -> Result<PublishedContainer, PublishError> {
        statics.resolve_container(container).await
    }
}

/// Custom element type with its own asset handling.
#[async_trait]
pub trait ElementExtension: Send + Sync {
    async fn process_statics(
        &self,
        element: TeachingElement,
        statics: &StaticResolver,
    ) -> Result<TeachingElement, PublishError> {
        statics.process_default(element).await
    }

    async fn resolve_statics(
        &self,
        element: TeachingElement,
        statics: &StaticResolver,
    ) -> Result<TeachingElement, PublishError> {
        statics.resolve_default(element).await
    }
}

/// Per-type strategies. Types without one fall back to the built-in path.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    containers: BTreeMap<String, Arc<dyn ContainerExtension>>,
    elements: BTreeMap<String, Arc<dyn ElementExtension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_container(
        &mut self,
        kind: impl Into<String>,
        extension: Arc<dyn ContainerExtension>,
    ) -> &mut Self {
        self.containers.insert(kind.into(), extension);
        self
    }

    pub fn register_element(
        &mut self,
        kind: impl Into<String>,
        extension: Arc<dyn ElementExtension>,
    ) -> &mut Self {
        self.elements.insert(kind.into(), extension);
        self
    }

    pub fn container(&self, kind: &str) -> Option<&Arc<dyn ContainerExtension>> {
        self.containers.get(kind)
    }

    pub fn element(&self, kind: &str) -> Option<&Arc<dyn ElementExtension>> {
        self.elements.get(kind)
    }

    /// Container types not claimed by an extension use the default fetch path.
    pub fn is_core_container(&self, kind: &str) -> bool {
        !self.containers.contains_key(kind)
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("containers", &self.containers.keys().collect::<Vec<_>>())
            .field("elements", &self.elements.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Passthrough;

    impl ElementExtension for Passthrough {}

    #[test]
    fn unregistered_container_types_are_core() {
        let mut registry = ExtensionRegistry::new();
        registry.register_element("HTML", Arc::new(Passthrough));
        assert!(registry.is_core_container("SECTION"));
        assert!(registry.element("HTML").is_some());
        assert!(registry.element("IMAGE").is_none());
        assert_eq!(
            format!("{registry:?}"),
            "ExtensionRegistry { containers: [], elements: [\"HTML\"] }"
        );
    }
}
