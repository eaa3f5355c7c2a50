pub mod config;
pub mod content;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod locks;
pub mod model;
pub mod publisher;
pub mod registry;
pub mod schema;
pub mod spine;
pub mod statics;
pub mod storage;
pub mod store;

pub use config::{PublisherConfig, RepositoryLayout, StorageConfig};
pub use content::{ActivityContent, ContentPublisher, ContentSummary};
pub use error::{IntegrityError, PublishError};
pub use fetch::{PublishedContainer, fetch_assessments, fetch_containers, fetch_default_container};
pub use layout::{CATALOG_KEY, spine_key};
pub use locks::PublishLocks;
pub use model::{Activity, Container, ElementId, Position, Repository, TeachingElement, Timestamp};
pub use publisher::{FailedDeletion, PublishOutcome, Publisher, UnpublishReport};
pub use registry::{ContainerExtension, ElementExtension, ExtensionRegistry};
pub use schema::{ActivityConfig, ContainerConfig, RelationshipConfig, SchemaConfig};
pub use spine::{
    AssessmentSummary, CatalogEntry, ContainerSummary, Spine, SpineManager, SpineNode,
};
pub use statics::{STORAGE_PROTOCOL, StaticResolver};
pub use storage::{FilesystemStorage, MemoryStorage, ObjectStorage, SaveOptions, UrlOptions};
pub use store::{ASSESSMENT_TYPE, InMemoryLiveStore, LiveSnapshot, LiveStore, StoredElement};
