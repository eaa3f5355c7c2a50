use crate::config::RepositoryLayout;

/// Global repository catalog.
pub const CATALOG_KEY: &str = "repository/index.json";

const ASSESSMENTS_FILE: &str = "assessments";

/// Spine document of one repository.
pub fn spine_key(repository_id: i64) -> String {
    format!("repository/{repository_id}/index.json")
}

impl RepositoryLayout {
    /// Folder holding one activity's snapshot files.
    pub fn base_path(self, repository_id: i64, activity_id: i64) -> String {
        match self {
            RepositoryLayout::Flat => format!("repository/{repository_id}"),
            RepositoryLayout::Nested => format!("repository/{repository_id}/{activity_id}"),
        }
    }

    /// File stem of the assessment group written for an activity.
    pub fn assessments_name(self, activity_id: i64) -> String {
        match self {
            RepositoryLayout::Flat => format!("{activity_id}.{ASSESSMENTS_FILE}"),
            RepositoryLayout::Nested => ASSESSMENTS_FILE.to_string(),
        }
    }

    pub fn container_name(container_id: i64, published_as: &str) -> String {
        format!("{container_id}.{published_as}")
    }

    /// Full key of a snapshot file given its stem.
    pub fn snapshot_key(self, repository_id: i64, activity_id: i64, name: &str) -> String {
        format!("{}/{name}.json", self.base_path(repository_id, activity_id))
    }
}
