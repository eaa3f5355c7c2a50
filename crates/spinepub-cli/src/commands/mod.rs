use serde::Serialize;
use serde_json::Value;
use spinepub::{ActivityContent, CatalogEntry, PublishOutcome, Spine, UnpublishReport};

use crate::error::ExitStatus;

pub mod content;
pub mod inspect;
pub mod publish;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult {
    Published {
        outcome: PublishOutcome,
    },
    Unpublished {
        repository_id: i64,
        activity_id: i64,
        report: UnpublishReport,
    },
    DetailsPublished {
        repository_id: i64,
        version: Option<String>,
        published_at: Option<String>,
    },
    Content {
        activity_id: i64,
        signed: bool,
        content: ActivityContent,
    },
    Spine {
        spine: Spine,
    },
    Catalog {
        entries: Vec<CatalogEntry>,
    },
    Schema {
        document: String,
        schema: Value,
    },
}

impl CommandResult {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            CommandResult::Unpublished { report, .. } if !report.is_complete() => ExitStatus::Io,
            _ => ExitStatus::Ok,
        }
    }

    /// Commands that change live data and need the snapshot written back.
    pub fn mutates_live_data(&self) -> bool {
        matches!(
            self,
            CommandResult::Published { .. } | CommandResult::Unpublished { .. }
        )
    }
}
