//! Embedded asset handling for teaching elements.
//!
//! Two directions share one dispatch shape:
//! - `process` (write path) canonicalizes raw uploads into content-addressed keys;
//! - `resolve` (read path) turns stored keys into servable URLs.
//!
//! Question elements fan out over `data.question`, composites over `data.embeds`,
//! and primitives go to a type-specific handler or the generic asset-map pass.

mod image;
mod scorm;

use std::sync::Arc;

use futures::future::{BoxFuture, try_join_all};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{IntegrityError, PublishError};
use crate::fetch::PublishedContainer;
use crate::model::TeachingElement;
use crate::registry::ExtensionRegistry;
use crate::storage::{ObjectStorage, UrlOptions};

/// Prefix marking an asset-map value as a key in object storage.
pub const STORAGE_PROTOCOL: &str = "storage://";

const IMAGE_TYPE: &str = "IMAGE";
const SCORM_TYPE: &str = "SCORM";

pub struct StaticResolver {
    storage: Arc<dyn ObjectStorage>,
    registry: Arc<ExtensionRegistry>,
    assets_path: String,
}

impl StaticResolver {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        registry: Arc<ExtensionRegistry>,
        assets_path: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            registry,
            assets_path: assets_path.into().trim_matches('/').to_string(),
        }
    }

    pub fn storage(&self) -> &dyn ObjectStorage {
        self.storage.as_ref()
    }

    pub fn assets_path(&self) -> &str {
        &self.assets_path
    }

    /// Write path entry point. Registered element extensions take precedence.
    pub fn process<'a>(
        &'a self,
        element: TeachingElement,
    ) -> BoxFuture<'a, Result<TeachingElement, PublishError>> {
        Box::pin(async move {
            match self.registry.element(&element.kind).cloned() {
                Some(extension) => extension.process_statics(element, self).await,
                None => self.process_default(element).await,
            }
        })
    }

    pub async fn process_default(
        &self,
        element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        if element.is_question() {
            self.process_question(element).await
        } else {
            self.process_asset(element).await
        }
    }

    /// Read path entry point. Registered element extensions take precedence.
    pub fn resolve<'a>(
        &'a self,
        element: TeachingElement,
    ) -> BoxFuture<'a, Result<TeachingElement, PublishError>> {
        Box::pin(async move {
            match self.registry.element(&element.kind).cloned() {
                Some(extension) => extension.resolve_statics(element, self).await,
                None => self.resolve_default(element).await,
            }
        })
    }

    pub async fn resolve_default(
        &self,
        element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        if element.is_question() {
            self.resolve_question(element).await
        } else {
            self.resolve_asset(element).await
        }
    }

    /// Resolves every element of a container concurrently, keeping element order.
    pub async fn resolve_container(
        &self,
        mut container: PublishedContainer,
    ) -> Result<PublishedContainer, PublishError> {
        let elements = std::mem::take(&mut container.elements);
        container.elements = self.resolve_all(elements).await?;
        Ok(container)
    }

    pub async fn resolve_all(
        &self,
        elements: Vec<TeachingElement>,
    ) -> Result<Vec<TeachingElement>, PublishError> {
        try_join_all(elements.into_iter().map(|element| self.resolve(element))).await
    }

    pub async fn process_all(
        &self,
        elements: Vec<TeachingElement>,
    ) -> Result<Vec<TeachingElement>, PublishError> {
        try_join_all(elements.into_iter().map(|element| self.process(element))).await
    }

    async fn process_question(
        &self,
        mut element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        let items = take_question(&mut element);
        let mut processed = Vec::with_capacity(items.len());
        for item in items {
            let item = decode_item(&element, item)?;
            processed.push(serde_json::to_value(self.process_asset(item).await?)?);
        }
        restore_question(&mut element, processed);
        Ok(element)
    }

    async fn process_asset(&self, element: TeachingElement) -> Result<TeachingElement, PublishError> {
        if element.is_primitive() {
            self.process_primitive(element).await
        } else {
            self.process_composite(element).await
        }
    }

    async fn process_primitive(
        &self,
        element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        ensure_primitive(&element)?;
        match element.kind.as_str() {
            IMAGE_TYPE => image::process(self, element).await,
            SCORM_TYPE => scorm::process(self, element).await,
            _ => Ok(element),
        }
    }

    async fn process_composite(
        &self,
        mut element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        let embeds = take_embeds(&mut element);
        let mut processed = Map::with_capacity(embeds.len());
        for (key, embed) in embeds {
            let embed = decode_item(&element, embed)?;
            processed.insert(key, serde_json::to_value(self.process_primitive(embed).await?)?);
        }
        set_data_field(&mut element, "embeds", Value::Object(processed));
        Ok(element)
    }

    async fn resolve_question(
        &self,
        element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        let mut element = self.resolve_assets_map(element).await?;
        let items = take_question(&mut element);
        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            let item = decode_item(&element, item)?;
            resolved.push(serde_json::to_value(self.resolve_asset(item).await?)?);
        }
        restore_question(&mut element, resolved);
        Ok(element)
    }

    async fn resolve_asset(&self, element: TeachingElement) -> Result<TeachingElement, PublishError> {
        if element.is_primitive() {
            self.resolve_primitive(element).await
        } else {
            self.resolve_composite(element).await
        }
    }

    async fn resolve_primitive(
        &self,
        element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        ensure_primitive(&element)?;
        match element.kind.as_str() {
            IMAGE_TYPE => image::resolve(self, element).await,
            SCORM_TYPE => scorm::resolve(self, element).await,
            _ => self.resolve_assets_map(element).await,
        }
    }

    async fn resolve_composite(
        &self,
        element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        let mut element = self.resolve_assets_map(element).await?;
        let embeds = take_embeds(&mut element);
        let decoded = embeds
            .into_iter()
            .map(|(key, embed)| decode_item(&element, embed).map(|embed| (key, embed)))
            .collect::<Result<Vec<_>, _>>()?;

        let resolved = try_join_all(decoded.into_iter().map(|(key, embed)| async move {
            let embed = self.resolve_primitive(embed).await?;
            Ok::<_, PublishError>((key, serde_json::to_value(embed)?))
        }))
        .await?;

        set_data_field(&mut element, "embeds", Value::Object(resolved.into_iter().collect()));
        Ok(element)
    }

    /// Rewrites every `storage://` value of `data.assets` to a servable URL.
    async fn resolve_assets_map(
        &self,
        mut element: TeachingElement,
    ) -> Result<TeachingElement, PublishError> {
        let pending: Vec<(String, String)> = element
            .data_field("assets")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .filter_map(|(name, value)| {
                let key = value.as_str()?.strip_prefix(STORAGE_PROTOCOL)?;
                Some((name.clone(), key.to_string()))
            })
            .collect();
        if pending.is_empty() {
            return Ok(element);
        }

        let urls = try_join_all(
            pending
                .iter()
                .map(|(_, key)| self.storage.get_file_url(key, UrlOptions::default())),
        )
        .await?;
        debug!(element = %element.label(), count = urls.len(), "resolved asset map");

        if let Some(assets) = element
            .data
            .as_object_mut()
            .and_then(|data| data.get_mut("assets"))
            .and_then(Value::as_object_mut)
        {
            for ((name, _), url) in pending.into_iter().zip(urls) {
                assets.insert(name, Value::String(url));
            }
        }
        Ok(element)
    }
}

fn ensure_primitive(element: &TeachingElement) -> Result<(), PublishError> {
    if element.is_primitive() {
        Ok(())
    } else {
        Err(IntegrityError::InvalidPrimitive {
            element: element.label(),
        }
        .into())
    }
}

fn decode_item(owner: &TeachingElement, value: Value) -> Result<TeachingElement, PublishError> {
    serde_json::from_value(value).map_err(|err| {
        IntegrityError::MalformedElement {
            element: owner.label(),
            reason: err.to_string(),
        }
        .into()
    })
}

fn take_question(element: &mut TeachingElement) -> Vec<Value> {
    match element
        .data
        .as_object_mut()
        .and_then(|data| data.get_mut("question"))
    {
        Some(Value::Array(items)) => std::mem::take(items),
        _ => Vec::new(),
    }
}

fn restore_question(element: &mut TeachingElement, items: Vec<Value>) {
    if let Some(Value::Array(slot)) = element
        .data
        .as_object_mut()
        .and_then(|data| data.get_mut("question"))
    {
        *slot = items;
    }
}

fn take_embeds(element: &mut TeachingElement) -> Map<String, Value> {
    match element
        .data
        .as_object_mut()
        .and_then(|data| data.get_mut("embeds"))
    {
        Some(Value::Object(embeds)) => std::mem::take(embeds),
        _ => Map::new(),
    }
}

pub(crate) fn set_data_field(element: &mut TeachingElement, name: &str, value: Value) {
    if !element.data.is_object() {
        element.data = Value::Object(Map::new());
    }
    if let Value::Object(data) = &mut element.data {
        data.insert(name.to_string(), value);
    }
}
