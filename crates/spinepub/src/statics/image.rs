use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{StaticResolver, set_data_field};
use crate::error::{IntegrityError, PublishError};
use crate::model::TeachingElement;
use crate::storage::{SaveOptions, UrlOptions, ensure_safe_key};

const FALLBACK_EXTENSION: &str = "png";

/// Stores an inline data URI under a content-addressed key, or strips the origin
/// from an absolute URL. Relative keys pass through.
pub(super) async fn process(
    statics: &StaticResolver,
    mut element: TeachingElement,
) -> Result<TeachingElement, PublishError> {
    let Some(url) = element.data_field("url").and_then(Value::as_str) else {
        return Ok(element);
    };

    let rewritten = if let Some(uri) = url.strip_prefix("data:") {
        let (extension, bytes) = decode_data_uri(&element, uri)?;
        let key = format!(
            "{}/{}/{}.{extension}",
            statics.assets_path(),
            element.id,
            content_hash(&element.id.to_string(), &bytes)
        );
        statics
            .storage()
            .save_file(&key, bytes, SaveOptions::for_key(&key))
            .await
            .map_err(|err| err.context(format!("saving image {}", element.label())))?;
        debug!(element = %element.label(), key, "stored inline image");
        key
    } else {
        match Url::parse(url) {
            Ok(parsed) if parsed.has_host() => parsed.path().trim_start_matches('/').to_string(),
            _ => return Ok(element),
        }
    };

    set_data_field(&mut element, "url", Value::String(rewritten));
    Ok(element)
}

/// Swaps a stored key for a servable URL. A key that no longer exists is left as-is.
pub(super) async fn resolve(
    statics: &StaticResolver,
    mut element: TeachingElement,
) -> Result<TeachingElement, PublishError> {
    let Some(key) = element
        .data_field("url")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return Ok(element);
    };
    if ensure_safe_key(&key).is_err() {
        return Ok(element);
    }

    if !statics.storage().file_exists(&key).await? {
        warn!(element = %element.label(), key, "image asset missing from storage");
        return Ok(element);
    }
    let url = statics
        .storage()
        .get_file_url(&key, UrlOptions::default())
        .await?;
    set_data_field(&mut element, "url", Value::String(url));
    Ok(element)
}

fn decode_data_uri(
    element: &TeachingElement,
    uri: &str,
) -> Result<(String, Vec<u8>), PublishError> {
    let invalid = |reason: &str| IntegrityError::InvalidDataUri {
        element: element.label(),
        reason: reason.to_string(),
    };

    let (header, payload) = uri.split_once(',').ok_or_else(|| invalid("missing payload"))?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("only base64 data URIs are supported"))?;
    let subtype: String = media_type
        .strip_prefix("image/")
        .unwrap_or_default()
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect();
    let extension = if subtype.is_empty() {
        FALLBACK_EXTENSION.to_string()
    } else {
        subtype.to_ascii_lowercase()
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| invalid(&err.to_string()))?;
    Ok((extension, bytes))
}

fn content_hash(id: &str, bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(id.as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
