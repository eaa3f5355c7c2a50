use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde_json::Value;
use tracing::debug;

use super::{STORAGE_PROTOCOL, StaticResolver, set_data_field};
use crate::error::{IntegrityError, PublishError};
use crate::model::TeachingElement;
use crate::storage::UrlOptions;

const MANIFEST_FILE: &str = "imsmanifest.xml";
const LAUNCH_URL: &str = "launchUrl";

pub(super) async fn process(
    statics: &StaticResolver,
    mut element: TeachingElement,
) -> Result<TeachingElement, PublishError> {
    let key = manifest_key(&element).ok_or_else(|| IntegrityError::MissingManifest {
        element: element.label(),
    })?;
    let manifest = statics
        .storage()
        .get_file(&key)
        .await?
        .ok_or_else(|| IntegrityError::ManifestNotFound { key: key.clone() })?;
    let entry = launch_entry(&manifest).map_err(|reason| IntegrityError::MalformedManifest {
        key: key.clone(),
        reason,
    })?;

    let root = element
        .data_field("root")
        .and_then(Value::as_str)
        .map(|root| root.trim_matches('/'))
        .filter(|root| !root.is_empty())
        .ok_or_else(|| IntegrityError::MissingPackageRoot {
            element: element.label(),
        })?;
    let launch_url = format!("{}/{root}/{entry}", statics.assets_path());
    debug!(element = %element.label(), manifest = key, launch_url, "resolved package entry point");

    set_data_field(&mut element, LAUNCH_URL, Value::String(launch_url));
    Ok(element)
}

pub(super) async fn resolve(
    statics: &StaticResolver,
    mut element: TeachingElement,
) -> Result<TeachingElement, PublishError> {
    let Some(key) = element
        .data_field(LAUNCH_URL)
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
    else {
        return Ok(element);
    };
    let url = statics
        .storage()
        .get_file_url(&key, UrlOptions::default())
        .await?;
    set_data_field(&mut element, LAUNCH_URL, Value::String(url));
    Ok(element)
}

fn manifest_key(element: &TeachingElement) -> Option<String> {
    element
        .data_field("assets")?
        .as_object()?
        .values()
        .filter_map(Value::as_str)
        .find(|value| value.ends_with(MANIFEST_FILE))
        .map(|value| value.strip_prefix(STORAGE_PROTOCOL).unwrap_or(value).to_string())
}

/// `href` of the first `resource` declared under `resources`.
fn launch_entry(manifest: &[u8]) -> Result<String, String> {
    let mut reader = Reader::from_reader(manifest);
    let mut buf = Vec::new();
    let mut in_resources = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(tag)) if tag.local_name().as_ref() == b"resources" => {
                in_resources = true;
            }
            Ok(Event::End(tag)) if tag.local_name().as_ref() == b"resources" => {
                in_resources = false;
            }
            Ok(Event::Start(tag) | Event::Empty(tag))
                if in_resources && tag.local_name().as_ref() == b"resource" =>
            {
                for attribute in tag.attributes() {
                    let attribute = attribute.map_err(|err| err.to_string())?;
                    if attribute.key.local_name().as_ref() == b"href" {
                        let href = attribute.unescape_value().map_err(|err| err.to_string())?;
                        return Ok(href.into_owned());
                    }
                }
                return Err("first resource has no href".to_string());
            }
            Ok(Event::Eof) => return Err("no resource declared".to_string()),
            Ok(_) => {}
            Err(err) => {
                return Err(format!(
                    "parse error at byte {}: {err}",
                    reader.buffer_position()
                ));
            }
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::registry::ExtensionRegistry;
    use crate::storage::{MemoryStorage, ObjectStorage, SaveOptions};

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest identifier="course" xmlns="http://www.imsglobal.org/xsd/imscp_v1p1"
          xmlns:adlcp="http://www.adlnet.org/xsd/adlcp_v1p3">
  <organizations default="org">
    <organization identifier="org"><title>Course</title></organization>
  </organizations>
  <resources>
    <resource identifier="r1" type="webcontent" adlcp:scormType="sco" href="content/index.html?lang=en&amp;mode=full">
      <file href="content/index.html"/>
    </resource>
    <resource identifier="r2" type="webcontent" href="other.html"/>
  </resources>
</manifest>"#;

    fn package(assets: serde_json::Value) -> TeachingElement {
        TeachingElement::new(7, "SCORM", json!({ "root": "pkg-7", "assets": assets }))
    }

    async fn statics_with_manifest() -> StaticResolver {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save_file(
                "repository/assets/pkg-7/imsmanifest.xml",
                MANIFEST.as_bytes().to_vec(),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        StaticResolver::new(storage, Arc::new(ExtensionRegistry::new()), "repository/assets")
    }

    #[test]
    fn first_resource_href_is_the_entry_point() {
        assert_eq!(
            launch_entry(MANIFEST.as_bytes()).unwrap(),
            "content/index.html?lang=en&mode=full"
        );
        assert!(launch_entry(b"<manifest><resources/></manifest>").is_err());
        assert!(launch_entry(b"<manifest><resources><resource/></resources></manifest>").is_err());
    }

    #[tokio::test]
    async fn launch_url_is_rooted_in_the_package_folder() {
        let statics = statics_with_manifest().await;
        let element = package(json!({
            "manifest": "storage://repository/assets/pkg-7/imsmanifest.xml"
        }));

        let processed = statics.process(element).await.unwrap();
        assert_eq!(
            processed.data["launchUrl"],
            "repository/assets/pkg-7/content/index.html?lang=en&mode=full"
        );

        let resolved = statics.resolve(processed).await.unwrap();
        assert_eq!(
            resolved.data["launchUrl"],
            "memory:///repository/assets/pkg-7/content/index.html?lang=en&mode=full"
        );
    }

    #[tokio::test]
    async fn missing_manifest_asset_is_fatal_for_the_element() {
        let statics = statics_with_manifest().await;
        let err = statics
            .process(package(json!({ "readme": "storage://x/readme.txt" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::Integrity(IntegrityError::MissingManifest { .. })
        ));

        let err = statics
            .process(package(json!({ "manifest": "storage://x/imsmanifest.xml" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::Integrity(IntegrityError::ManifestNotFound { .. })
        ));
    }
}
