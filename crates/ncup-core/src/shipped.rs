//! Apps shipped inside a core release.
//!
//! Read from the realised core tree: `core/shipped.json` lists the shipped
//! and always-enabled apps, and each app's `appinfo/info.xml` carries its
//! metadata.

use std::collections::BTreeMap;
use std::path::Path;

use ncup_schema::{AppId, InternalApp};
use serde::Deserialize;

use crate::error::ShippedError;
use crate::xml::child_texts;

const SHIPPED_JSON: &str = "core/shipped.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShippedSpec {
    shipped_apps: Vec<String>,
    #[serde(default)]
    always_enabled: Vec<String>,
}

fn read(path: &Path) -> Result<String, ShippedError> {
    std::fs::read_to_string(path).map_err(|source| ShippedError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn internal_app(core_root: &Path, id: &str, always_enabled: bool) -> Result<InternalApp, ShippedError> {
    let path = core_root.join("apps").join(id).join("appinfo/info.xml");
    let mut info = child_texts(&read(&path)?).map_err(|reason| ShippedError::Xml {
        path: path.clone(),
        reason,
    })?;

    let name = info.remove("name").unwrap_or_else(|| id.to_string());
    let summary = info.remove("summary").unwrap_or_else(|| name.clone());

    Ok(InternalApp {
        summary,
        description: info.remove("description").unwrap_or_default(),
        licenses: vec![info.remove("licence").unwrap_or_else(|| "unknown".to_string())],
        enabled_by_default: Some(always_enabled || info.contains_key("default_enable")),
        always_enabled: Some(always_enabled),
        name,
    })
}

/// Every app shipped with the core release unpacked at `core_root`.
pub fn shipped_apps(core_root: &Path) -> Result<BTreeMap<AppId, InternalApp>, ShippedError> {
    let path = core_root.join(SHIPPED_JSON);
    let spec: ShippedSpec =
        serde_json::from_str(&read(&path)?).map_err(|source| ShippedError::Json { path, source })?;

    spec.shipped_apps
        .iter()
        .map(|id| {
            let always = spec.always_enabled.contains(id);
            Ok((AppId::new(id.as_str()), internal_app(core_root, id, always)?))
        })
        .collect()
}
