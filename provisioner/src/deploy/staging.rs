//! Staging helpers shared by the executors

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::ProvisionerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::{is_path_component, DeploymentRequest, OutputData, OutputNames};
use crate::storage::layout::{inputs_file, output_file, secrets_file};

/// Copy `{module_root}/{module_type}` into `target`.
///
/// Top-level `*.tf` and `*.tf.json` files left by an earlier module are
/// removed first; `.terraform/` and generated files stay.
pub async fn copy_module(
    module_root: &Path,
    module_type: &str,
    target: &Dir,
) -> Result<u64, ProvisionerError> {
    let source = Dir::new(module_root.join(module_type));
    if !is_path_component(module_type) || !source.exists().await {
        return Err(ProvisionerError::ModuleNotFound(
            source.path().display().to_string(),
        ));
    }

    let removed = remove_stale_sources(target).await.map_err(|e| {
        ProvisionerError::StagingError(format!(
            "clear {}: {}",
            target.path().display(),
            e
        ))
    })?;
    if removed > 0 {
        debug!(files = removed, "removed stale module sources");
    }

    let copied = target.copy_contents_from(&source).await.map_err(|e| {
        ProvisionerError::StagingError(format!(
            "copy {} to {}: {}",
            source.path().display(),
            target.path().display(),
            e
        ))
    })?;

    debug!(module = module_type, files = copied, "staged module");
    Ok(copied)
}

async fn remove_stale_sources(target: &Dir) -> Result<usize, ProvisionerError> {
    if !target.exists().await {
        return Ok(0);
    }

    let mut removed = 0;
    for path in target.list_files().await? {
        let is_source = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(".tf") || name.ends_with(".tf.json"));
        if is_source {
            File::new(path).delete().await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Write the merged parameters file
pub async fn write_parameters(
    request: &DeploymentRequest,
    target: &Dir,
) -> Result<File, ProvisionerError> {
    let file = inputs_file(target, &request.package_id);
    file.write_json(&request.merged_parameters()).await?;
    Ok(file)
}

/// Write the secrets file, readable by the owner only
pub async fn write_secrets(
    request: &DeploymentRequest,
    target: &Dir,
) -> Result<File, ProvisionerError> {
    let file = secrets_file(target, &request.package_id);
    let secrets = parse_secrets(&request.secrets);

    // Restrict before any secret lands on disk
    file.write_string("").await?;
    file.set_permissions_600().await?;
    file.write_json(&secrets).await?;
    Ok(file)
}

/// Decode each secret value as JSON, keeping it as a literal string otherwise
pub fn parse_secrets(secrets: &BTreeMap<String, String>) -> Map<String, Value> {
    secrets
        .iter()
        .map(|(name, raw)| {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| {
                warn!(secret = %name, "secret is not valid JSON, using it as a string");
                Value::String(raw.clone())
            });
            (name.clone(), value)
        })
        .collect()
}

/// Unwrap `{"value": ...}` entries as produced by `terraform output -json`
pub fn normalize_outputs(raw: OutputData) -> OutputData {
    raw.into_iter()
        .map(|(name, entry)| match entry {
            Value::Object(mut wrapper) if wrapper.contains_key("value") => {
                let value = wrapper.remove("value").unwrap_or(Value::Null);
                (name, value)
            }
            other => (name, other),
        })
        .collect()
}

/// Keep only declared outputs; undeclared are dropped, missing are skipped
pub fn filter_outputs(outputs: OutputData, declared: &OutputNames) -> OutputData {
    outputs
        .into_iter()
        .filter(|(name, _)| declared.contains(name))
        .collect()
}

/// Write the final outputs file
pub async fn persist_outputs(
    package_id: &str,
    target: &Dir,
    outputs: &OutputData,
) -> Result<File, ProvisionerError> {
    let file = output_file(target, package_id);
    file.write_json(outputs).await?;
    Ok(file)
}
