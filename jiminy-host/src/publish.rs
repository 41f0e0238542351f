//! Publish locations

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where a representation is published, relative to the publish repository
pub const PUBLISH_TEMPLATE: &str =
    "{publish}/{silo}/{asset}/{subset}/{asset}.{subset}.{representation}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("No value for '{{{0}}}'")]
    MissingField(String),

    #[error("Unclosed placeholder after '{0}'")]
    Unclosed(String),
}

/// File-system safe string of the current date and time
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%dT%H%M%SZ").to_string()
}

/// Publish repository of a workspace
pub fn publish_repo(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join("publish")
}

/// Fill `template` with `fields`
pub fn format_publish_path(
    template: &str,
    fields: &HashMap<&str, &str>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(TemplateError::Unclosed(out));
        };

        let key = &after[..end];
        let value = fields.get(key).ok_or_else(|| TemplateError::MissingField(key.to_string()))?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
