//! rclone invocation for pushing crates to cloud remotes.

use crate::error::CrateError;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::process::Command;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Rclone {
    binary: PathBuf,
}

impl Rclone {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Rclone { binary: binary.into() }
    }

    /// Copy `source` to `<remote>:<destination>` using the user's remote settings.
    ///
    /// The settings are written to a private temporary config file that lives until
    /// rclone exits.
    pub async fn copy_to(
        &self,
        session_id: Uuid,
        remote: &str,
        settings: &Value,
        source: &Path,
        destination: &str,
    ) -> Result<(), CrateError> {
        let config = write_config(remote, settings)?;

        let target = format!("{}:{}", remote, destination);
        tracing::debug!(%session_id, source = %source.display(), target = %target, "rclone copyto");
        let output = Command::new(&self.binary)
            .arg("--config")
            .arg(config.path())
            .arg("copyto")
            .arg(source)
            .arg(&target)
            .output()
            .await?;
        drop(config);

        if !output.status.success() {
            return Err(CrateError::Rclone {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Config file with a unique name, readable by the owner only, removed on drop.
fn write_config(remote: &str, settings: &Value) -> Result<NamedTempFile, CrateError> {
    let mut file = tempfile::Builder::new()
        .prefix("describo-rclone-")
        .suffix(".conf")
        .tempfile()?;
    file.write_all(render_config(remote, settings).as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// INI section for one remote. Non-string values (e.g. the OAuth token) are written as JSON.
pub fn render_config(remote: &str, settings: &Value) -> String {
    let mut out = format!("[{}]\n", remote);
    let mut has_type = false;
    if let Some(map) = settings.as_object() {
        for (key, value) in map {
            if key == "type" {
                has_type = true;
            }
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            out.push_str(&format!("{} = {}\n", key, rendered));
        }
    }
    if !has_type {
        out.push_str(&format!("type = {}\n", remote));
    }
    out
}
