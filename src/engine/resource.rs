use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::icons::IconAssetSet;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const ICON_RESOURCE_ID: u32 = 1;
pub const RESOURCE_FILE: &str = "icon.rc";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResourceOutcome {
    Created,
    Preserved,
}

/// The resource script the Windows linker step compiles to embed the icon.
pub fn descriptor_path(icons: &IconAssetSet) -> PathBuf {
    icons.assets.join(RESOURCE_FILE)
}

pub fn render_descriptor(icons: &IconAssetSet) -> String {
    let ico = icons
        .ico
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "icon.ico".to_string());

    format!("{} ICON \"{}\"\n", ICON_RESOURCE_ID, ico)
}

/// Writes the descriptor unless one exists; an existing file is never touched.
pub async fn ensure_descriptor(icons: &IconAssetSet) -> ReleaseResult<ResourceOutcome> {
    let path = descriptor_path(icons);

    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %path.display(), "keeping existing resource descriptor");
            return Ok(ResourceOutcome::Preserved);
        }
        Err(e) => return Err(ReleaseError::io(&path)(e)),
    };

    file.write_all(render_descriptor(icons).as_bytes())
        .await
        .map_err(ReleaseError::io(&path))?;
    file.sync_all().await.map_err(ReleaseError::io(&path))?;

    info!(path = %path.display(), "wrote resource descriptor");
    Ok(ResourceOutcome::Created)
}
