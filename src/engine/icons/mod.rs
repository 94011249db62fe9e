pub mod containers;
pub mod icns;
pub mod rasterizer;
pub mod winico;
pub mod witness;

use crate::definition::ReleaseOptions;
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::icons::rasterizer::VectorRenderer;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const RESOLUTIONS: [u32; 6] = [16, 32, 48, 64, 128, 256];
pub const MASTER_SIZE: u32 = 512;

/// Paths of everything the icon barrier reads and writes.
#[derive(Debug, Clone)]
pub struct IconAssetSet {
    pub assets: PathBuf,
    pub source: PathBuf,
    pub resolutions: Vec<u32>,
    pub icns: PathBuf,
    pub ico: PathBuf,
    pub preview: PathBuf,
    pub witness: PathBuf,
    pub rgba: PathBuf,
}

impl IconAssetSet {
    pub fn new(assets: &Path, source: &str) -> Self {
        IconAssetSet {
            assets: assets.to_path_buf(),
            source: assets.join(source),
            resolutions: RESOLUTIONS.to_vec(),
            icns: assets.join("icon.icns"),
            ico: assets.join("icon.ico"),
            preview: assets.join("icon.png"),
            witness: assets.join("icon.sha256"),
            rgba: assets.join("icon.rgba"),
        }
    }

    pub fn bitmap_path(&self, size: u32) -> PathBuf {
        self.assets.join(format!("icon_{}.png", size))
    }

    pub fn master_path(&self) -> PathBuf {
        self.assets.join("icon_master.png")
    }

    pub fn outputs(&self) -> [&Path; 3] {
        [&self.icns, &self.ico, &self.preview]
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IconOutcome {
    Fresh,
    Generated,
}

#[derive(Debug)]
pub struct IconPipeline {
    renderer: Box<dyn VectorRenderer>,
}

impl IconPipeline {
    pub fn new(renderer: Box<dyn VectorRenderer>) -> Self {
        IconPipeline { renderer }
    }

    pub async fn prepare(
        &self,
        set: &IconAssetSet,
        options: &ReleaseOptions,
    ) -> ReleaseResult<IconOutcome> {
        let source = match tokio::fs::read(&set.source).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ReleaseError::MissingInput {
                    path: set.source.clone(),
                })
            }
            Err(e) => return Err(ReleaseError::io(&set.source)(e)),
        };

        let fingerprint = witness::fingerprint(&source, &set.resolutions);

        let outcome = if witness::is_fresh(set, &fingerprint).await? {
            info!("icon containers are up to date");
            IconOutcome::Fresh
        } else {
            witness::invalidate(set).await?;
            self.generate(set).await?;
            witness::record(set, &fingerprint).await?;
            IconOutcome::Generated
        };

        if options.rgba_dump
            && (outcome == IconOutcome::Generated || tokio::fs::metadata(&set.rgba).await.is_err())
        {
            dump_rgba(set).await?;
        }

        Ok(outcome)
    }

    async fn generate(&self, set: &IconAssetSet) -> ReleaseResult<()> {
        info!(source = %set.source.display(), "generating icon containers");
        self.renderer.ensure_available().await?;

        let built = match rasterizer::rasterize(self.renderer.as_ref(), set).await {
            Ok(()) => containers::package(set).await,
            Err(e) => Err(e),
        };

        let removed = containers::remove_intermediates(set).await;
        built?;

        let removed = removed?;
        info!(intermediates = removed, "icon containers written");
        Ok(())
    }
}

/// Raw RGBA8 pixels of the preview, for runtime window icons.
async fn dump_rgba(set: &IconAssetSet) -> ReleaseResult<()> {
    let png = tokio::fs::read(&set.preview)
        .await
        .map_err(ReleaseError::io(&set.preview))?;
    let pixels = image::load_from_memory(&png)
        .map_err(ReleaseError::image(&set.preview))?
        .into_rgba8();

    if pixels.width() != pixels.height() {
        warn!("preview is not square, rgba dump keeps its shape");
    }

    tokio::fs::write(&set.rgba, pixels.as_raw())
        .await
        .map_err(ReleaseError::io(&set.rgba))
}
