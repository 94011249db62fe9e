use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::icons::icns::{self, IcnsElement, APPLE_SLOTS};
use crate::engine::icons::{winico, IconAssetSet};
use image::RgbaImage;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Encoded PNG bytes plus decoded pixels for one resolution.
struct Bitmap {
    png: Vec<u8>,
    pixels: RgbaImage,
}

async fn load_bitmaps(set: &IconAssetSet) -> ReleaseResult<BTreeMap<u32, Bitmap>> {
    let mut bitmaps = BTreeMap::new();
    let mut missing = vec![];

    for size in &set.resolutions {
        let path = set.bitmap_path(*size);
        let png = match tokio::fs::read(&path).await {
            Ok(png) => png,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                missing.push(format!("{}px", size));
                continue;
            }
            Err(e) => return Err(ReleaseError::io(&path)(e)),
        };

        let pixels = image::load_from_memory(&png)
            .map_err(ReleaseError::image(&path))?
            .into_rgba8();

        if pixels.width() != *size || pixels.height() != *size {
            missing.push(format!("{}px (found {}x{})", size, pixels.width(), pixels.height()));
            continue;
        }

        bitmaps.insert(*size, Bitmap { png, pixels });
    }

    if !missing.is_empty() {
        return Err(ReleaseError::PartialAssetSet { missing });
    }

    Ok(bitmaps)
}

/// Writes next to `path` then renames, so a container is either complete or absent.
async fn write_whole(path: &Path, data: &[u8]) -> ReleaseResult<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    tokio::fs::write(&partial, data)
        .await
        .map_err(ReleaseError::io(&partial))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(ReleaseError::io(path))
}

/// Builds both containers and the flat preview from the full bitmap set.
pub async fn package(set: &IconAssetSet) -> ReleaseResult<()> {
    let bitmaps = load_bitmaps(set).await?;

    let mut elements = Vec::with_capacity(APPLE_SLOTS.len());
    for slot in APPLE_SLOTS.iter() {
        let bitmap = bitmaps
            .get(&slot.source)
            .ok_or_else(|| ReleaseError::PartialAssetSet {
                missing: vec![format!("{} ({}px)", slot.name, slot.source)],
            })?;

        elements.push(IcnsElement {
            ostype: slot.ostype,
            data: bitmap.png.clone(),
        });
    }

    let icns = icns::encode(&elements).map_err(ReleaseError::io(&set.icns))?;

    let pixels: Vec<RgbaImage> = bitmaps.values().map(|b| b.pixels.clone()).collect();
    let ico = winico::encode(&pixels).map_err(ReleaseError::io(&set.ico))?;

    write_whole(&set.icns, &icns).await?;
    write_whole(&set.ico, &ico).await?;

    let (largest, bitmap) = bitmaps
        .iter()
        .next_back()
        .ok_or_else(|| ReleaseError::PartialAssetSet { missing: vec![] })?;
    debug!("preview taken from {}px bitmap", largest);
    write_whole(&set.preview, &bitmap.png).await?;

    Ok(())
}

/// Deletes every `icon_*.png` intermediate in the assets directory.
pub async fn remove_intermediates(set: &IconAssetSet) -> ReleaseResult<usize> {
    let glob = wax::Glob::from_str("icon_*.png").map_err(|e| ReleaseError::Image {
        path: set.assets.clone(),
        reason: e.to_string(),
    })?;

    let mut removed = 0;
    let matches: Vec<PathBuf> = glob
        .walk(&set.assets)
        .filter_map(Result::ok)
        .map(|entry| set.assets.join(entry.to_candidate_path().as_ref()))
        .collect();

    for path in matches {
        tokio::fs::remove_file(&path)
            .await
            .map_err(ReleaseError::io(&path))?;
        removed += 1;
    }

    Ok(removed)
}
