use crate::engine::environment::external;
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::icons::{IconAssetSet, MASTER_SIZE};
use crate::engine::provision::{Provisioner, RSVG_CONVERT};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::fmt::Debug;
use std::path::Path;
use tracing::debug;

/// Corner radius of the rounded mask as a fraction of the canvas edge.
pub const CORNER_RADIUS_RATIO: f32 = 0.225;

#[async_trait]
pub trait VectorRenderer: Send + Sync + Debug {
    async fn ensure_available(&self) -> ReleaseResult<()>;

    /// Renders `source` into a `size`×`size` PNG at `destination`.
    async fn render(&self, source: &Path, destination: &Path, size: u32) -> ReleaseResult<()>;
}

#[derive(Debug)]
pub struct RsvgRenderer {
    provisioner: Provisioner,
}

impl RsvgRenderer {
    pub fn new(provisioner: Provisioner) -> Self {
        RsvgRenderer { provisioner }
    }
}

#[async_trait]
impl VectorRenderer for RsvgRenderer {
    async fn ensure_available(&self) -> ReleaseResult<()> {
        self.provisioner.ensure(&RSVG_CONVERT).await
    }

    async fn render(&self, source: &Path, destination: &Path, size: u32) -> ReleaseResult<()> {
        let size = size.to_string();
        let status = external(RSVG_CONVERT.command)
            .args(["--width", &size[..], "--height", &size[..], "--format", "png", "--output"])
            .arg(destination)
            .arg(source)
            .status()
            .await
            .map_err(|e| ReleaseError::ToolUnavailable {
                tool: RSVG_CONVERT.command.to_string(),
                remedy: e.to_string(),
            })?;

        if !status.success() {
            return Err(ReleaseError::Image {
                path: source.to_path_buf(),
                reason: format!("{} exited with {}", RSVG_CONVERT.command, status),
            });
        }

        Ok(())
    }
}

fn mask_coverage(x: u32, y: u32, edge: f32, radius: f32) -> f32 {
    let px = x as f32 + 0.5;
    let py = y as f32 + 0.5;
    let cx = px.clamp(radius, edge - radius);
    let cy = py.clamp(radius, edge - radius);
    let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();

    (radius - dist + 0.5).clamp(0.0, 1.0)
}

/// Multiplies alpha by a rounded-rectangle mask with an antialiased edge.
pub fn apply_rounded_mask(image: &mut RgbaImage) {
    let edge = image.width().min(image.height()) as f32;
    let radius = (edge * CORNER_RADIUS_RATIO).max(1.0);

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let coverage = mask_coverage(x, y, edge, radius);
        pixel[3] = (pixel[3] as f32 * coverage).round() as u8;
    }
}

/// Renders the master bitmap once, masks it, then writes one downsample per
/// resolution. Every size is derived from the same masked master.
pub async fn rasterize(renderer: &dyn VectorRenderer, set: &IconAssetSet) -> ReleaseResult<()> {
    let master_path = set.master_path();
    renderer
        .render(&set.source, &master_path, MASTER_SIZE)
        .await?;

    let mut master = image::open(&master_path)
        .map_err(ReleaseError::image(&master_path))?
        .into_rgba8();

    if master.width() != MASTER_SIZE || master.height() != MASTER_SIZE {
        debug!(
            "renderer produced {}x{}, normalising to {}",
            master.width(),
            master.height(),
            MASTER_SIZE
        );
        master = imageops::resize(&master, MASTER_SIZE, MASTER_SIZE, FilterType::Lanczos3);
    }

    apply_rounded_mask(&mut master);
    master
        .save(&master_path)
        .map_err(ReleaseError::image(&master_path))?;

    for size in &set.resolutions {
        let path = set.bitmap_path(*size);
        let bitmap = imageops::resize(&master, *size, *size, FilterType::Lanczos3);
        bitmap.save(&path).map_err(ReleaseError::image(&path))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn mask_clears_corners_and_keeps_centre() {
        let mut img = RgbaImage::from_pixel(64, 64, Rgba([200, 10, 10, 255]));
        apply_rounded_mask(&mut img);

        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(63, 63)[3], 0);
        assert_eq!(img.get_pixel(32, 32)[3], 255);
        assert_eq!(img.get_pixel(32, 0)[3], 255);
        assert_eq!(img.get_pixel(32, 32)[0], 200);
    }

    #[test]
    fn mask_radius_scales_with_canvas() {
        let transparent_run = |edge: u32| {
            let mut img = RgbaImage::from_pixel(edge, edge, Rgba([0, 0, 0, 255]));
            apply_rounded_mask(&mut img);
            (0..edge).take_while(|i| img.get_pixel(*i, *i)[3] == 0).count() as f32
                / edge as f32
        };

        let small = transparent_run(128);
        let large = transparent_run(512);
        assert!(small > 0.0);
        assert!((small - large).abs() < 0.01, "{} vs {}", small, large);
    }
}
