use crate::definition::target::Target;
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::icons::rasterizer::VectorRenderer;
use crate::engine::toolchain::{binary_path, BuildProfile, Toolchain};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("shipwright-tests")
        .join(format!("{}-{}-{}", name, std::process::id(), nanos));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_png(path: &Path, size: u32) {
    RgbaImage::from_pixel(size, size, Rgba([40, 120, 220, 255]))
        .save(path)
        .unwrap();
}

/// Renders every source as a fully opaque square.
#[derive(Debug, Default)]
pub struct FakeRenderer {
    pub renders: Arc<AtomicUsize>,
}

#[async_trait]
impl VectorRenderer for FakeRenderer {
    async fn ensure_available(&self) -> ReleaseResult<()> {
        Ok(())
    }

    async fn render(&self, _source: &Path, destination: &Path, size: u32) -> ReleaseResult<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        write_png(destination, size);
        Ok(())
    }
}

/// Writes a placeholder binary where cargo would, failing for chosen triples.
#[derive(Debug)]
pub struct FakeToolchain {
    pub target_dir: PathBuf,
    pub host: String,
    pub failing: Vec<String>,
    pub builds: Arc<Mutex<Vec<(String, BuildProfile)>>>,
}

impl FakeToolchain {
    pub fn new(target_dir: PathBuf) -> Self {
        FakeToolchain {
            target_dir,
            host: "x86_64-unknown-linux-gnu".to_string(),
            failing: vec![],
            builds: Default::default(),
        }
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn host_triple(&self) -> ReleaseResult<String> {
        Ok(self.host.clone())
    }

    async fn target_directory(&self) -> ReleaseResult<PathBuf> {
        Ok(self.target_dir.clone())
    }

    async fn build(
        &self,
        target: &Target,
        binary: &str,
        profile: BuildProfile,
    ) -> ReleaseResult<()> {
        self.builds
            .lock()
            .unwrap()
            .push((target.triple.clone(), profile));

        if self.failing.contains(&target.triple) {
            return Err(ReleaseError::ToolchainFailure {
                triple: target.triple.clone(),
                reason: "cargo exited with exit status: 101".to_string(),
            });
        }

        let path = binary_path(&self.target_dir, target, binary);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, format!("binary for {}", target.triple))
            .await
            .unwrap();
        Ok(())
    }
}
