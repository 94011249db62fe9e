use crate::engine::assembler::BuildArtifact;
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::packager::Packager;
use async_compression::tokio::write::GzipEncoder;
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

#[derive(Debug)]
pub struct TarGz;

#[async_trait]
impl Packager for TarGz {
    async fn build_package(&self, artifact: &BuildArtifact, archive: &Path) -> ReleaseResult<()> {
        let file = File::create(archive)
            .await
            .map_err(ReleaseError::io(archive))?;

        let mut builder = tokio_tar::Builder::new(GzipEncoder::new(file));
        builder.follow_symlinks(false);

        let mut top = tokio::fs::read_dir(&artifact.staging_dir)
            .await
            .map_err(ReleaseError::io(&artifact.staging_dir))?;

        let mut children = vec![];
        while let Some(entry) = top
            .next_entry()
            .await
            .map_err(ReleaseError::io(&artifact.staging_dir))?
        {
            children.push(entry.path());
        }
        children.sort();

        for child in children {
            let name = match child.file_name() {
                Some(name) => name.to_owned(),
                None => continue,
            };

            let result = if child.is_dir() {
                builder.append_dir_all(&name, &child).await
            } else {
                builder.append_path_with_name(&child, &name).await
            };
            result.map_err(ReleaseError::io(&child))?;
        }

        let mut encoder = builder
            .into_inner()
            .await
            .map_err(ReleaseError::io(archive))?;
        encoder.shutdown().await.map_err(ReleaseError::io(archive))?;

        Ok(())
    }
}
