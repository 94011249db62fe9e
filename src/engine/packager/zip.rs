use crate::engine::assembler::BuildArtifact;
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::packager::{member_name, Packager};
use crate::utils::FileWalker;
use async_trait::async_trait;
use async_zip::tokio::write::ZipFileWriter;
use async_zip::{Compression, ZipEntryBuilder};
use std::io;
use std::path::Path;
use tokio::fs::File;

#[derive(Debug)]
pub struct Zip;

fn zip_error(err: async_zip::error::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

#[cfg(unix)]
async fn unix_mode(path: &Path) -> io::Result<u16> {
    use std::os::unix::fs::PermissionsExt;
    let meta = tokio::fs::metadata(path).await?;
    Ok((meta.permissions().mode() & 0o7777) as u16)
}

#[cfg(not(unix))]
async fn unix_mode(_path: &Path) -> io::Result<u16> {
    Ok(0o644)
}

#[async_trait]
impl Packager for Zip {
    async fn build_package(&self, artifact: &BuildArtifact, archive: &Path) -> ReleaseResult<()> {
        let file = File::create(archive)
            .await
            .map_err(ReleaseError::io(archive))?;
        let mut writer = ZipFileWriter::with_tokio(file);

        let paths = match FileWalker::new(&artifact.staging_dir).await {
            Ok(files) => files.collect_sorted().await,
            Err(e) => Err(e),
        }
        .map_err(ReleaseError::io(&artifact.staging_dir))?;

        for path in paths {
            let relative = match path.strip_prefix(&artifact.staging_dir) {
                Ok(relative) => relative,
                Err(_) => continue,
            };

            let data = tokio::fs::read(&path)
                .await
                .map_err(ReleaseError::io(&path))?;
            let mode = unix_mode(&path).await.map_err(ReleaseError::io(&path))?;

            let builder = ZipEntryBuilder::new(member_name(relative).into(), Compression::Deflate)
                .unix_permissions(mode);

            writer
                .write_entry_whole(builder, &data)
                .await
                .map_err(|e| ReleaseError::io(&path)(zip_error(e)))?;
        }

        writer
            .close()
            .await
            .map_err(|e| ReleaseError::io(archive)(zip_error(e)))?;

        Ok(())
    }
}
