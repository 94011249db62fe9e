use crate::definition::target::ArchiveFormat;
use crate::engine::assembler::BuildArtifact;
use crate::engine::error::ReleaseResult;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Component, Path};

mod tarball;
mod zip;

pub use tarball::TarGz;
pub use zip::Zip;

#[async_trait]
pub trait Packager: Send + Sync + Debug {
    /// Compresses the staged tree of `artifact` into `archive`, replacing it.
    async fn build_package(&self, artifact: &BuildArtifact, archive: &Path) -> ReleaseResult<()>;
}

pub fn packager_for(format: ArchiveFormat) -> &'static dyn Packager {
    match format {
        ArchiveFormat::Zip => &Zip,
        ArchiveFormat::TarGz => &TarGz,
    }
}

/// Archive member name with `/` separators regardless of host.
pub(crate) fn member_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
