use crate::definition::target::Target;
use crate::definition::Release;
use crate::engine::assembler::BuildArtifact;
use crate::engine::icons::IconAssetSet;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(u8)]
pub enum Stage {
    Build,
    Stage,
    Package,
}

impl Stage {
    pub const fn stages() -> [Stage; 3] {
        [Stage::Build, Stage::Stage, Stage::Package]
    }
}

pub struct BuildState<'a> {
    pub build_time: SystemTime,
    pub release: &'a Release,
    pub target: &'a Target,
    pub icons: &'a IconAssetSet,
    pub stage: Stage,
    pub binary: Option<PathBuf>,
    pub artifact: Option<BuildArtifact>,
}
