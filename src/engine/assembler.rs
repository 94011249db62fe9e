use crate::definition::target::{PackagingStrategy, Target};
use crate::definition::Release;
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::icons::IconAssetSet;
use crate::engine::EngineSettings;
use handlebars::Handlebars;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArtifactState {
    Pending,
    Staged,
    Packaged,
    Failed,
}

impl ArtifactState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactState::Packaged | ArtifactState::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactState::Pending => "pending",
            ArtifactState::Staged => "staged",
            ArtifactState::Packaged => "packaged",
            ArtifactState::Failed => "failed",
        }
    }
}

/// One file copied into the staging tree; `destination` is relative to it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StagedEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub target: Target,
    pub staging_dir: PathBuf,
    pub entries: Vec<StagedEntry>,
    pub state: ArtifactState,
    pub archive: Option<PathBuf>,
}

impl BuildArtifact {
    /// The staged executable is always the first entry.
    pub fn executable(&self) -> Option<PathBuf> {
        self.entries
            .first()
            .map(|e| self.staging_dir.join(&e.destination))
    }

    pub fn mark_packaged(&mut self, archive: PathBuf) {
        debug_assert_eq!(self.state, ArtifactState::Staged);
        self.state = ArtifactState::Packaged;
        self.archive = Some(archive);
    }
}

#[derive(Debug)]
pub struct Assembler {
    settings: Arc<EngineSettings>,
}

impl Assembler {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Assembler { settings }
    }

    /// Pending → Staged. The staging directory is rebuilt from scratch.
    pub async fn stage(
        &self,
        release: &Release,
        target: &Target,
        binary: &Path,
        icons: &IconAssetSet,
    ) -> ReleaseResult<BuildArtifact> {
        if tokio::fs::metadata(binary).await.is_err() {
            return Err(ReleaseError::MissingInput {
                path: binary.to_path_buf(),
            });
        }

        let staging_dir = self.settings.staging_path_for_target(target);
        match tokio::fs::remove_dir_all(&staging_dir).await {
            Ok(()) => debug!(path = %staging_dir.display(), "cleared previous staging"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(ReleaseError::io(&staging_dir)(e)),
        }

        tokio::fs::create_dir_all(&staging_dir)
            .await
            .map_err(ReleaseError::io(&staging_dir))?;

        let mut artifact = BuildArtifact {
            target: target.clone(),
            staging_dir,
            entries: vec![],
            state: ArtifactState::Pending,
            archive: None,
        };

        match target.strategy {
            PackagingStrategy::Flat => {
                copy_into(&mut artifact, binary, PathBuf::from(target.output_file_name())).await?;
            }
            PackagingStrategy::Bundle => {
                self.stage_bundle(&mut artifact, release, binary, icons).await?;
            }
        }

        artifact.state = ArtifactState::Staged;
        Ok(artifact)
    }

    async fn stage_bundle(
        &self,
        artifact: &mut BuildArtifact,
        release: &Release,
        binary: &Path,
        icons: &IconAssetSet,
    ) -> ReleaseResult<()> {
        let contents = PathBuf::from(format!("{}.app", release.name)).join("Contents");

        let executable = contents
            .join("MacOS")
            .join(artifact.target.output_file_name());
        copy_into(artifact, binary, executable).await?;

        let template = self.settings.assets_root().join(&release.manifest);
        let manifest = render_manifest(&template, release, &artifact.target).await?;
        let manifest_dest = contents.join(manifest_file_name(&release.manifest));
        write_into(artifact, &template, manifest_dest, manifest.as_bytes()).await?;

        let resources = contents.join("Resources");
        if tokio::fs::metadata(&icons.icns).await.is_ok() {
            let icon_name = icons
                .icns
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("icon.icns"));
            copy_into(artifact, &icons.icns, resources.join(icon_name)).await?;
        } else {
            warn!(
                target = %artifact.target.name,
                "{} missing, bundle ships without a custom icon",
                icons.icns.display()
            );
            let dir = artifact.staging_dir.join(&resources);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(ReleaseError::io(&dir))?;
        }

        Ok(())
    }
}

fn manifest_file_name(manifest: &str) -> PathBuf {
    Path::new(manifest)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("Info.plist"))
}

async fn render_manifest(
    template: &Path,
    release: &Release,
    target: &Target,
) -> ReleaseResult<String> {
    let source = match tokio::fs::read_to_string(template).await {
        Ok(source) => source,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ReleaseError::MissingInput {
                path: template.to_path_buf(),
            })
        }
        Err(e) => return Err(ReleaseError::io(template)(e)),
    };

    let mut engine = Handlebars::new();
    engine.register_escape_fn(handlebars::no_escape);
    engine
        .render_template(&source, &release.template_vars(target))
        .map_err(|e| ReleaseError::ManifestTemplate {
            path: template.to_path_buf(),
            reason: e.to_string(),
        })
}

async fn ensure_parent(artifact: &BuildArtifact, destination: &Path) -> ReleaseResult<PathBuf> {
    let full = artifact.staging_dir.join(destination);
    if let Some(parent) = full.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ReleaseError::io(parent))?;
    }
    Ok(full)
}

async fn copy_into(
    artifact: &mut BuildArtifact,
    source: &Path,
    destination: PathBuf,
) -> ReleaseResult<()> {
    let full = ensure_parent(artifact, &destination).await?;
    tokio::fs::copy(source, &full)
        .await
        .map_err(ReleaseError::io(source))?;

    artifact.entries.push(StagedEntry {
        source: source.to_path_buf(),
        destination,
    });
    Ok(())
}

async fn write_into(
    artifact: &mut BuildArtifact,
    source: &Path,
    destination: PathBuf,
    data: &[u8],
) -> ReleaseResult<()> {
    let full = ensure_parent(artifact, &destination).await?;
    tokio::fs::write(&full, data)
        .await
        .map_err(ReleaseError::io(&full))?;

    artifact.entries.push(StagedEntry {
        source: source.to_path_buf(),
        destination,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::target::{builtin_targets, Platform};
    use crate::test_support::scratch_dir;

    const PLIST: &str = "<plist><key>CFBundleExecutable</key><string>{{binary}}</string>\
<key>CFBundleShortVersionString</key><string>{{version}}</string></plist>";

    fn release() -> Release {
        Release {
            name: "Pilot".to_string(),
            version: "2.0.1".to_string(),
            binary: "pilot".to_string(),
            icon: "icon.svg".to_string(),
            manifest: "Info.plist".to_string(),
            targets: builtin_targets("pilot"),
            ..Default::default()
        }
    }

    async fn fixture(name: &str) -> (Assembler, PathBuf, IconAssetSet, PathBuf) {
        let root = scratch_dir(name);
        let settings = Arc::new(EngineSettings::new(&root));
        tokio::fs::create_dir_all(settings.assets_root()).await.unwrap();
        tokio::fs::write(settings.assets_root().join("Info.plist"), PLIST)
            .await
            .unwrap();

        let binary = root.join("pilot-bin");
        tokio::fs::write(&binary, b"\x7fELF").await.unwrap();

        let icons = IconAssetSet::new(settings.assets_root(), "icon.svg");
        (Assembler::new(settings), root, icons, binary)
    }

    fn target(platform: Platform) -> Target {
        release()
            .targets
            .into_iter()
            .find(|t| t.platform == platform)
            .unwrap()
    }

    #[tokio::test]
    async fn bundle_layout_with_icon() {
        let (assembler, _root, icons, binary) = fixture("assemble-bundle").await;
        tokio::fs::write(&icons.icns, b"icns").await.unwrap();

        let artifact = assembler
            .stage(&release(), &target(Platform::MacOs), &binary, &icons)
            .await
            .unwrap();

        assert_eq!(artifact.state, ArtifactState::Staged);
        let contents = artifact.staging_dir.join("Pilot.app/Contents");
        assert!(contents.join("MacOS/pilot").is_file());
        assert!(contents.join("Resources/icon.icns").is_file());

        let plist = std::fs::read_to_string(contents.join("Info.plist")).unwrap();
        assert!(plist.contains("<string>pilot</string>"));
        assert!(plist.contains("<string>2.0.1</string>"));
        assert_eq!(artifact.executable(), Some(contents.join("MacOS/pilot")));
    }

    #[tokio::test]
    async fn bundle_without_icon_is_still_staged() {
        let (assembler, _root, icons, binary) = fixture("assemble-noicon").await;

        let artifact = assembler
            .stage(&release(), &target(Platform::MacOs), &binary, &icons)
            .await
            .unwrap();

        let contents = artifact.staging_dir.join("Pilot.app/Contents");
        assert!(contents.join("MacOS/pilot").is_file());
        assert!(contents.join("Info.plist").is_file());
        assert!(!contents.join("Resources/icon.icns").exists());
        assert_eq!(artifact.entries.len(), 2);
    }

    #[tokio::test]
    async fn flat_layout_renames_binary() {
        let (assembler, _root, icons, binary) = fixture("assemble-flat").await;

        let artifact = assembler
            .stage(&release(), &target(Platform::Windows), &binary, &icons)
            .await
            .unwrap();

        assert!(artifact.staging_dir.join("pilot.exe").is_file());
        assert_eq!(artifact.entries.len(), 1);
        assert_eq!(artifact.entries[0].source, binary);
    }

    #[tokio::test]
    async fn restaging_replaces_previous_tree() {
        let (assembler, _root, icons, binary) = fixture("assemble-rerun").await;
        let linux = target(Platform::Linux);

        let first = assembler.stage(&release(), &linux, &binary, &icons).await.unwrap();
        std::fs::write(first.staging_dir.join("stale.txt"), b"old").unwrap();

        let second = assembler.stage(&release(), &linux, &binary, &icons).await.unwrap();
        assert!(!second.staging_dir.join("stale.txt").exists());
        assert!(second.staging_dir.join("pilot").is_file());
    }

    #[tokio::test]
    async fn bundle_manifest_names_the_staged_executable() {
        let (assembler, _root, icons, binary) = fixture("assemble-renamed").await;
        let mut mac = target(Platform::MacOs);
        mac.output = "PilotApp".to_string();

        let artifact = assembler
            .stage(&release(), &mac, &binary, &icons)
            .await
            .unwrap();

        let contents = artifact.staging_dir.join("Pilot.app/Contents");
        assert!(contents.join("MacOS/PilotApp").is_file());
        assert!(!contents.join("MacOS/pilot").exists());

        let plist = std::fs::read_to_string(contents.join("Info.plist")).unwrap();
        assert!(plist.contains("<key>CFBundleExecutable</key><string>PilotApp</string>"));
    }

    #[tokio::test]
    async fn unwritable_staging_root_is_staging_io() {
        let root = scratch_dir("assemble-blocked");
        let blocker = root.join("stage");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let settings = Arc::new(EngineSettings::new(&root).with_staging_root(&blocker));
        let binary = root.join("pilot-bin");
        std::fs::write(&binary, b"\x7fELF").unwrap();
        let icons = IconAssetSet::new(settings.assets_root(), "icon.svg");
        let linux = target(Platform::Linux);

        let err = Assembler::new(settings.clone())
            .stage(&release(), &linux, &binary, &icons)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "staging-io");
        match err {
            ReleaseError::StagingIo { path, .. } => {
                assert_eq!(path, settings.staging_path_for_target(&linux))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_binary_fails() {
        let (assembler, root, icons, _binary) = fixture("assemble-nobinary").await;

        let err = assembler
            .stage(&release(), &target(Platform::Linux), &root.join("nope"), &icons)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "missing-input");
    }
}
