use crate::definition::target::{PackagingStrategy, Target};
use crate::definition::trigger::Trigger;
use crate::definition::Release;
use crate::engine::assembler::Assembler;
use crate::engine::build_state::{BuildState, Stage};
use crate::engine::environment::Environment;
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::hooks::{HookTrigger, SORTED_HOOKS};
use crate::engine::icons::rasterizer::{RsvgRenderer, VectorRenderer};
use crate::engine::icons::{IconAssetSet, IconOutcome, IconPipeline};
use crate::engine::packager::packager_for;
use crate::engine::provision::{PackageManager, Provisioner};
use crate::engine::report::{BatchReport, TargetOutcome};
use crate::engine::resource::ResourceOutcome;
use crate::engine::toolchain::{binary_path, BuildProfile, Cargo, Toolchain};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

pub mod assembler;
mod build_state;
mod environment;
pub mod error;
mod hooks;
pub mod icons;
pub mod packager;
mod provision;
pub mod report;
pub mod resource;
pub mod toolchain;

/// Every location the pipeline reads or writes. Nothing below the engine
/// looks at the process environment for paths.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    project_root: PathBuf,
    assets_root: PathBuf,
    staging_root: PathBuf,
    output_root: PathBuf,
}

impl EngineSettings {
    pub fn new(project_root: &Path) -> Self {
        EngineSettings {
            project_root: project_root.to_path_buf(),
            assets_root: project_root.join("assets"),
            staging_root: project_root.join("target").join("shipwright").join("stage"),
            output_root: project_root.join("target").join("shipwright").join("dist"),
        }
    }

    pub fn with_assets_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.assets_root = path.into();
        self
    }

    pub fn with_staging_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_root = path.into();
        self
    }

    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    pub fn project_root(&self) -> &Path {
        self.project_root.as_path()
    }

    pub fn assets_root(&self) -> &Path {
        self.assets_root.as_path()
    }

    pub fn staging_root(&self) -> &Path {
        self.staging_root.as_path()
    }

    pub fn output_root(&self) -> &Path {
        self.output_root.as_path()
    }

    pub fn staging_path_for_target(&self, target: &Target) -> PathBuf {
        self.staging_root.join(&target.name)
    }

    pub fn archive_path(&self, release: &Release, target: &Target) -> PathBuf {
        self.output_root.join(target.archive_name(&release.name))
    }
}

/// Set from the Ctrl-C handler, checked before each target starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Engine {
    icons: IconPipeline,
    assembler: Assembler,
    toolchain: Box<dyn Toolchain>,
    pub settings: Arc<EngineSettings>,
    cancel: CancellationFlag,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        let settings = Arc::new(settings);
        let provisioner = Provisioner::new(PackageManager::for_host());

        Engine {
            icons: IconPipeline::new(Box::new(RsvgRenderer::new(provisioner))),
            assembler: Assembler::new(settings.clone()),
            toolchain: Box::new(Cargo::new(Environment::new(settings.clone()))),
            settings,
            cancel: CancellationFlag::default(),
        }
    }

    pub fn from_parts(
        settings: EngineSettings,
        toolchain: Box<dyn Toolchain>,
        renderer: Box<dyn VectorRenderer>,
    ) -> Self {
        let settings = Arc::new(settings);

        Engine {
            icons: IconPipeline::new(renderer),
            assembler: Assembler::new(settings.clone()),
            toolchain,
            settings,
            cancel: CancellationFlag::default(),
        }
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub async fn prepare_engine(&self) -> ReleaseResult<()> {
        for dir in [self.settings.staging_root(), self.settings.output_root()] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(ReleaseError::io(dir))?;
        }

        Ok(())
    }

    pub async fn run_hooks<'a>(
        &self,
        state: &mut BuildState<'a>,
        stage: Stage,
        trigger: HookTrigger,
    ) -> ReleaseResult<()> {
        for hook in SORTED_HOOKS.iter().copied() {
            if hook.when() == (stage, trigger) {
                debug!(target = %state.target.name, "running hook: {:?}", hook);
                hook.trigger(state, self).await?;
            }
        }
        Ok(())
    }

    /// The barrier phase: icon containers and the Windows resource descriptor.
    /// Nothing per-target starts until this returns.
    pub async fn prepare_icons(&self, release: &Release) -> ReleaseResult<IconAssetSet> {
        let set = IconAssetSet::new(self.settings.assets_root(), &release.icon);

        match self.icons.prepare(&set, &release.options).await? {
            IconOutcome::Fresh => info!("icon barrier: reused existing containers"),
            IconOutcome::Generated => info!("icon barrier: containers regenerated"),
        }

        match resource::ensure_descriptor(&set).await? {
            ResourceOutcome::Created => info!("resource descriptor written"),
            ResourceOutcome::Preserved => debug!("resource descriptor left untouched"),
        }

        Ok(set)
    }

    /// Runs the barrier then every selected target. An `Err` means the batch
    /// never reached the per-target phase; target failures are in the report.
    pub async fn run_batch(
        &self,
        release: &Release,
        targets: &[Target],
        trigger: &Trigger,
    ) -> ReleaseResult<BatchReport> {
        let mut release = release.clone();
        if let Some(version) = trigger.version() {
            info!(tag = %version, "tag trigger overrides definition version");
            release.version = version.to_string();
        }

        self.prepare_engine().await?;
        self.check_manifest(&release, targets).await?;
        let icons = self.prepare_icons(&release).await?;

        let host = match self.toolchain.host_triple().await {
            Ok(host) => Some(host),
            Err(e) => {
                warn!("host triple unknown, native tuning disabled: {}", e);
                None
            }
        };

        let host = host.as_deref();
        let build_time = SystemTime::now();

        let outcomes = if release.options.parallel {
            info!(targets = targets.len(), "fanning out");
            join_all(
                targets
                    .iter()
                    .map(|target| self.run_target(&release, target, &icons, host, build_time)),
            )
            .await
        } else {
            let mut outcomes = Vec::with_capacity(targets.len());
            for target in targets {
                outcomes.push(
                    self.run_target(&release, target, &icons, host, build_time)
                        .await,
                );
            }
            outcomes
        };

        Ok(BatchReport::new(outcomes, release.options.all_or_nothing))
    }

    async fn check_manifest(&self, release: &Release, targets: &[Target]) -> ReleaseResult<()> {
        if !targets
            .iter()
            .any(|t| t.strategy == PackagingStrategy::Bundle)
        {
            return Ok(());
        }

        let template = self.settings.assets_root().join(&release.manifest);
        if tokio::fs::metadata(&template).await.is_err() {
            return Err(ReleaseError::MissingInput { path: template });
        }

        Ok(())
    }

    async fn run_target(
        &self,
        release: &Release,
        target: &Target,
        icons: &IconAssetSet,
        host: Option<&str>,
        build_time: SystemTime,
    ) -> TargetOutcome {
        if self.cancel.is_cancelled() {
            warn!(target = %target.name, "skipped after cancellation");
            return TargetOutcome::failed(
                target,
                ReleaseError::Cancelled {
                    target: target.name.clone(),
                },
            );
        }

        let mut state = BuildState {
            build_time,
            release,
            target,
            icons,
            stage: Stage::Build,
            binary: None,
            artifact: None,
        };

        match self.drive(&mut state, host).await {
            Ok(()) => match state.artifact {
                Some(artifact) => {
                    info!(target = %target.name, "packaged");
                    TargetOutcome::packaged(artifact)
                }
                None => TargetOutcome::failed(
                    target,
                    ReleaseError::MissingInput {
                        path: self.settings.staging_path_for_target(target),
                    },
                ),
            },
            Err(e) => {
                error!(target = %target.name, stage = ?state.stage, "{}", e);
                TargetOutcome::failed(target, e)
            }
        }
    }

    async fn drive<'a>(&self, state: &mut BuildState<'a>, host: Option<&str>) -> ReleaseResult<()> {
        for stage in Stage::stages() {
            debug!(target = %state.target.name, "running stage: {:?}", stage);
            state.stage = stage;

            self.run_hooks(state, stage, HookTrigger::Before).await?;

            match stage {
                Stage::Build => self.build(state, host).await?,
                Stage::Stage => self.stage(state).await?,
                Stage::Package => self.package(state).await?,
            }

            self.run_hooks(state, stage, HookTrigger::After).await?;
        }

        Ok(())
    }

    async fn build<'a>(&self, state: &mut BuildState<'a>, host: Option<&str>) -> ReleaseResult<()> {
        let binary = &state.release.binary;
        let profile = BuildProfile::for_target(state.target, host);

        self.toolchain.build(state.target, binary, profile).await?;

        let target_directory = self.toolchain.target_directory().await?;
        state.binary = Some(binary_path(&target_directory, state.target, binary));
        Ok(())
    }

    async fn stage<'a>(&self, state: &mut BuildState<'a>) -> ReleaseResult<()> {
        let binary = match &state.binary {
            Some(binary) => binary,
            None => {
                return Err(ReleaseError::MissingInput {
                    path: self.settings.staging_path_for_target(state.target),
                })
            }
        };

        let artifact = self
            .assembler
            .stage(state.release, state.target, binary, state.icons)
            .await?;

        debug!(
            target = %state.target.name,
            entries = artifact.entries.len(),
            "staged at {}",
            artifact.staging_dir.display()
        );
        state.artifact = Some(artifact);
        Ok(())
    }

    async fn package<'a>(&self, state: &mut BuildState<'a>) -> ReleaseResult<()> {
        let archive = self.settings.archive_path(state.release, state.target);

        let artifact = match state.artifact.as_mut() {
            Some(artifact) => artifact,
            None => {
                return Err(ReleaseError::MissingInput {
                    path: self.settings.staging_path_for_target(state.target),
                })
            }
        };

        packager_for(state.target.archive)
            .build_package(artifact, &archive)
            .await?;

        info!(target = %state.target.name, "wrote {}", archive.display());
        artifact.mark_packaged(archive);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::target::{builtin_targets, Platform};
    use crate::definition::trigger::Version;
    use crate::engine::assembler::ArtifactState;
    use crate::engine::report::Verdict;
    use crate::test_support::{scratch_dir, FakeRenderer, FakeToolchain};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const PLIST: &str = "<plist><string>{{binary}}</string><string>{{version}}</string></plist>";

    type Builds = Arc<Mutex<Vec<(String, BuildProfile)>>>;

    fn release() -> Release {
        Release {
            name: "pilot".to_string(),
            version: "1.4.0".to_string(),
            identifier: "com.pilot.app".to_string(),
            binary: "pilot".to_string(),
            icon: "icon.svg".to_string(),
            manifest: "Info.plist".to_string(),
            targets: builtin_targets("pilot"),
            ..Default::default()
        }
    }

    async fn fixture(name: &str, failing: &[&str]) -> (Engine, Builds, Arc<AtomicUsize>) {
        let root = scratch_dir(name);
        let settings = EngineSettings::new(&root);

        tokio::fs::create_dir_all(settings.assets_root()).await.unwrap();
        tokio::fs::write(settings.assets_root().join("icon.svg"), b"<svg/>")
            .await
            .unwrap();
        tokio::fs::write(settings.assets_root().join("Info.plist"), PLIST)
            .await
            .unwrap();

        let mut toolchain = FakeToolchain::new(root.join("target"));
        toolchain.failing = failing.iter().map(|s| s.to_string()).collect();
        let builds = toolchain.builds.clone();

        let renderer = FakeRenderer::default();
        let renders = renderer.renders.clone();

        let engine = Engine::from_parts(settings, Box::new(toolchain), Box::new(renderer));
        (engine, builds, renders)
    }

    fn state_of(report: &BatchReport, platform: Platform) -> ArtifactState {
        report
            .outcomes
            .iter()
            .find(|o| o.target.platform == platform)
            .unwrap()
            .state
    }

    #[tokio::test]
    async fn one_failing_toolchain_does_not_stop_siblings() {
        let (engine, _, _) = fixture("batch-isolation", &["aarch64-apple-darwin"]).await;
        let release = release();

        let report = engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!((report.packaged(), report.failed()), (2, 1));
        assert_ne!(report.exit_code(), 0);
        assert_eq!(report.verdict(), Verdict::PartialSuccess);
        assert_eq!(state_of(&report, Platform::MacOs), ArtifactState::Failed);

        let output = engine.settings.output_root();
        assert!(output.join("pilot-windows-x86_64.zip").is_file());
        assert!(output.join("pilot-linux-x86_64.tar.gz").is_file());
        assert!(!output.join("pilot-macos-aarch64.tar.gz").exists());

        let failed = report.outcomes.iter().find(|o| !o.is_packaged()).unwrap();
        assert_eq!(failed.error.as_ref().unwrap().kind(), "toolchain-failure");
    }

    #[tokio::test]
    async fn all_or_nothing_turns_partial_into_failure() {
        let (engine, _, _) = fixture("batch-strict", &["x86_64-pc-windows-msvc"]).await;
        let mut release = release();
        release.options.all_or_nothing = true;

        let report = engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(report.packaged(), 2);
        assert_eq!(report.verdict(), Verdict::Failure);
        assert_eq!(report.exit_code(), 1);
    }

    #[tokio::test]
    async fn parallel_fan_out_matches_sequential() {
        let (engine, builds, renders) = fixture("batch-parallel", &[]).await;
        let mut release = release();
        release.options.parallel = true;

        let report = engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(report.verdict(), Verdict::Success);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(builds.lock().unwrap().len(), 3);
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        for target in &release.targets {
            assert!(engine.settings.staging_path_for_target(target).is_dir());
        }
    }

    #[tokio::test]
    async fn native_tuning_only_for_host_triple() {
        let (engine, builds, _) = fixture("batch-native", &[]).await;
        let release = release();

        engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap();

        let builds = builds.lock().unwrap();
        for (triple, profile) in builds.iter() {
            assert!(profile.lto && profile.strip);
            assert_eq!(profile.native_cpu, triple == "x86_64-unknown-linux-gnu");
        }
    }

    #[tokio::test]
    async fn tag_version_reaches_bundle_manifest() {
        let (engine, _, _) = fixture("batch-tag", &[]).await;
        let release = release();
        let mac = release.select_targets("macos-aarch64").unwrap();
        let trigger = Trigger::Tag(Version::parse("2.0.0-rc.1").unwrap());

        let report = engine.run_batch(&release, &mac, &trigger).await.unwrap();
        assert_eq!(report.verdict(), Verdict::Success);

        let plist = engine
            .settings
            .staging_path_for_target(&mac[0])
            .join("pilot.app/Contents/Info.plist");
        let plist = std::fs::read_to_string(plist).unwrap();
        assert!(plist.contains("<string>2.0.0-rc.1</string>"));
    }

    #[tokio::test]
    async fn cancelled_batch_skips_every_target() {
        let (engine, builds, _) = fixture("batch-cancel", &[]).await;
        let release = release();

        engine.cancellation().cancel();
        let report = engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap();

        assert_eq!(report.failed(), 3);
        assert!(builds.lock().unwrap().is_empty());
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.error.as_ref().unwrap().kind() == "cancelled"));
    }

    #[tokio::test]
    async fn missing_icon_source_aborts_before_any_build() {
        let (engine, builds, _) = fixture("batch-noicon", &[]).await;
        tokio::fs::remove_file(engine.settings.assets_root().join("icon.svg"))
            .await
            .unwrap();
        let release = release();

        let err = engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "missing-input");
        assert!(builds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_manifest_aborts_bundle_batch() {
        let (engine, builds, _) = fixture("batch-noplist", &[]).await;
        tokio::fs::remove_file(engine.settings.assets_root().join("Info.plist"))
            .await
            .unwrap();
        let release = release();

        let err = engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "missing-input");
        assert!(builds.lock().unwrap().is_empty());

        let linux = release.select_targets("linux-x86_64").unwrap();
        let report = engine
            .run_batch(&release, &linux, &Trigger::Manual)
            .await
            .unwrap();
        assert_eq!(report.verdict(), Verdict::Success);
    }

    #[tokio::test]
    async fn staging_failure_is_recorded_with_its_path() {
        let (engine, _, _) = fixture("batch-stagingio", &[]).await;
        let release = release();
        let linux = release.find_target("linux-x86_64").unwrap().clone();

        let blocked = engine.settings.staging_path_for_target(&linux);
        std::fs::create_dir_all(engine.settings.staging_root()).unwrap();
        std::fs::write(&blocked, b"not a directory").unwrap();

        let report = engine
            .run_batch(&release, &release.targets, &Trigger::Manual)
            .await
            .unwrap();

        assert_eq!((report.packaged(), report.failed()), (2, 1));
        assert_eq!(state_of(&report, Platform::Linux), ArtifactState::Failed);
        assert!(!engine
            .settings
            .output_root()
            .join("pilot-linux-x86_64.tar.gz")
            .exists());

        let failed = report.outcomes.iter().find(|o| !o.is_packaged()).unwrap();
        match failed.error.as_ref().unwrap() {
            ReleaseError::StagingIo { path, .. } => assert_eq!(path, &blocked),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn rerun_reuses_icons_and_overwrites_archives() {
        let (engine, _, renders) = fixture("batch-rerun", &[]).await;
        let release = release();

        for _ in 0..2 {
            let report = engine
                .run_batch(&release, &release.targets, &Trigger::Manual)
                .await
                .unwrap();
            assert_eq!(report.verdict(), Verdict::Success);
        }

        assert_eq!(renders.load(Ordering::SeqCst), 1);
    }
}
