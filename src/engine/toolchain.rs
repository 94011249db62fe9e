use crate::definition::target::Target;
use crate::engine::environment::Environment;
use crate::engine::error::{ReleaseError, ReleaseResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

const NATIVE_CPU: [&str; 2] = ["-C", "target-cpu=native"];

/// Rustflags already present in the invoking environment. Cargo takes the
/// first source that is set, so native tuning has to extend whichever wins.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct InheritedRustflags {
    pub encoded: Option<String>,
    pub plain: Option<String>,
}

impl InheritedRustflags {
    pub fn from_env() -> Self {
        InheritedRustflags {
            encoded: std::env::var("CARGO_ENCODED_RUSTFLAGS").ok(),
            plain: std::env::var("RUSTFLAGS").ok(),
        }
    }
}

/// Fixed release profile. LTO and stripping are never turned off.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BuildProfile {
    pub lto: bool,
    pub strip: bool,
    pub native_cpu: bool,
}

impl BuildProfile {
    pub fn for_target(target: &Target, host_triple: Option<&str>) -> Self {
        BuildProfile {
            lto: true,
            strip: true,
            native_cpu: host_triple == Some(target.triple.as_str()),
        }
    }

    pub fn env(&self, inherited: &InheritedRustflags) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("CARGO_PROFILE_RELEASE_LTO", self.lto.to_string()),
            (
                "CARGO_PROFILE_RELEASE_STRIP",
                if self.strip { "symbols" } else { "none" }.to_string(),
            ),
        ];

        if !self.native_cpu {
            return env;
        }

        if let Some(encoded) = &inherited.encoded {
            let mut flags: Vec<&str> = encoded.split('\x1f').filter(|f| !f.is_empty()).collect();
            flags.extend(NATIVE_CPU);
            env.push(("CARGO_ENCODED_RUSTFLAGS", flags.join("\x1f")));
        } else if let Some(plain) = &inherited.plain {
            let mut flags: Vec<&str> = plain.split_whitespace().collect();
            flags.extend(NATIVE_CPU);
            env.push(("RUSTFLAGS", flags.join(" ")));
        }

        env
    }

    /// With no rustflags in the environment, the flag goes through `--config`,
    /// which cargo concatenates with `build.rustflags` from the project.
    pub fn config_args(&self, inherited: &InheritedRustflags) -> Vec<String> {
        if !self.native_cpu || inherited.encoded.is_some() || inherited.plain.is_some() {
            return vec![];
        }

        vec![
            "--config".to_string(),
            format!("build.rustflags=[\"{}\", \"{}\"]", NATIVE_CPU[0], NATIVE_CPU[1]),
        ]
    }
}

#[async_trait]
pub trait Toolchain: Send + Sync + Debug {
    async fn host_triple(&self) -> ReleaseResult<String>;

    /// Root of the toolchain's build output, as reported by the toolchain itself.
    async fn target_directory(&self) -> ReleaseResult<PathBuf>;

    async fn build(&self, target: &Target, binary: &str, profile: BuildProfile)
        -> ReleaseResult<()>;
}

pub fn binary_path(target_directory: &Path, target: &Target, binary: &str) -> PathBuf {
    target_directory
        .join(&target.triple)
        .join("release")
        .join(format!("{}{}", binary, target.platform.executable_suffix()))
}

#[derive(Debug)]
pub struct Cargo {
    environment: Environment,
}

#[derive(Deserialize)]
struct CargoMetadata {
    target_directory: PathBuf,
}

impl Cargo {
    pub fn new(environment: Environment) -> Self {
        Cargo { environment }
    }

    pub fn build_args<'a>(&self, target: &'a Target, binary: &'a str, jobs: &'a str) -> Vec<&'a str> {
        vec![
            "build",
            "--release",
            "--target",
            target.triple.as_str(),
            "--bin",
            binary,
            "--jobs",
            jobs,
        ]
    }
}

fn parse_host_triple(version_output: &str) -> Option<String> {
    version_output
        .lines()
        .find_map(|line| line.strip_prefix("host: "))
        .map(|host| host.trim().to_string())
}

#[async_trait]
impl Toolchain for Cargo {
    async fn host_triple(&self) -> ReleaseResult<String> {
        let output = self
            .environment
            .command("rustc", &["-vV"])
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| ReleaseError::ToolchainFailure {
                triple: "host".to_string(),
                reason: format!("could not run rustc: {}", e),
            })?;

        parse_host_triple(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            ReleaseError::ToolchainFailure {
                triple: "host".to_string(),
                reason: "rustc -vV reported no host".to_string(),
            }
        })
    }

    async fn target_directory(&self) -> ReleaseResult<PathBuf> {
        let output = self
            .environment
            .command("cargo", &["metadata", "--format-version", "1", "--no-deps"])
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|e| ReleaseError::ToolchainFailure {
                triple: "metadata".to_string(),
                reason: format!("could not run cargo metadata: {}", e),
            })?;

        if !output.status.success() {
            return Err(ReleaseError::ToolchainFailure {
                triple: "metadata".to_string(),
                reason: format!("cargo metadata exited with {}", output.status),
            });
        }

        let metadata: CargoMetadata = serde_json::from_slice(&output.stdout).map_err(|e| {
            ReleaseError::ToolchainFailure {
                triple: "metadata".to_string(),
                reason: format!("unreadable cargo metadata: {}", e),
            }
        })?;

        Ok(metadata.target_directory)
    }

    async fn build(
        &self,
        target: &Target,
        binary: &str,
        profile: BuildProfile,
    ) -> ReleaseResult<()> {
        let jobs = self.environment.cpus.to_string();
        let inherited = InheritedRustflags::from_env();
        let config = profile.config_args(&inherited);

        let mut args = self.build_args(target, binary, &jobs);
        args.extend(config.iter().map(String::as_str));

        info!(target = %target.name, native_cpu = profile.native_cpu, "invoking cargo");
        debug!("cargo {}", args.join(" "));

        let mut cmd = self.environment.command("cargo", &args);
        cmd.envs(profile.env(&inherited));

        let status = cmd.status().await.map_err(|e| ReleaseError::ToolchainFailure {
            triple: target.triple.clone(),
            reason: format!("could not run cargo: {}", e),
        })?;

        if !status.success() {
            return Err(ReleaseError::ToolchainFailure {
                triple: target.triple.clone(),
                reason: format!("cargo exited with {}", status),
            });
        }

        Ok(())
    }
}
