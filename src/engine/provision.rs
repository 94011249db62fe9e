use crate::engine::environment::external;
use crate::engine::error::{ReleaseError, ReleaseResult};
use std::process::Stdio;
use tracing::{info, warn};

/// An external program plus the package that provides it on each host.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ToolSpec {
    pub command: &'static str,
    pub probe: &'static [&'static str],
    pub brew: &'static str,
    pub apt: &'static str,
    pub choco: &'static str,
}

pub const RSVG_CONVERT: ToolSpec = ToolSpec {
    command: "rsvg-convert",
    probe: &["--version"],
    brew: "librsvg",
    apt: "librsvg2-bin",
    choco: "rsvg-convert",
};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PackageManager {
    Brew,
    Apt,
    Chocolatey,
}

impl PackageManager {
    pub fn for_host() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(PackageManager::Brew)
        } else if cfg!(target_os = "linux") {
            Some(PackageManager::Apt)
        } else if cfg!(target_os = "windows") {
            Some(PackageManager::Chocolatey)
        } else {
            None
        }
    }

    pub fn install_command(&self, tool: &ToolSpec) -> (String, Vec<String>) {
        let (program, args): (&str, Vec<&str>) = match self {
            PackageManager::Brew => ("brew", vec!["install", tool.brew]),
            PackageManager::Apt => ("apt-get", vec!["install", "-y", tool.apt]),
            PackageManager::Chocolatey => ("choco", vec!["install", "-y", tool.choco]),
        };
        (program.to_string(), args.into_iter().map(String::from).collect())
    }
}

#[derive(Debug)]
pub struct Provisioner {
    manager: Option<PackageManager>,
    installer: Option<(String, Vec<String>)>,
}

impl Provisioner {
    pub fn new(manager: Option<PackageManager>) -> Self {
        Provisioner {
            manager,
            installer: None,
        }
    }

    /// Replaces the package-manager invocation with a fixed command line.
    pub fn with_installer(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.installer = Some((program.into(), args));
        self
    }

    fn install_command(&self, tool: &ToolSpec) -> Option<(String, Vec<String>)> {
        match &self.installer {
            Some(installer) => Some(installer.clone()),
            None => self.manager.map(|manager| manager.install_command(tool)),
        }
    }

    pub async fn probe(tool: &ToolSpec) -> bool {
        external(tool.command)
            .args(tool.probe)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Makes `tool` runnable, attempting a single package-manager install.
    pub async fn ensure(&self, tool: &ToolSpec) -> ReleaseResult<()> {
        if Self::probe(tool).await {
            return Ok(());
        }

        let (program, args) = self
            .install_command(tool)
            .ok_or_else(|| ReleaseError::ToolUnavailable {
                tool: tool.command.to_string(),
                remedy: "no supported package manager on this host".to_string(),
            })?;

        warn!(tool = tool.command, "not found, installing with {}", program);

        match external(&program).args(&args).status().await {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("{} exited with {}", program, status),
            Err(e) => warn!("could not run {}: {}", program, e),
        }

        if Self::probe(tool).await {
            info!(tool = tool.command, "installed");
            return Ok(());
        }

        Err(ReleaseError::ToolUnavailable {
            tool: tool.command.to_string(),
            remedy: format!("install it manually (`{} {}`)", program, args.join(" ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;

    const MISSING: ToolSpec = ToolSpec {
        command: "shipwright-definitely-not-installed",
        probe: &["--version"],
        brew: "x",
        apt: "x",
        choco: "x",
    };

    #[test]
    fn install_commands_name_the_host_package() {
        let (program, args) = PackageManager::Apt.install_command(&RSVG_CONVERT);
        assert_eq!(program, "apt-get");
        assert_eq!(args, ["install", "-y", "librsvg2-bin"]);

        let (program, args) = PackageManager::Brew.install_command(&RSVG_CONVERT);
        assert_eq!(program, "brew");
        assert_eq!(args, ["install", "librsvg"]);
    }

    #[tokio::test]
    async fn missing_tool_without_manager_is_unavailable() {
        let err = Provisioner::new(None).ensure(&MISSING).await.unwrap_err();
        assert_eq!(err.kind(), "tool-unavailable");
    }

    #[tokio::test]
    async fn single_install_attempt_then_unavailable() {
        let log = scratch_dir("provision-retry").join("attempts");
        let script = format!("echo attempt >> '{}'", log.display());

        let provisioner = Provisioner::new(Some(PackageManager::Apt))
            .with_installer("sh", vec!["-c".to_string(), script]);
        let err = provisioner.ensure(&MISSING).await.unwrap_err();

        assert_eq!(err.kind(), "tool-unavailable");
        assert!(err.to_string().contains("sh -c"));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "attempt\n");
    }
}
