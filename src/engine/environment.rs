use crate::engine::EngineSettings;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

#[derive(Debug)]
pub struct Environment {
    settings: Arc<EngineSettings>,
    pub cpus: usize,
}

impl Environment {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Environment {
            settings,
            cpus: num_cpus::get(),
        }
    }

    /// A command rooted at the project being released.
    pub fn command(&self, name: &str, args: &[&str]) -> Command {
        let mut cmd = external(name);
        cmd.current_dir(self.settings.project_root());
        cmd.args(args);
        cmd
    }
}

/// Every external tool runs in its own process group, so a terminal Ctrl-C
/// only reaches shipwright and an in-flight step is left to finish.
pub fn external(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}
