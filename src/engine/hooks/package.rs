use crate::engine::build_state::{BuildState, Stage};
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::hooks::{Hook, HookTrigger};
use crate::Engine;
use async_trait::async_trait;

#[derive(Debug)]
pub struct FixPermissions;

#[async_trait]
impl Hook for FixPermissions {
    const PRIORITY: usize = 0;
    const TRIGGER: HookTrigger = HookTrigger::Before;
    const STAGE: Stage = Stage::Package;

    #[cfg(unix)]
    async fn run(&self, state: &mut BuildState, _engine: &Engine) -> ReleaseResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let executable = match state.artifact.as_ref().and_then(|a| a.executable()) {
            Some(path) => path,
            None => return Ok(()),
        };

        tokio::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(ReleaseError::io(&executable))
    }

    #[cfg(not(unix))]
    async fn run(&self, _state: &mut BuildState, _engine: &Engine) -> ReleaseResult<()> {
        Ok(())
    }
}

/// Gives every staged file the batch build time so archives are reproducible.
#[derive(Debug)]
pub struct PinTimestamps;

#[async_trait]
impl Hook for PinTimestamps {
    const PRIORITY: usize = 100;
    const TRIGGER: HookTrigger = HookTrigger::Before;
    const STAGE: Stage = Stage::Package;

    #[cfg(unix)]
    async fn run(&self, state: &mut BuildState, _engine: &Engine) -> ReleaseResult<()> {
        use crate::utils::FileWalker;
        use std::cmp::min;
        use std::ffi::CString;
        use std::os::unix::prelude::OsStrExt;
        use std::time::UNIX_EPOCH;

        let staging_dir = match &state.artifact {
            Some(artifact) => artifact.staging_dir.clone(),
            None => return Ok(()),
        };

        let duration = state
            .build_time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let tv = libc::timeval {
            tv_sec: min(duration.as_secs(), libc::time_t::MAX as u64) as libc::time_t,
            tv_usec: duration.subsec_micros() as libc::suseconds_t,
        };

        let mut files = FileWalker::with_directories(&staging_dir)
            .await
            .map_err(ReleaseError::io(&staging_dir))?;

        while let Some(file) = files.next().await.map_err(ReleaseError::io(&staging_dir))? {
            let p = file.path();
            let c_str = CString::new(p.as_os_str().as_bytes()).map_err(|e| {
                ReleaseError::io(&p)(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;

            let data = [tv, tv];

            unsafe {
                if libc::lutimes(c_str.as_ptr(), &data as _) != 0 {
                    return Err(ReleaseError::io(&p)(std::io::Error::last_os_error()));
                }
            }
        }

        Ok(())
    }

    #[cfg(not(unix))]
    async fn run(&self, _state: &mut BuildState, _engine: &Engine) -> ReleaseResult<()> {
        Ok(())
    }
}
