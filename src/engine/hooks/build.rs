use crate::engine::build_state::{BuildState, Stage};
use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::hooks::{Hook, HookTrigger};
use crate::Engine;
use async_trait::async_trait;
use tracing::debug;

/// Assembly never starts without the binary the toolchain was asked for.
#[derive(Debug)]
pub struct VerifyBinary;

#[async_trait]
impl Hook for VerifyBinary {
    const PRIORITY: usize = 0;
    const TRIGGER: HookTrigger = HookTrigger::After;
    const STAGE: Stage = Stage::Build;

    async fn run(&self, state: &mut BuildState, _engine: &Engine) -> ReleaseResult<()> {
        let binary = match &state.binary {
            Some(binary) => binary,
            None => {
                return Err(ReleaseError::ToolchainFailure {
                    triple: state.target.triple.clone(),
                    reason: "build finished without an output path".to_string(),
                })
            }
        };

        match tokio::fs::metadata(binary).await {
            Ok(meta) if meta.is_file() => {
                debug!(path = %binary.display(), size = meta.len(), "binary present");
                Ok(())
            }
            _ => Err(ReleaseError::MissingInput {
                path: binary.clone(),
            }),
        }
    }
}
