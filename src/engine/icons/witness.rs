use crate::engine::error::{ReleaseError, ReleaseResult};
use crate::engine::icons::IconAssetSet;
use hex::ToHex;
use ring::digest::{Context, SHA256};
use std::io::ErrorKind;

/// Content key of an icon build: the vector source plus the resolution set.
pub fn fingerprint(source: &[u8], resolutions: &[u32]) -> String {
    let mut digest = Context::new(&SHA256);
    digest.update(b"shipwright-icons\0");
    for size in resolutions {
        digest.update(&size.to_be_bytes());
    }
    digest.update(source);

    digest.finish().as_ref().encode_hex::<String>()
}

async fn exists(path: &std::path::Path) -> ReleaseResult<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ReleaseError::io(path)(e)),
    }
}

/// True when every container exists and the stored witness matches.
pub async fn is_fresh(set: &IconAssetSet, fingerprint: &str) -> ReleaseResult<bool> {
    for output in set.outputs() {
        if !exists(output).await? {
            return Ok(false);
        }
    }

    match tokio::fs::read_to_string(&set.witness).await {
        Ok(stored) => Ok(stored.trim() == fingerprint),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ReleaseError::io(&set.witness)(e)),
    }
}

pub async fn record(set: &IconAssetSet, fingerprint: &str) -> ReleaseResult<()> {
    tokio::fs::write(&set.witness, format!("{}\n", fingerprint))
        .await
        .map_err(ReleaseError::io(&set.witness))
}

/// Drops the witness so an interrupted regeneration is never taken as fresh.
pub async fn invalidate(set: &IconAssetSet) -> ReleaseResult<()> {
    match tokio::fs::remove_file(&set.witness).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ReleaseError::io(&set.witness)(e)),
    }
}
