//! Read-only precondition checks run before any pod is created.
//!
//! The uniqueness check here is advisory: another runtime may create the same
//! ID between this check and `create_pod`. Engines close that window by making
//! creation itself fail with [`Error::DuplicateContainer`].

use corral_core::{Error, Result, SandboxEngine};
use std::path::Path;

pub async fn container_exists(engine: &dyn SandboxEngine, container_id: &str) -> Result<bool> {
    let pods = engine.list_pods().await?;
    Ok(pods.iter().any(|pod| pod.id == container_id))
}

pub async fn validate_create(
    engine: &dyn SandboxEngine,
    container_id: &str,
    bundle: &Path,
) -> Result<()> {
    if container_id.is_empty() {
        return Err(Error::MissingArgument("container ID"));
    }
    if bundle.as_os_str().is_empty() {
        return Err(Error::MissingArgument("bundle path"));
    }

    if container_exists(engine, container_id).await? {
        return Err(Error::DuplicateContainer(container_id.to_string()));
    }

    let metadata = std::fs::metadata(bundle).map_err(|e| Error::InvalidBundle {
        path: bundle.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(Error::InvalidBundle {
            path: bundle.to_path_buf(),
            reason: "it should be a directory".to_string(),
        });
    }

    Ok(())
}

pub async fn validate_existing(engine: &dyn SandboxEngine, container_id: &str) -> Result<()> {
    if container_id.is_empty() {
        return Err(Error::MissingArgument("container ID"));
    }
    if !container_exists(engine, container_id).await? {
        return Err(Error::UnknownContainer(container_id.to_string()));
    }
    Ok(())
}
