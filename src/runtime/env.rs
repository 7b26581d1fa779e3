use anyhow::{Context, Result};
use std::path::PathBuf;

#[tracing::instrument]
pub(super) fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Cannot determine the current directory")
}

#[cfg(test)]
mod tests {
    use crate::runtime::{RealRuntime, Runtime};

    #[test]
    fn test_env_and_platform_dirs() {
        let runtime = RealRuntime;

        assert!(runtime.env_var("PATH").is_ok());
        assert!(runtime.env_var("MODSMITH_SURELY_NOT_SET_ANYWHERE").is_err());
        assert!(runtime.current_dir().unwrap().is_absolute());

        // Containers may have no HOME, so only check what is reported.
        if let Some(cache) = runtime.cache_dir() {
            assert!(cache.is_absolute());
        }
    }
}
