//! Provider freshness check.
//!
//! Before a session runs, the provider's local version is compared against
//! the version the backend reports. A mismatch triggers exactly one
//! automatic update attempt; nothing here is ever fatal to the session.

use async_trait::async_trait;
use semver::Version;

use devws_core::log::Logger;

/// Local and remote-reported provider versions.
#[derive(Debug, Clone)]
pub struct ProviderVersions {
    pub local: String,
    pub remote: String,
}

/// Collaborator reporting and updating provider versions.
#[async_trait]
pub trait ProviderUpdater: Send + Sync {
    /// Versions for the named provider. `None` when the backend does not
    /// report a version, which skips the check entirely.
    async fn current_versions(&self, provider: &str) -> anyhow::Result<Option<ProviderVersions>>;

    /// Update the provider to the remote-reported version. Must not be
    /// called when both versions are equal.
    async fn update(&self, provider: &str, remote_version: &str) -> anyhow::Result<()>;
}

/// Result of one freshness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessOutcome {
    /// Versions match, no write happened.
    UpToDate,
    /// Versions differed and the update succeeded.
    Updated,
    /// Versions differed and the single update attempt failed.
    UpdateFailed,
    /// No version information, or a version that does not parse.
    Skipped,
}

/// Compare provider versions and update on mismatch.
///
/// Equal versions perform zero writes. Differing valid versions perform
/// exactly one update attempt; its failure is logged and the session
/// continues.
pub async fn check_provider_freshness(
    updater: &dyn ProviderUpdater,
    provider: &str,
    logger: &dyn Logger,
) -> FreshnessOutcome {
    let versions = match updater.current_versions(provider).await {
        Ok(Some(versions)) => versions,
        Ok(None) => return FreshnessOutcome::Skipped,
        Err(err) => {
            logger.debug(&format!("skipping provider freshness check: {err}"));
            return FreshnessOutcome::Skipped;
        }
    };

    let (Ok(local), Ok(remote)) = (
        Version::parse(versions.local.trim_start_matches('v')),
        Version::parse(versions.remote.trim_start_matches('v')),
    ) else {
        logger.debug(&format!(
            "provider {provider} reports unparseable versions (local {}, remote {})",
            versions.local, versions.remote
        ));
        return FreshnessOutcome::Skipped;
    };

    if local == remote {
        return FreshnessOutcome::UpToDate;
    }

    logger.info(&format!(
        "Provider {provider} is out of date (local {local}, remote {remote}), updating..."
    ));
    match updater.update(provider, &versions.remote).await {
        Ok(()) => {
            logger.done(&format!("Updated provider {provider} to {remote}"));
            FreshnessOutcome::Updated
        }
        Err(err) => {
            logger.warn(&format!("couldn't update provider {provider}: {err}"));
            FreshnessOutcome::UpdateFailed
        }
    }
}
