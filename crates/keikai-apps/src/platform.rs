//! Seams between the launcher core and the host system.
//!
//! Everything the core needs from the outside world (enumerating launch
//! targets, loading icons, usage statistics, launching) goes through these
//! traits, so tests and embedding hosts can substitute their own.

use crate::entry::{AppEntry, IconDescriptor, Identity};
use crate::error::{IconError, LaunchError};
use crate::paths::get_user_application_directories;
use image::DynamicImage;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregated usage of one package as reported by the platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Seconds since epoch.
    pub last_time_used: i64,
    pub total_foreground_secs: u64,
}

/// Usage statistics keyed by package name.
pub type UsageSnapshot = HashMap<String, UsageStats>;

/// A launch target discovered by an [`IdentityResolver`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Launchable {
    pub identity: Identity,
    pub label: String,
    pub icon: IconDescriptor,
}

impl Launchable {
    pub fn into_entry(self) -> AppEntry {
        AppEntry::new(self.identity, self.label, self.icon)
    }
}

/// Lists launch targets, optionally restricted to one package.
pub trait IdentityResolver: Send + Sync {
    fn enumerate(&self, package: Option<&str>) -> Vec<Launchable>;
}

/// Loads the full-size icon of a launch target.
pub trait IconLoader: Send + Sync {
    fn load_icon(
        &self,
        identity: &Identity,
        descriptor: &IconDescriptor,
    ) -> Result<DynamicImage, IconError>;
}

pub trait UsageStatsProvider: Send + Sync {
    /// `None` when statistics are unavailable on this platform.
    fn usage_stats(&self) -> Option<UsageSnapshot>;
}

pub trait LaunchInvoker: Send + Sync {
    fn launch(&self, identity: &Identity) -> Result<(), LaunchError>;
}

/// Everything the launcher needs from the host.
pub trait Platform: IdentityResolver + IconLoader + UsageStatsProvider + LaunchInvoker {}

impl<T> Platform for T where T: IdentityResolver + IconLoader + UsageStatsProvider + LaunchInvoker {}

/// A fixed usage map.
#[derive(Clone, Debug, Default)]
pub struct StaticUsage(pub Option<UsageSnapshot>);

impl UsageStatsProvider for StaticUsage {
    fn usage_stats(&self) -> Option<UsageSnapshot> {
        self.0.clone()
    }
}

/// Which directories enumeration covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enumeration {
    /// System directories only.
    Basic,
    /// User profile directories first, then system directories.
    #[default]
    ProfileAware,
}

/// Pick the enumeration mode once at startup.
pub fn detect_enumeration() -> Enumeration {
    let mode = if get_user_application_directories()
        .iter()
        .any(|dir| dir.is_dir())
    {
        Enumeration::ProfileAware
    } else {
        Enumeration::Basic
    };
    info!("Using {:?} application enumeration", mode);
    mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn detects_profile_dirs() {
        let _guard = ENV_LOCK.lock().unwrap();
        let data_home = tempfile::tempdir().unwrap();
        let original = std::env::var_os("XDG_DATA_HOME");

        unsafe { std::env::set_var("XDG_DATA_HOME", data_home.path()) };
        let without = detect_enumeration();
        std::fs::create_dir_all(data_home.path().join("applications")).unwrap();
        let with = detect_enumeration();

        match original {
            Some(value) => unsafe { std::env::set_var("XDG_DATA_HOME", value) },
            None => unsafe { std::env::remove_var("XDG_DATA_HOME") },
        }

        assert_eq!(with, Enumeration::ProfileAware);
        // The user flatpak export dir may exist on the host running the test.
        let flatpak_exists = dirs::home_dir()
            .map(|h| h.join(".local/share/flatpak/exports/share/applications").is_dir())
            .unwrap_or(false);
        if !flatpak_exists {
            assert_eq!(without, Enumeration::Basic);
        }
    }

    #[test]
    fn static_usage_reports_map() {
        let mut map = UsageSnapshot::new();
        map.insert("pkg".into(), UsageStats::default());

        assert_eq!(StaticUsage(Some(map)).usage_stats().unwrap().len(), 1);
        assert!(StaticUsage(None).usage_stats().is_none());
    }
}
