//! Launchable application records.

use crate::icons::scale_to_fit;
use crate::metadata::LaunchMetadata;
use crate::platform::IconLoader;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// A decoded icon, shared between an entry and any slot showing it.
pub type Icon = Arc<image::DynamicImage>;

/// Stable key of one launch target: the package plus the component class.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    package: String,
    class_name: String,
}

impl Identity {
    pub fn new(package: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class_name: class_name.into(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Key used by the metadata store.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class_name)
    }
}

/// Where an entry's icon comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IconDescriptor {
    #[default]
    None,
    /// Theme icon name, e.g. "firefox".
    Named(String),
    /// Absolute path to an image file.
    Path(PathBuf),
}

/// Icon materialization state.
#[derive(Clone, Debug, Default)]
pub enum IconState {
    #[default]
    NotRequested,
    Loading,
    Resolved(Icon),
}

#[derive(Debug, Default)]
struct EntryState {
    icon: IconState,
    /// Bumped by `clear_icon` so a load started before the clear is not cached.
    icon_generation: u64,
    priority: u32,
    last_launch: i64,
    usage_count: u32,
    usage_time: Option<u64>,
}

/// One launchable target.
///
/// Identity, label and icon descriptor are fixed at construction and read
/// without locking. Everything else lives behind a single per-entry lock.
pub struct AppEntry {
    identity: Identity,
    label: String,
    normalized_label: String,
    icon_descriptor: IconDescriptor,
    state: Mutex<EntryState>,
    icon_ready: Condvar,
}

impl AppEntry {
    pub fn new(identity: Identity, label: impl Into<String>, icon: IconDescriptor) -> Self {
        let label = label.into();
        Self {
            normalized_label: normalize_text(&label),
            identity,
            label,
            icon_descriptor: icon,
            state: Mutex::new(EntryState::default()),
            icon_ready: Condvar::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Accent-stripped, lowercased label used for filtering.
    pub fn normalized_label(&self) -> &str {
        &self.normalized_label
    }

    pub fn icon_descriptor(&self) -> &IconDescriptor {
        &self.icon_descriptor
    }

    /// Record a launch: timestamp now, one more use.
    pub fn mark_launched(&self) {
        let mut state = self.state.lock();
        state.last_launch = chrono::Utc::now().timestamp();
        state.usage_count = state.usage_count.saturating_add(1);
    }

    pub fn priority(&self) -> u32 {
        self.state.lock().priority
    }

    pub fn set_priority(&self, priority: u32) {
        self.state.lock().priority = priority;
    }

    pub fn is_pinned(&self) -> bool {
        self.priority() > 0
    }

    pub fn last_launch(&self) -> i64 {
        self.state.lock().last_launch
    }

    pub fn set_launch_time(&self, timestamp: i64) {
        self.state.lock().last_launch = timestamp;
    }

    pub fn usage_count(&self) -> u32 {
        self.state.lock().usage_count
    }

    /// Aggregate foreground time, `None` when the platform cannot tell.
    pub fn usage_time(&self) -> Option<u64> {
        self.state.lock().usage_time
    }

    pub fn set_usage_time(&self, usage_time: Option<u64>) {
        self.state.lock().usage_time = usage_time;
    }

    /// Snapshot of the persisted fields.
    pub fn metadata(&self) -> LaunchMetadata {
        let state = self.state.lock();
        LaunchMetadata {
            last_launch: state.last_launch,
            usage_count: state.usage_count,
            priority: state.priority,
        }
    }

    pub fn apply_metadata(&self, metadata: &LaunchMetadata) {
        let mut state = self.state.lock();
        state.last_launch = metadata.last_launch;
        state.usage_count = metadata.usage_count;
        state.priority = metadata.priority;
    }

    pub fn is_icon_loaded(&self) -> bool {
        matches!(self.state.lock().icon, IconState::Resolved(_))
    }

    pub fn icon_state(&self) -> IconState {
        self.state.lock().icon.clone()
    }

    /// The cached icon, without triggering a load.
    pub fn icon(&self) -> Option<Icon> {
        match &self.state.lock().icon {
            IconState::Resolved(icon) => Some(Arc::clone(icon)),
            _ => None,
        }
    }

    /// Drop the entry's reference to its icon. Copies already handed to
    /// slots stay valid.
    pub fn clear_icon(&self) {
        let mut state = self.state.lock();
        state.icon = IconState::NotRequested;
        state.icon_generation = state.icon_generation.wrapping_add(1);
        self.icon_ready.notify_all();
    }

    /// Return the cached icon, or load and scale it synchronously.
    ///
    /// Concurrent callers wait for an in-flight load instead of decoding the
    /// same icon twice. Failures are logged and leave the icon unrequested.
    pub fn resolve_icon(&self, loader: &dyn IconLoader, max_size_px: u32) -> Option<Icon> {
        let generation = {
            let mut state = self.state.lock();
            loop {
                if let IconState::Resolved(icon) = &state.icon {
                    return Some(Arc::clone(icon));
                }
                if matches!(state.icon, IconState::Loading) {
                    self.icon_ready.wait(&mut state);
                } else {
                    break;
                }
            }
            state.icon = IconState::Loading;
            state.icon_generation
        };

        let mut guard = LoadingGuard {
            entry: self,
            generation,
            armed: true,
        };

        let result = loader
            .load_icon(&self.identity, &self.icon_descriptor)
            .map(|image| Arc::new(scale_to_fit(image, max_size_px)));

        guard.armed = false;
        let mut state = self.state.lock();
        let current = state.icon_generation == generation;

        let icon = match result {
            Ok(icon) => {
                if current {
                    state.icon = IconState::Resolved(Arc::clone(&icon));
                } else {
                    debug!("Icon for {} cleared while loading", self.identity);
                }
                Some(icon)
            }
            Err(e) => {
                warn!("Failed to load icon for {}: {}", self.identity, e);
                if current {
                    state.icon = IconState::NotRequested;
                }
                None
            }
        };

        self.icon_ready.notify_all();
        icon
    }
}

/// Puts a `Loading` icon back to `NotRequested` if the loader unwinds, so
/// waiters are not stuck forever.
struct LoadingGuard<'a> {
    entry: &'a AppEntry,
    generation: u64,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.entry.state.lock();
        if state.icon_generation == self.generation {
            state.icon = IconState::NotRequested;
        }
        self.entry.icon_ready.notify_all();
    }
}

impl fmt::Debug for AppEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppEntry")
            .field("identity", &self.identity)
            .field("label", &self.label)
            .field("metadata", &self.metadata())
            .finish()
    }
}

impl fmt::Display for AppEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Decompose, drop combining marks, lowercase.
pub fn normalize_text(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}
