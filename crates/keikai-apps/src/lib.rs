//! keikai-apps: launchable registry and icon loading.
//!
//! Provides:
//! - `AppEntry` records with lazily resolved, shared icons
//! - a thread-safe, filterable `Registry` with pin/recent/usage ordering
//! - background icon resolution on a `keikai_pool::WorkerPool`
//! - persistent launch metadata
//! - a desktop platform built from .desktop files and XDG icon themes

mod catalog;
mod desktop_entry;
mod entry;
mod error;
mod icon_task;
mod icons;
mod metadata;
pub mod order;
mod paths;
mod platform;
mod presentation;
mod registry;

pub use catalog::DesktopPlatform;
pub use desktop_entry::{DesktopAction, DesktopApp, parse_desktop_file};
pub use entry::{AppEntry, Icon, IconDescriptor, IconState, Identity, normalize_text};
pub use error::{IconError, LaunchError, StoreError};
pub use icon_task::{IconBinder, IconResolutionTask, IconTaskFactory, PresentationSlot, Presenter};
pub use icons::IconTheme;
pub use metadata::{JsonMetadataStore, LaunchMetadata, MemoryMetadataStore, MetadataStore};
pub use order::{SortOrder, UsageOrder};
pub use paths::{get_application_directories, get_settings_path};
pub use platform::{
    Enumeration, IconLoader, IdentityResolver, LaunchInvoker, Launchable, Platform, StaticUsage,
    UsageSnapshot, UsageStats, UsageStatsProvider, detect_enumeration,
};
pub use presentation::{IconSlot, PresentationQueue};
pub use registry::{Registry, RegistryEvent, RegistryState};
