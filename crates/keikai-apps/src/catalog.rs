//! Desktop implementation of the platform traits.
//!
//! Launch targets come from .desktop files, icons from the XDG icon themes.

use crate::desktop_entry::{DesktopApp, parse_desktop_file, split_exec, strip_field_codes};
use crate::entry::{IconDescriptor, Identity};
use crate::error::{IconError, LaunchError};
use crate::icons::{IconTheme, decode_icon};
use crate::paths::{get_application_directories, get_icon_cache_path};
use crate::platform::{
    Enumeration, IconLoader, IdentityResolver, LaunchInvoker, Launchable, UsageSnapshot,
    UsageStatsProvider,
};
use image::DynamicImage;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

type IconCache = HashMap<String, Option<PathBuf>>;

/// Launch targets and icons of the running desktop session.
pub struct DesktopPlatform {
    mode: Enumeration,
    /// Highest precedence first.
    app_dirs: Vec<PathBuf>,
    /// Desktop applications indexed by id (file stem).
    apps: RwLock<BTreeMap<String, DesktopApp>>,
    icon_theme: IconTheme,
    /// Icon name (lowercase) -> resolved path, misses included.
    icon_cache: RwLock<IconCache>,
    cache_path: PathBuf,
}

impl DesktopPlatform {
    /// Platform over the standard directories for `mode`. Nothing is scanned
    /// until [`refresh`](Self::refresh).
    pub fn new(mode: Enumeration) -> Self {
        Self::with_directories(mode, get_application_directories(mode), get_icon_cache_path())
    }

    pub fn with_directories(mode: Enumeration, app_dirs: Vec<PathBuf>, cache_path: PathBuf) -> Self {
        Self {
            mode,
            app_dirs,
            apps: RwLock::new(BTreeMap::new()),
            icon_theme: IconTheme::new(mode),
            icon_cache: RwLock::new(HashMap::new()),
            cache_path,
        }
    }

    pub fn mode(&self) -> Enumeration {
        self.mode
    }

    pub fn application_directories(&self) -> &[PathBuf] {
        &self.app_dirs
    }

    /// Rescan desktop entries and icon themes.
    pub fn refresh(&self) {
        info!("Scanning desktop applications...");

        self.icon_theme.build_index();
        self.rescan_applications();

        if let Some(cache) = load_cache(&self.cache_path) {
            *self.icon_cache.write() = cache;
        }
        self.prepopulate_cache();

        info!(
            "Desktop scan complete: {} applications, {} icons",
            self.apps.read().len(),
            self.icon_theme.len()
        );
    }

    /// Rescan desktop entries only.
    pub fn rescan_applications(&self) {
        let mut apps = BTreeMap::new();

        for dir in self.app_dirs.iter().filter(|d| d.exists()) {
            let walker = walkdir::WalkDir::new(dir)
                .follow_links(true)
                .max_depth(3)
                .sort_by_file_name();

            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("desktop") {
                    continue;
                }
                let Some(app) = parse_desktop_file(path) else {
                    debug!("Skipping {}", path.display());
                    continue;
                };
                // Earlier directories shadow later ones, hidden or not.
                apps.entry(app.id.clone()).or_insert(app);
            }
        }

        *self.apps.write() = apps;
    }

    /// Re-read the desktop file of one package from the top level of the
    /// application directories. A package whose file is gone is forgotten.
    pub fn refresh_package(&self, package: &str) {
        let file_name = format!("{package}.desktop");
        let found = self
            .app_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.is_file())
            .and_then(|path| parse_desktop_file(&path));

        let mut apps = self.apps.write();
        match found {
            Some(app) => {
                apps.insert(package.to_string(), app);
            }
            None => {
                let gone = apps
                    .get(package)
                    .is_some_and(|app| !app.desktop_file_path.exists());
                if gone {
                    debug!("Forgetting {}", package);
                    apps.remove(package);
                }
            }
        }
    }

    pub fn get_app(&self, id: &str) -> Option<DesktopApp> {
        self.apps.read().get(id).cloned()
    }

    /// Resolve an icon name to a file, consulting the lookup cache first.
    pub fn resolve_icon_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }

        let key = name.to_lowercase();
        if let Some(cached) = self.icon_cache.read().get(&key) {
            return cached.clone();
        }

        let result = self.icon_theme.resolve(name);
        self.icon_cache.write().insert(key, result.clone());
        result
    }

    fn prepopulate_cache(&self) {
        let names: Vec<String> = self
            .apps
            .read()
            .values()
            .flat_map(|app| {
                app.icon_name
                    .iter()
                    .chain(app.actions.iter().filter_map(|a| a.icon_name.as_ref()))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        for name in &names {
            self.resolve_icon_path(name);
        }

        save_cache(&self.cache_path, &self.icon_cache.read());
    }

    fn exec_for(&self, identity: &Identity) -> Option<String> {
        let apps = self.apps.read();
        let app = apps.get(identity.package())?;

        if identity.class_name() == app.id {
            return Some(app.exec.clone());
        }

        let action = identity
            .class_name()
            .strip_prefix(app.id.as_str())?
            .strip_prefix('.')?;
        app.actions
            .iter()
            .find(|a| a.id == action)
            .map(|a| a.exec.clone())
    }
}

fn icon_descriptor(name: Option<&String>) -> IconDescriptor {
    match name {
        Some(name) if name.starts_with('/') => IconDescriptor::Path(PathBuf::from(name)),
        Some(name) => IconDescriptor::Named(name.clone()),
        None => IconDescriptor::None,
    }
}

fn launchables(app: &DesktopApp) -> Vec<Launchable> {
    let mut result = vec![Launchable {
        identity: Identity::new(&app.id, &app.id),
        label: app.name.clone(),
        icon: icon_descriptor(app.icon_name.as_ref()),
    }];

    result.extend(app.actions.iter().map(|action| Launchable {
        identity: Identity::new(&app.id, format!("{}.{}", app.id, action.id)),
        label: format!("{} ({})", app.name, action.name),
        icon: icon_descriptor(action.icon_name.as_ref().or(app.icon_name.as_ref())),
    }));

    result
}

impl IdentityResolver for DesktopPlatform {
    fn enumerate(&self, package: Option<&str>) -> Vec<Launchable> {
        if let Some(package) = package {
            self.refresh_package(package);
        }

        let apps = self.apps.read();
        apps.values()
            .filter(|app| app.is_visible())
            .filter(|app| package.is_none_or(|p| p == app.id))
            .flat_map(launchables)
            .collect()
    }
}

impl IconLoader for DesktopPlatform {
    fn load_icon(
        &self,
        identity: &Identity,
        descriptor: &IconDescriptor,
    ) -> Result<DynamicImage, IconError> {
        match descriptor {
            IconDescriptor::None => Err(IconError::MissingResource(identity.to_string())),
            IconDescriptor::Path(path) => decode_icon(path),
            IconDescriptor::Named(name) => {
                let path = self
                    .resolve_icon_path(name)
                    .ok_or_else(|| IconError::MissingResource(name.clone()))?;
                decode_icon(&path)
            }
        }
    }
}

impl UsageStatsProvider for DesktopPlatform {
    /// Desktop sessions keep no usage statistics.
    fn usage_stats(&self) -> Option<UsageSnapshot> {
        None
    }
}

impl LaunchInvoker for DesktopPlatform {
    fn launch(&self, identity: &Identity) -> Result<(), LaunchError> {
        let exec = self
            .exec_for(identity)
            .ok_or_else(|| LaunchError::NotFound(identity.to_string()))?;

        let args = split_exec(&strip_field_codes(&exec));
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| LaunchError::NotFound(identity.to_string()))?;

        info!("Launching {} ({})", identity, program);
        Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => LaunchError::NotFound(program.clone()),
                _ => LaunchError::Io(e),
            })?;

        Ok(())
    }
}

fn load_cache(path: &Path) -> Option<IconCache> {
    let file = fs::File::open(path).ok()?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| warn!("Ignoring corrupt icon cache {}: {}", path.display(), e))
        .ok()
}

fn save_cache(path: &Path, cache: &IconCache) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok();
    }
    match fs::File::create(path) {
        Ok(file) => {
            if let Err(e) = serde_json::to_writer(file, cache) {
                warn!("Failed to write icon cache: {}", e);
            }
        }
        Err(e) => warn!("Failed to create icon cache {}: {}", path.display(), e),
    }
}
