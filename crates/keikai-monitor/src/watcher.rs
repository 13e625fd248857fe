//! Application directory watcher.

use crate::reconciler::EventReconciler;
use crate::types::{PackageAction, RawEvent};
use log::{debug, error, info};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// Keeps the underlying watcher alive; dropping it stops watching.
pub struct PackageWatcher {
    _watcher: RecommendedWatcher,
    directories: Vec<PathBuf>,
}

impl PackageWatcher {
    /// Watch every existing directory in `dirs` (non-recursively) and feed
    /// desktop entry changes into `reconciler`.
    pub fn spawn(dirs: &[PathBuf], reconciler: EventReconciler) -> notify::Result<Self> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(raw) = translate_event(&event) {
                        reconciler.deliver(raw);
                    }
                }
                Err(e) => error!("watch error: {:?}", e),
            },
            Config::default(),
        )?;

        let mut directories = Vec::new();
        for dir in dirs {
            if !dir.is_dir() {
                debug!("Not watching missing directory {}", dir.display());
                continue;
            }
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            info!("watching {:?}", dir);
            directories.push(dir.clone());
        }

        Ok(Self {
            _watcher: watcher,
            directories,
        })
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }
}

fn desktop_stem(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("desktop") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(String::from)
}

/// Map a filesystem event to a package event. Events that touch no desktop
/// entry, and pure access events, yield `None`.
pub fn translate_event(event: &Event) -> Option<RawEvent> {
    let packages: Vec<String> = event.paths.iter().filter_map(|p| desktop_stem(p)).collect();
    if packages.is_empty() {
        return None;
    }

    let action = match event.kind {
        EventKind::Create(_) => PackageAction::PackageAdded,
        EventKind::Remove(_) => PackageAction::PackageRemoved,
        EventKind::Modify(_) => PackageAction::PackageChanged,
        EventKind::Access(_) => return None,
        other => PackageAction::Unknown(format!("{other:?}")),
    };

    Some(RawEvent::new(action, packages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PackageChangeConsumer;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind, RenameMode};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn maps_event_kinds() {
        let path = "/usr/share/applications/org.gnome.Maps.desktop";

        assert_eq!(
            translate_event(&event(EventKind::Create(CreateKind::File), path)),
            Some(RawEvent::single(PackageAction::PackageAdded, "org.gnome.Maps"))
        );
        assert_eq!(
            translate_event(&event(EventKind::Remove(RemoveKind::File), path))
                .map(|e| e.action),
            Some(PackageAction::PackageRemoved)
        );
        assert_eq!(
            translate_event(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                path
            ))
            .map(|e| e.action),
            Some(PackageAction::PackageChanged)
        );
        assert!(matches!(
            translate_event(&event(EventKind::Other, path)).map(|e| e.action),
            Some(PackageAction::Unknown(_))
        ));
        assert_eq!(
            translate_event(&event(EventKind::Access(AccessKind::Any), path)),
            None
        );
    }

    #[test]
    fn ignores_non_desktop_paths() {
        assert_eq!(
            translate_event(&event(
                EventKind::Create(CreateKind::File),
                "/usr/share/applications/mimeinfo.cache"
            )),
            None
        );
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<String>>);

    impl PackageChangeConsumer for Seen {
        fn on_appeared(&self, package: &str) {
            self.0.lock().push(package.to_string());
        }

        fn on_disappeared(&self, _: &str) {}
    }

    #[test]
    fn new_desktop_file_reaches_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let reconciler = EventReconciler::new();
        let seen = Arc::new(Seen::default());
        reconciler.attach(seen.clone());

        let watcher = PackageWatcher::spawn(
            &[dir.path().to_path_buf(), dir.path().join("missing")],
            reconciler,
        )
        .unwrap();
        assert_eq!(watcher.directories().len(), 1);

        std::fs::write(dir.path().join("fresh.desktop"), "[Desktop Entry]\n").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !seen.0.lock().iter().any(|p| p == "fresh") {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(seen.0.lock().iter().any(|p| p == "fresh"));
    }
}
