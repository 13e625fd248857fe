//! Glue between the platform, the registry and package change events.

use crate::config::LauncherSettings;
use keikai_apps::{
    AppEntry, IconBinder, IconLoader, IconSlot, IconTaskFactory, LaunchError, LaunchMetadata,
    MetadataStore, Platform, PresentationQueue, Registry, SortOrder, StoreError, normalize_text,
};
use keikai_monitor::PackageChangeConsumer;
use keikai_pool::{WorkerPool, optimal_worker_count};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct Launcher<P: Platform> {
    platform: Arc<P>,
    store: Arc<dyn MetadataStore>,
    registry: Arc<Registry>,
    settings: LauncherSettings,
}

impl<P: Platform + 'static> Launcher<P> {
    pub fn new(platform: Arc<P>, store: Arc<dyn MetadataStore>, settings: LauncherSettings) -> Self {
        Self {
            registry: Arc::new(Registry::new(Arc::clone(&store))),
            platform,
            store,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn settings(&self) -> &LauncherSettings {
        &self.settings
    }

    /// Replace the registry contents with everything the platform lists.
    pub fn load(&self) -> usize {
        let entries: Vec<_> = self
            .platform
            .enumerate(None)
            .into_iter()
            .map(|launchable| Arc::new(launchable.into_entry()))
            .collect();
        let count = entries.len();

        self.registry.set_notify_on_change(false);
        self.registry.clear();
        self.registry.add_all(entries);
        self.resort();
        self.registry.notify_changed();

        info!("Loaded {} launchables", count);
        count
    }

    /// Apply the configured order (and pins) again.
    pub fn resort(&self) {
        let usage = match self.settings.order {
            SortOrder::Alphabetical => None,
            _ => self.platform.usage_stats(),
        };
        self.registry.sort_by_policy(self.settings.order, usage.as_ref());
    }

    /// Best match for `query`: identity or class name, then exact label, then
    /// the highest ranked label containing it.
    pub fn find(&self, query: &str) -> Option<Arc<AppEntry>> {
        let entries = self.registry.backing_snapshot();
        let needle = normalize_text(query);

        entries
            .iter()
            .find(|e| e.identity().key() == query || e.identity().class_name() == query)
            .or_else(|| entries.iter().find(|e| e.normalized_label() == needle))
            .or_else(|| {
                entries
                    .iter()
                    .find(|e| e.normalized_label().contains(&needle))
            })
            .cloned()
    }

    /// Launch `entry` and record the use. A failed launch records nothing.
    pub fn launch(&self, entry: &Arc<AppEntry>) -> Result<(), LaunchError> {
        self.platform.launch(entry.identity())?;

        entry.mark_launched();
        if let Err(e) = self.persist(entry) {
            warn!("Failed to record launch of {}: {}", entry.identity(), e);
        }
        if self.settings.order != SortOrder::Alphabetical {
            self.resort();
        }
        Ok(())
    }

    /// Pin or unpin `entry`. Returns whether it is now pinned.
    pub fn toggle_pin(&self, entry: &Arc<AppEntry>) -> Result<bool, StoreError> {
        let pinned = !entry.is_pinned();
        entry.set_priority(u32::from(pinned));
        self.resort();
        self.persist(entry)?;
        Ok(pinned)
    }

    /// Drop all usage and pin data of `entry`.
    pub fn forget(&self, entry: &Arc<AppEntry>) -> Result<(), StoreError> {
        entry.apply_metadata(&LaunchMetadata::default());
        self.resort();
        self.store.delete(&entry.identity().key())
    }

    fn persist(&self, entry: &AppEntry) -> Result<(), StoreError> {
        self.store.put(&entry.identity().key(), entry.metadata())
    }

    /// Resolve icons for `entries` on a worker pool and return one filled
    /// slot per entry, in order.
    pub fn load_icons(&self, entries: &[Arc<AppEntry>]) -> Vec<Arc<IconSlot>> {
        let slots: Vec<Arc<IconSlot>> = entries
            .iter()
            .map(|entry| {
                let slot = Arc::new(IconSlot::new());
                slot.bind(Some(Arc::clone(entry)));
                slot
            })
            .collect();

        if !self.settings.icons_enabled || entries.is_empty() {
            return slots;
        }

        let queue = PresentationQueue::new();
        let pool = Arc::new(WorkerPool::new(
            optimal_worker_count(self.settings.max_icon_threads),
            self.settings.icon_queue_capacity,
        ));
        let loader: Arc<dyn IconLoader> = self.platform.clone();
        let binder = IconBinder::new(
            Arc::clone(&pool),
            IconTaskFactory::new(loader, queue.handle(), self.settings.icon_size_px),
        );

        for (slot, entry) in slots.iter().zip(entries) {
            binder.bind(slot.clone(), Arc::clone(entry), true);
        }
        pool.shutdown(true, true);

        let delivered = queue.run_pending();
        debug!("Delivered {} of {} icons", delivered, entries.len());
        slots
    }
}

impl<P: Platform + 'static> Launcher<P> {
    /// Add the launchables of `package` that the registry lacks.
    fn add_missing(&self, package: &str) -> usize {
        let mut added = 0;
        for launchable in self.platform.enumerate(Some(package)) {
            if self.registry.find_by_identity(&launchable.identity).is_some() {
                continue;
            }
            self.registry.add(Arc::new(launchable.into_entry()));
            added += 1;
        }
        added
    }
}

impl<P: Platform + 'static> PackageChangeConsumer for Launcher<P> {
    fn on_appeared(&self, package: &str) {
        let added = self.add_missing(package);
        if added > 0 {
            info!("{} appeared with {} launchables", package, added);
            self.resort();
        }
    }

    /// Removal matches by class prefix, so neighbouring packages can be hit.
    /// Whatever the platform still provides (a shadowed system entry, a
    /// package sharing the prefix) is added back from fresh data.
    fn on_disappeared(&self, package: &str) {
        let affected: BTreeSet<String> = self
            .registry
            .matching(package)
            .iter()
            .map(|entry| entry.identity().package().to_string())
            .collect();

        let removed = self.registry.remove_all_matching(package);
        let restored: usize = affected.iter().map(|p| self.add_missing(p)).sum();

        if removed > 0 {
            info!(
                "{} disappeared, removed {} launchables ({} still provided)",
                package, removed, restored
            );
        }
        if restored > 0 {
            self.resort();
        }
    }
}
