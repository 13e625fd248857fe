//! Background icon resolution for presentation slots.
//!
//! A slot may be rebound to another entry while its icon is still loading
//! (scrolling recycles slots). Delivery therefore re-checks the binding on
//! the presentation thread and drops icons meant for a previous entry.

use crate::entry::{AppEntry, Icon};
use crate::platform::IconLoader;
use keikai_pool::{Task, WorkerControl, WorkerPool};
use log::debug;
use std::sync::Arc;

/// A visual element that shows one entry at a time.
pub trait PresentationSlot: Send + Sync {
    /// The entry the slot currently shows.
    fn bound_entry(&self) -> Option<Arc<AppEntry>>;

    fn set_image(&self, icon: Icon);
}

/// Runs callbacks on the presentation thread.
pub trait Presenter: Send + Sync {
    fn post(&self, callback: Box<dyn FnOnce() + Send>);
}

/// Loads one entry's icon and hands it to a slot.
pub struct IconResolutionTask {
    slot: Arc<dyn PresentationSlot>,
    entry: Arc<AppEntry>,
    loader: Arc<dyn IconLoader>,
    presenter: Arc<dyn Presenter>,
    size_px: u32,
}

impl IconResolutionTask {
    pub fn new(
        slot: Arc<dyn PresentationSlot>,
        entry: Arc<AppEntry>,
        loader: Arc<dyn IconLoader>,
        presenter: Arc<dyn Presenter>,
        size_px: u32,
    ) -> Self {
        Self {
            slot,
            entry,
            loader,
            presenter,
            size_px,
        }
    }
}

impl Task for IconResolutionTask {
    /// Never re-queued. The worker keeps running afterwards.
    fn execute(self: Box<Self>) -> WorkerControl {
        let Self {
            slot,
            entry,
            loader,
            presenter,
            size_px,
        } = *self;

        if let Some(icon) = entry.resolve_icon(loader.as_ref(), size_px) {
            presenter.post(Box::new(move || deliver(slot.as_ref(), &entry, icon)));
        }

        WorkerControl::KeepRunning
    }
}

fn deliver(slot: &dyn PresentationSlot, entry: &Arc<AppEntry>, icon: Icon) {
    match slot.bound_entry() {
        Some(bound) if Arc::ptr_eq(&bound, entry) => slot.set_image(icon),
        _ => debug!("Slot rebound before icon for {} arrived", entry.identity()),
    }
}

/// Creates [`IconResolutionTask`]s with a shared loader, presenter and size.
#[derive(Clone)]
pub struct IconTaskFactory {
    loader: Arc<dyn IconLoader>,
    presenter: Arc<dyn Presenter>,
    size_px: u32,
}

impl IconTaskFactory {
    pub fn new(loader: Arc<dyn IconLoader>, presenter: Arc<dyn Presenter>, size_px: u32) -> Self {
        Self {
            loader,
            presenter,
            size_px,
        }
    }

    pub fn size_px(&self) -> u32 {
        self.size_px
    }

    pub fn create(
        &self,
        slot: Arc<dyn PresentationSlot>,
        entry: Arc<AppEntry>,
    ) -> IconResolutionTask {
        IconResolutionTask::new(
            slot,
            entry,
            Arc::clone(&self.loader),
            Arc::clone(&self.presenter),
            self.size_px,
        )
    }
}

/// Fills slots with icons, from cache or through the worker pool.
pub struct IconBinder {
    pool: Arc<WorkerPool>,
    factory: IconTaskFactory,
}

impl IconBinder {
    pub fn new(pool: Arc<WorkerPool>, factory: IconTaskFactory) -> Self {
        Self { pool, factory }
    }

    /// Show `entry`'s icon in `slot`, which must already be bound to `entry`.
    ///
    /// A cached icon is set immediately. Otherwise a resolution task is
    /// queued, blocking while the pool's queue is full.
    pub fn bind(&self, slot: Arc<dyn PresentationSlot>, entry: Arc<AppEntry>, icons_enabled: bool) {
        if !icons_enabled {
            return;
        }

        match entry.icon() {
            Some(icon) => slot.set_image(icon),
            None => self.pool.submit(Box::new(self.factory.create(slot, entry))),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{IconDescriptor, Identity};
    use crate::error::IconError;
    use crate::presentation::{IconSlot, PresentationQueue};
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_log::test;

    struct SquareLoader {
        size: u32,
        loads: AtomicUsize,
    }

    impl IconLoader for SquareLoader {
        fn load_icon(
            &self,
            identity: &Identity,
            descriptor: &IconDescriptor,
        ) -> Result<DynamicImage, IconError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            match descriptor {
                IconDescriptor::None => Err(IconError::MissingResource(identity.to_string())),
                _ => Ok(DynamicImage::new_rgba8(self.size, self.size)),
            }
        }
    }

    fn loader(size: u32) -> Arc<SquareLoader> {
        Arc::new(SquareLoader {
            size,
            loads: AtomicUsize::new(0),
        })
    }

    fn entry(name: &str, icon: IconDescriptor) -> Arc<AppEntry> {
        Arc::new(AppEntry::new(Identity::new(name, name), name, icon))
    }

    fn named(name: &str) -> Arc<AppEntry> {
        entry(name, IconDescriptor::Named(name.into()))
    }

    #[test]
    fn delivers_scaled_icon_to_bound_slot() {
        let queue = PresentationQueue::new();
        let slot = Arc::new(IconSlot::new());
        let app = named("app");
        slot.bind(Some(Arc::clone(&app)));

        let task = IconResolutionTask::new(slot.clone(), app, loader(256), queue.handle(), 48);
        assert_eq!(Box::new(task).execute(), WorkerControl::KeepRunning);
        assert!(slot.image().is_none());

        assert_eq!(queue.run_pending(), 1);
        let image = slot.image().unwrap();
        assert_eq!((image.width(), image.height()), (48, 48));
    }

    #[test]
    fn rebound_slot_never_receives_stale_icon() {
        let queue = PresentationQueue::new();
        let slot = Arc::new(IconSlot::new());
        let first = named("first");
        let second = named("second");
        slot.bind(Some(Arc::clone(&first)));

        let task =
            IconResolutionTask::new(slot.clone(), Arc::clone(&first), loader(16), queue.handle(), 48);
        Box::new(task).execute();
        slot.bind(Some(second));
        queue.run_pending();

        assert!(slot.image().is_none());
        assert_eq!(slot.images_set(), 0);
        // The entry itself still cached its icon.
        assert!(first.is_icon_loaded());
    }

    #[test]
    fn failed_resolution_delivers_nothing() {
        let queue = PresentationQueue::new();
        let slot = Arc::new(IconSlot::new());
        let app = entry("blank", IconDescriptor::None);
        slot.bind(Some(Arc::clone(&app)));

        let task = IconResolutionTask::new(slot.clone(), Arc::clone(&app), loader(16), queue.handle(), 48);
        assert_eq!(Box::new(task).execute(), WorkerControl::KeepRunning);

        assert_eq!(queue.run_pending(), 0);
        assert!(!app.is_icon_loaded());
    }

    #[test]
    fn binder_uses_cache_then_pool() {
        let queue = PresentationQueue::new();
        let loader = loader(16);
        let pool = Arc::new(WorkerPool::new(2, 4));
        let binder = IconBinder::new(
            Arc::clone(&pool),
            IconTaskFactory::new(loader.clone(), queue.handle(), 48),
        );

        let slots: Vec<_> = (0..10)
            .map(|i| {
                let slot = Arc::new(IconSlot::new());
                slot.bind(Some(named(&format!("app{i}"))));
                slot
            })
            .collect();

        for slot in &slots {
            let entry = slot.bound_entry().unwrap();
            binder.bind(slot.clone(), entry, true);
        }
        pool.shutdown(true, true);
        assert_eq!(queue.run_pending(), 10);
        assert!(slots.iter().all(|s| s.image().is_some()));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 10);

        // Already cached: set synchronously, no new load.
        let slot = &slots[0];
        slot.bind(slot.bound_entry());
        binder.bind(slot.clone(), slot.bound_entry().unwrap(), true);
        assert!(slot.image().is_some());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn binder_respects_disabled_icons() {
        let queue = PresentationQueue::new();
        let pool = Arc::new(WorkerPool::new(1, 0));
        let binder = IconBinder::new(
            Arc::clone(&pool),
            IconTaskFactory::new(loader(16), queue.handle(), 48),
        );
        let slot = Arc::new(IconSlot::new());
        let app = named("app");
        slot.bind(Some(Arc::clone(&app)));

        binder.bind(slot.clone(), app, false);
        pool.shutdown(true, true);

        assert_eq!(queue.run_pending(), 0);
        assert!(slot.image().is_none());
    }
}
