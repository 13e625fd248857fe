//! The ordered, filterable collection of launchables.
//!
//! The registry holds the full ("backing") sequence and, once a filter has
//! been applied, a separate rendered sequence. Every read or write of either
//! sequence happens under the registry lock. The metadata store is only
//! called with the lock released.

use crate::entry::{AppEntry, Identity, normalize_text};
use crate::metadata::MetadataStore;
use crate::order::{self, SortOrder, UsageOrder};
use crate::platform::UsageSnapshot;
use log::{debug, info};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::broadcast;

/// Broadcast channel capacity for change notifications.
/// Receivers only care about the latest state, so lagging is harmless.
pub const CHANNEL_CAPACITY: usize = 64;

type Sequence = Vec<Arc<AppEntry>>;

/// Events emitted when the rendered sequence changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    Changed,
    /// A filter left nothing to show.
    Invalidated,
}

enum Sequences {
    Unfiltered(Sequence),
    Filtered {
        original: Sequence,
        current: Sequence,
        query: String,
    },
}

impl Sequences {
    /// The full list, which mutations target.
    fn backing(&self) -> &Sequence {
        match self {
            Sequences::Unfiltered(seq) => seq,
            Sequences::Filtered { original, .. } => original,
        }
    }

    /// What the presentation shows.
    fn rendered(&self) -> &Sequence {
        match self {
            Sequences::Unfiltered(seq) => seq,
            Sequences::Filtered { current, .. } => current,
        }
    }
}

/// Opaque copy of a registry, for surviving a presentation teardown.
pub struct RegistryState {
    backing: Sequence,
    filtered: Option<(Sequence, String)>,
}

impl RegistryState {
    pub fn len(&self) -> usize {
        self.backing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backing.is_empty()
    }
}

/// Thread-safe ordered collection of [`AppEntry`].
pub struct Registry {
    store: Arc<dyn MetadataStore>,
    sequences: Mutex<Sequences>,
    notify_on_change: AtomicBool,
    event_tx: broadcast::Sender<RegistryEvent>,
}

impl Registry {
    /// Create an empty registry. Change notification starts disabled.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            store,
            sequences: Mutex::new(Sequences::Unfiltered(Vec::new())),
            notify_on_change: AtomicBool::new(false),
            event_tx: tx,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    pub fn set_notify_on_change(&self, notify: bool) {
        self.notify_on_change.store(notify, AtomicOrdering::SeqCst);
    }

    /// Announce a change now, and from here on after every mutation.
    pub fn notify_changed(&self) {
        debug!("Notifying about registry change");
        let _ = self.event_tx.send(RegistryEvent::Changed);
        self.notify_on_change.store(true, AtomicOrdering::SeqCst);
    }

    fn changed(&self) {
        if self.notify_on_change.load(AtomicOrdering::SeqCst) {
            self.notify_changed();
        }
    }

    /// Load persisted metadata, then append to the backing sequence.
    pub fn add(&self, entry: Arc<AppEntry>) {
        self.add_all(std::iter::once(entry));
    }

    pub fn add_all(&self, entries: impl IntoIterator<Item = Arc<AppEntry>>) {
        let entries: Vec<_> = entries.into_iter().collect();
        for entry in &entries {
            entry.apply_metadata(&self.store.get(&entry.identity().key()));
        }

        {
            let mut sequences = self.sequences.lock();
            match &mut *sequences {
                Sequences::Unfiltered(seq) => seq.extend(entries),
                Sequences::Filtered {
                    original,
                    current,
                    query,
                } => {
                    let query = normalize_text(query);
                    current.extend(
                        entries
                            .iter()
                            .filter(|e| e.normalized_label().contains(&query))
                            .cloned(),
                    );
                    original.extend(entries);
                }
            }
        }
        self.changed();
    }

    /// Insert into the backing sequence at `index` (clamped to its length).
    pub fn insert(&self, entry: Arc<AppEntry>, index: usize) {
        entry.apply_metadata(&self.store.get(&entry.identity().key()));

        {
            let mut sequences = self.sequences.lock();
            match &mut *sequences {
                Sequences::Unfiltered(seq) => {
                    let index = index.min(seq.len());
                    seq.insert(index, entry);
                }
                Sequences::Filtered {
                    original,
                    current,
                    query,
                } => {
                    if entry.normalized_label().contains(&normalize_text(query)) {
                        current.push(Arc::clone(&entry));
                    }
                    let index = index.min(original.len());
                    original.insert(index, entry);
                }
            }
        }
        self.changed();
    }

    /// Remove `entry` (by identity of the allocation). Returns whether it was present.
    pub fn remove(&self, entry: &Arc<AppEntry>) -> bool {
        let removed = {
            let mut sequences = self.sequences.lock();
            match &mut *sequences {
                Sequences::Unfiltered(seq) => remove_ptr(seq, entry),
                Sequences::Filtered {
                    original, current, ..
                } => {
                    remove_ptr(current, entry);
                    remove_ptr(original, entry)
                }
            }
        };
        if removed {
            self.changed();
        }
        removed
    }

    /// Remove the entry shown at `index`. Returns false when out of range.
    pub fn remove_at(&self, index: usize) -> bool {
        let removed = {
            let mut sequences = self.sequences.lock();
            match &mut *sequences {
                Sequences::Unfiltered(seq) => {
                    if index < seq.len() {
                        seq.remove(index);
                        true
                    } else {
                        false
                    }
                }
                Sequences::Filtered {
                    original, current, ..
                } => {
                    if index < current.len() {
                        let entry = current.remove(index);
                        remove_ptr(original, &entry);
                        true
                    } else {
                        false
                    }
                }
            }
        };
        if removed {
            self.changed();
        }
        removed
    }

    /// Remove every entry whose class name starts with `name` or whose package
    /// is exactly `name`. Returns how many were removed.
    pub fn remove_all_matching(&self, name: &str) -> usize {
        let removed = {
            let mut sequences = self.sequences.lock();
            match &mut *sequences {
                Sequences::Unfiltered(seq) => retain_unmatched(seq, name),
                Sequences::Filtered {
                    original, current, ..
                } => {
                    retain_unmatched(current, name);
                    retain_unmatched(original, name)
                }
            }
        };

        if removed > 0 {
            debug!("Removed {} entries matching {}", removed, name);
            self.changed();
        }
        removed
    }

    /// Empty the backing sequence (and the rendered one when filtered).
    pub fn clear(&self) {
        {
            let mut sequences = self.sequences.lock();
            match &mut *sequences {
                Sequences::Unfiltered(seq) => seq.clear(),
                Sequences::Filtered {
                    original, current, ..
                } => {
                    original.clear();
                    current.clear();
                }
            }
        }
        self.changed();
    }

    /// Position in the backing sequence of the first entry whose class name
    /// begins with `name`. Bare class names (fewer than two dots) must match
    /// exactly.
    pub fn find_by_class_name_prefix(&self, name: &str) -> Option<usize> {
        let sequences = self.sequences.lock();
        sequences.backing().iter().position(|entry| {
            let class_name = entry.identity().class_name();
            if is_qualified(class_name) {
                class_name.starts_with(name)
            } else {
                class_name == name
            }
        })
    }

    /// Position in the backing sequence of the first entry of `package`.
    pub fn find_by_package_name(&self, package: &str) -> Option<usize> {
        let sequences = self.sequences.lock();
        sequences
            .backing()
            .iter()
            .position(|entry| entry.identity().package() == package)
    }

    /// Position in the backing sequence of the entry with exactly `identity`.
    pub fn find_by_identity(&self, identity: &Identity) -> Option<usize> {
        let sequences = self.sequences.lock();
        sequences
            .backing()
            .iter()
            .position(|entry| entry.identity() == identity)
    }

    /// Backing entries that [`remove_all_matching`](Self::remove_all_matching)
    /// would remove for `name`.
    pub fn matching(&self, name: &str) -> Vec<Arc<AppEntry>> {
        let sequences = self.sequences.lock();
        sequences
            .backing()
            .iter()
            .filter(|entry| matches_name(entry, name))
            .cloned()
            .collect()
    }

    /// Show only entries whose label contains `query`, ignoring case and
    /// accents. An empty query shows everything again.
    pub fn filter(&self, query: &str) {
        let event = {
            let mut sequences = self.sequences.lock();

            if query.is_empty() && matches!(*sequences, Sequences::Unfiltered(_)) {
                return;
            }

            let original = match std::mem::replace(
                &mut *sequences,
                Sequences::Unfiltered(Vec::new()),
            ) {
                Sequences::Unfiltered(seq) => seq,
                Sequences::Filtered { original, .. } => original,
            };

            let current: Sequence = if query.is_empty() {
                original.clone()
            } else {
                let needle = normalize_text(query);
                original
                    .iter()
                    .filter(|e| e.normalized_label().contains(&needle))
                    .cloned()
                    .collect()
            };

            let event = if current.is_empty() {
                RegistryEvent::Invalidated
            } else {
                RegistryEvent::Changed
            };

            *sequences = Sequences::Filtered {
                original,
                current,
                query: query.to_string(),
            };
            event
        };

        let _ = self.event_tx.send(event);
        if event == RegistryEvent::Changed {
            self.notify_on_change.store(true, AtomicOrdering::SeqCst);
        }
    }

    /// Stable sort of both sequences.
    pub fn sort<F>(&self, compare: F)
    where
        F: FnMut(&Arc<AppEntry>, &Arc<AppEntry>) -> Ordering,
    {
        sort_sequences(&mut self.sequences.lock(), compare);
        self.changed();
    }

    /// Alphabetical, then the base order, then pins on top. All passes run
    /// under one lock, so readers never see a partial ordering.
    ///
    /// For non-alphabetical orders the entries' usage figures are refreshed
    /// from `usage` first (`None` means the platform has no statistics).
    /// The refresh sets every entry's usage time, so without statistics the
    /// whole collection ranks by launch count.
    pub fn sort_by_policy(&self, sort_order: SortOrder, usage: Option<&UsageSnapshot>) {
        {
            let mut sequences = self.sequences.lock();
            if sort_order != SortOrder::Alphabetical {
                for entry in sequences.backing() {
                    refresh_usage(entry, usage);
                }
            }

            sort_sequences(&mut sequences, |a, b| order::alphabetical(a, b));
            match sort_order {
                SortOrder::Alphabetical => {}
                SortOrder::Recent => sort_sequences(&mut sequences, |a, b| order::recent(a, b)),
                SortOrder::Usage => {
                    let usage_order = UsageOrder::for_entries(sequences.backing());
                    sort_sequences(&mut sequences, |a, b| usage_order.compare(a, b));
                }
            }
            sort_sequences(&mut sequences, |a, b| order::pin_to_top(a, b));
        }

        debug!("Sorted registry by {}", sort_order);
        self.changed();
    }

    /// Drop every entry's icon (memory pressure). Icons reload lazily.
    pub fn clear_icon_caches(&self) {
        let sequences = self.sequences.lock();
        for entry in sequences.backing() {
            entry.clear_icon();
        }
        if let Sequences::Filtered { current, .. } = &*sequences {
            for entry in current {
                entry.clear_icon();
            }
        }
        info!("Cleared icon caches");
    }

    /// Copy both sequences (entries are shared, not cloned).
    pub fn export_state(&self) -> RegistryState {
        let sequences = self.sequences.lock();
        match &*sequences {
            Sequences::Unfiltered(seq) => RegistryState {
                backing: seq.clone(),
                filtered: None,
            },
            Sequences::Filtered {
                original,
                current,
                query,
            } => RegistryState {
                backing: original.clone(),
                filtered: Some((current.clone(), query.clone())),
            },
        }
    }

    /// Replace the contents with a previously exported state.
    pub fn restore_state(&self, state: RegistryState) {
        {
            let mut sequences = self.sequences.lock();
            *sequences = match state.filtered {
                None => Sequences::Unfiltered(state.backing),
                Some((current, query)) => Sequences::Filtered {
                    original: state.backing,
                    current,
                    query,
                },
            };
        }
        self.changed();
    }

    /// Number of rendered entries.
    pub fn len(&self) -> usize {
        self.sequences.lock().rendered().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rendered entry at `index`.
    pub fn get(&self, index: usize) -> Option<Arc<AppEntry>> {
        self.sequences.lock().rendered().get(index).cloned()
    }

    /// Copy of the rendered sequence.
    pub fn snapshot(&self) -> Vec<Arc<AppEntry>> {
        self.sequences.lock().rendered().clone()
    }

    /// Copy of the backing sequence.
    pub fn backing_snapshot(&self) -> Vec<Arc<AppEntry>> {
        self.sequences.lock().backing().clone()
    }

    pub fn is_filtered(&self) -> bool {
        matches!(*self.sequences.lock(), Sequences::Filtered { .. })
    }

    /// The last applied filter query, if any.
    pub fn query(&self) -> Option<String> {
        match &*self.sequences.lock() {
            Sequences::Unfiltered(_) => None,
            Sequences::Filtered { query, .. } => Some(query.clone()),
        }
    }
}

fn sort_sequences<F>(sequences: &mut Sequences, mut compare: F)
where
    F: FnMut(&Arc<AppEntry>, &Arc<AppEntry>) -> Ordering,
{
    match sequences {
        Sequences::Unfiltered(seq) => seq.sort_by(&mut compare),
        Sequences::Filtered {
            original, current, ..
        } => {
            current.sort_by(&mut compare);
            original.sort_by(&mut compare);
        }
    }
}

fn remove_ptr(seq: &mut Sequence, entry: &Arc<AppEntry>) -> bool {
    match seq.iter().position(|e| Arc::ptr_eq(e, entry)) {
        Some(index) => {
            seq.remove(index);
            true
        }
        None => false,
    }
}

fn matches_name(entry: &AppEntry, name: &str) -> bool {
    let identity = entry.identity();
    identity.class_name().starts_with(name) || identity.package() == name
}

fn retain_unmatched(seq: &mut Sequence, name: &str) -> usize {
    let before = seq.len();
    seq.retain(|entry| !matches_name(entry, name));
    before - seq.len()
}

/// At least two dots, e.g. "org.example.Main".
fn is_qualified(class_name: &str) -> bool {
    match (class_name.find('.'), class_name.rfind('.')) {
        (Some(first), Some(last)) => first != last,
        _ => false,
    }
}

fn refresh_usage(entry: &AppEntry, usage: Option<&UsageSnapshot>) {
    let usage = match usage {
        Some(map) if !map.is_empty() => map,
        _ => {
            entry.set_usage_time(None);
            return;
        }
    };

    match usage.get(entry.identity().package()) {
        Some(stats) => {
            if stats.last_time_used > entry.last_launch() {
                entry.set_launch_time(stats.last_time_used);
            }
            entry.set_usage_time(Some(stats.total_foreground_secs));
        }
        None => entry.set_usage_time(Some(0)),
    }
}
