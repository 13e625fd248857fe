//! keikai-monitor: package change events for the launcher.
//!
//! - `EventReconciler` buffers raw events until a consumer attaches, then
//!   replays them in arrival order
//! - `PackageWatcher` turns application directory changes into raw events

mod reconciler;
mod types;
mod watcher;

pub use reconciler::{EventReconciler, RECHECK_DELAY, ReconcilerState};
pub use types::{ChangeKind, PackageAction, PackageChangeConsumer, RawEvent};
pub use watcher::{PackageWatcher, translate_event};
