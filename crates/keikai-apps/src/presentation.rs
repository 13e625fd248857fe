//! Presentation-thread plumbing for hosts without their own UI loop.

use crate::entry::{AppEntry, Icon};
use crate::icon_task::{PresentationSlot, Presenter};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use log::warn;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

type Callback = Box<dyn FnOnce() + Send>;

/// Callbacks posted from any thread, run by whoever owns the queue.
pub struct PresentationQueue {
    tx: Sender<Callback>,
    rx: Receiver<Callback>,
}

struct QueueHandle {
    tx: Sender<Callback>,
}

impl Presenter for QueueHandle {
    fn post(&self, callback: Callback) {
        if self.tx.send(callback).is_err() {
            warn!("Presentation queue closed, dropping callback");
        }
    }
}

impl Default for PresentationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A presenter that posts into this queue.
    pub fn handle(&self) -> Arc<dyn Presenter> {
        Arc::new(QueueHandle {
            tx: self.tx.clone(),
        })
    }

    /// Run everything posted so far on the calling thread.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        for callback in self.rx.try_iter() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Run callbacks as they arrive until `timeout` has elapsed.
    pub fn run_for(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        loop {
            match self.rx.recv_deadline(deadline) {
                Ok(callback) => {
                    callback();
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        ran
    }
}

#[derive(Default)]
struct SlotState {
    entry: Option<Arc<AppEntry>>,
    image: Option<Icon>,
}

/// Minimal slot: remembers its entry and the last image it was given.
#[derive(Default)]
pub struct IconSlot {
    state: Mutex<SlotState>,
    images_set: AtomicUsize,
}

impl IconSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `entry`; the previous image is cleared.
    pub fn bind(&self, entry: Option<Arc<AppEntry>>) {
        let mut state = self.state.lock();
        state.entry = entry;
        state.image = None;
    }

    pub fn image(&self) -> Option<Icon> {
        self.state.lock().image.clone()
    }

    /// How many times an image was delivered.
    pub fn images_set(&self) -> usize {
        self.images_set.load(Ordering::SeqCst)
    }
}

impl PresentationSlot for IconSlot {
    fn bound_entry(&self) -> Option<Arc<AppEntry>> {
        self.state.lock().entry.clone()
    }

    fn set_image(&self, icon: Icon) {
        self.state.lock().image = Some(icon);
        self.images_set.fetch_add(1, Ordering::SeqCst);
    }
}
