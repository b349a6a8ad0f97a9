use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The control that starts a read-aloud. Disabled while one is in flight so
/// overlapping requests are turned away; the guard re-enables it on drop,
/// which covers completion and every error path alike.
#[derive(Clone, Default)]
pub struct Trigger {
    busy: Arc<AtomicBool>,
}

impl Trigger {
    pub fn is_enabled(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    /// Disable the trigger, or return `None` if it already is.
    pub fn try_fire(&self) -> Option<TriggerGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| TriggerGuard {
                busy: self.busy.clone(),
            })
    }
}

pub struct TriggerGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}
