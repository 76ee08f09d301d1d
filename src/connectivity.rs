use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tracing::info;

use crate::model::now_ms;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Online,
    Offline,
}

/// Tracks the platform's online/offline signal. `set_online` reports each
/// transition at most once; repeated reports of the same state are
/// swallowed. `is_online` always reflects the latest raw signal, so the
/// retry probe never acts on a stale state even when a transition
/// notification was debounced away.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    last_flip_ms: AtomicI64,
    debounce_ms: i64,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            last_flip_ms: AtomicI64::new(0),
            debounce_ms: 0,
        }
    }

    /// Debouncing suppresses transition *notifications* inside the
    /// window, not the state itself: a flap still updates `is_online`,
    /// it just doesn't trigger another sync pass.
    pub fn with_debounce(initially_online: bool, debounce_ms: i64) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            last_flip_ms: AtomicI64::new(0),
            debounce_ms,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Feed the platform signal in. The raw state is recorded
    /// unconditionally; the returned transition is only reported when the
    /// state actually changed and the change survived debouncing.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return None;
        }

        let now = now_ms();
        if self.debounce_ms > 0 {
            let last = self.last_flip_ms.load(Ordering::SeqCst);
            if now - last < self.debounce_ms {
                return None;
            }
        }

        self.last_flip_ms.store(now, Ordering::SeqCst);

        let transition = if online {
            Transition::Online
        } else {
            Transition::Offline
        };
        info!(?transition, "connectivity changed");
        Some(transition)
    }
}
