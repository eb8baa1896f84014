// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Per-pad buffer callback registrations.
//!
//! Each (element, pad) pair gets one [`PadSlot`] holding its subscribers
//! behind its own mutex. The slot map itself is only locked to find or
//! create a slot; buffer delivery runs on the streaming thread against the
//! slot it was installed for and never touches the map.
//!
//! The first subscription on a pad installs a tap through the
//! [`MediaRuntime`]. Removing the last subscriber leaves the tap in place;
//! delivering to an empty slot does nothing.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use tracing::{debug, trace};

use crate::{
    error::{RouteError, RuntimeError},
    runtime::{BufferView, MediaRuntime},
};

/// Callback receiving every buffer on a subscribed pad.
pub type BufferCallback = Arc<dyn Fn(&BufferView<'_>) + Send + Sync>;

/// Identifies one subscription for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Default)]
struct PadSlot {
    subscribers: Mutex<Vec<(CallbackId, BufferCallback)>>,
}

impl PadSlot {
    fn deliver(&self, buffer: &BufferView<'_>) {
        let snapshot: Vec<BufferCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in snapshot {
            callback(buffer);
        }
    }
}

type SlotKey = (String, String);

/// Buffer subscriptions of one run.
#[derive(Default)]
pub struct CallbackRegistry {
    slots: RwLock<HashMap<SlotKey, Arc<PadSlot>>>,
    next_id: AtomicU64,
    live: Arc<AtomicBool>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts or stops delivery. Buffers arriving while stopped are dropped.
    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Subscribes `callback` to the buffers on `element`'s pad `pad`.
    ///
    /// # Errors
    ///
    /// [`RouteError::Runtime`] if this is the first subscription on the pad
    /// and the tap cannot be installed (or no runtime is attached).
    pub fn subscribe(
        &self,
        runtime: Option<&dyn MediaRuntime>,
        element: &str,
        pad: &str,
        callback: BufferCallback,
    ) -> Result<CallbackId, RouteError> {
        let key = (element.to_string(), pad.to_string());
        let existing = self
            .slots
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&key)
            .cloned();
        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
                match slots.get(&key) {
                    Some(slot) => slot.clone(),
                    None => {
                        let slot = Arc::new(PadSlot::default());
                        let runtime = runtime.ok_or(RuntimeError::Unavailable)?;
                        let tap_slot = slot.clone();
                        let live = self.live.clone();
                        runtime.attach_pad_tap(
                            element,
                            pad,
                            Box::new(move |buffer| {
                                if live.load(Ordering::Acquire) {
                                    tap_slot.deliver(buffer);
                                }
                            }),
                        )?;
                        debug!(element, pad, "Buffer tap installed");
                        slots.insert(key, slot.clone());
                        slot
                    }
                }
            }
        };

        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        slot.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, callback));
        trace!(element, pad, id = id.0, "Buffer callback added");
        Ok(id)
    }

    /// Removes one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, element: &str, pad: &str, id: CallbackId) -> bool {
        let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
        let Some(slot) = slots.get(&(element.to_string(), pad.to_string())) else {
            return false;
        };
        let mut subscribers = slot.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        before != subscribers.len()
    }

    /// Number of subscribers on a pad.
    pub fn subscriber_count(&self, element: &str, pad: &str) -> usize {
        self.slots
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&(element.to_string(), pad.to_string()))
            .map(|slot| slot.subscribers.lock().unwrap_or_else(|p| p.into_inner()).len())
            .unwrap_or(0)
    }

    /// Stops delivery and drops every subscription. Installed taps stay and
    /// deliver to nobody.
    pub fn clear(&self) {
        self.set_live(false);
        let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
        for slot in slots.values() {
            slot.subscribers
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::runtime::{BusMessage, PadTap};

    #[derive(Default)]
    struct Taps {
        taps: Mutex<Vec<(String, String, PadTap)>>,
    }

    impl Taps {
        fn push(&self, element: &str, pad: &str, data: &[u8]) {
            for (e, p, tap) in self.taps.lock().unwrap().iter() {
                if e == element && p == pad {
                    tap(&BufferView::new(data));
                }
            }
        }
    }

    impl MediaRuntime for Taps {
        fn attach_pad_tap(
            &self,
            element: &str,
            pad: &str,
            tap: PadTap,
        ) -> Result<(), RuntimeError> {
            if element == "missing" {
                return Err(RuntimeError::ElementNotFound(element.to_string()));
            }
            self.taps
                .lock()
                .unwrap()
                .push((element.to_string(), pad.to_string(), tap));
            Ok(())
        }

        fn post_message(&self, _message: BusMessage) -> Result<(), RuntimeError> {
            Ok(())
        }
    }

    fn counting(counter: &Arc<AtomicUsize>) -> BufferCallback {
        let counter = counter.clone();
        Arc::new(move |buffer| {
            counter.fetch_add(buffer.data.len(), Ordering::SeqCst);
        })
    }

    #[test]
    fn one_tap_per_pad() {
        let runtime = Taps::default();
        let registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));

        registry
            .subscribe(Some(&runtime), "parser", "src", counting(&hits))
            .unwrap();
        registry
            .subscribe(Some(&runtime), "parser", "src", counting(&hits))
            .unwrap();
        registry
            .subscribe(Some(&runtime), "sink", "sink", counting(&hits))
            .unwrap();
        assert_eq!(runtime.taps.lock().unwrap().len(), 2);
        assert_eq!(registry.subscriber_count("parser", "src"), 2);
    }

    #[test]
    fn delivers_only_while_live() {
        let runtime = Taps::default();
        let registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry
            .subscribe(Some(&runtime), "parser", "src", counting(&hits))
            .unwrap();

        runtime.push("parser", "src", b"abc");
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        registry.set_live(true);
        runtime.push("parser", "src", b"abc");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn removal_keeps_the_tap() {
        let runtime = Taps::default();
        let registry = CallbackRegistry::new();
        registry.set_live(true);
        let hits = Arc::new(AtomicUsize::new(0));
        let id = registry
            .subscribe(Some(&runtime), "parser", "src", counting(&hits))
            .unwrap();

        assert!(registry.unsubscribe("parser", "src", id));
        assert!(!registry.unsubscribe("parser", "src", id));
        runtime.push("parser", "src", b"abc");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.taps.lock().unwrap().len(), 1);
    }

    #[test]
    fn subscriptions_change_while_another_pad_delivers() {
        let runtime = Taps::default();
        let registry = CallbackRegistry::new();
        registry.set_live(true);
        let delivered = Arc::new(AtomicUsize::new(0));
        let churned = Arc::new(AtomicUsize::new(0));
        registry
            .subscribe(Some(&runtime), "parser", "src", counting(&delivered))
            .unwrap();
        registry
            .subscribe(Some(&runtime), "sink", "sink", counting(&churned))
            .unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..1000 {
                    let id = registry
                        .subscribe(Some(&runtime), "sink", "sink", counting(&churned))
                        .unwrap();
                    assert!(registry.unsubscribe("sink", "sink", id));
                }
            });
            scope.spawn(|| {
                for _ in 0..1000 {
                    runtime.push("parser", "src", b"abc");
                }
            });
        });

        assert_eq!(delivered.load(Ordering::SeqCst), 3000);
        assert_eq!(churned.load(Ordering::SeqCst), 0);
        assert_eq!(registry.subscriber_count("sink", "sink"), 1);
        assert_eq!(registry.subscriber_count("parser", "src"), 1);
        assert_eq!(runtime.taps.lock().unwrap().len(), 2);
    }

    #[test]
    fn tap_failures_leave_no_slot() {
        let runtime = Taps::default();
        let registry = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let err = registry
            .subscribe(Some(&runtime), "missing", "src", counting(&hits))
            .unwrap_err();
        assert!(matches!(
            err,
            RouteError::Runtime(RuntimeError::ElementNotFound(_))
        ));
        assert_eq!(registry.subscriber_count("missing", "src"), 0);

        let err = registry
            .subscribe(None, "parser", "src", counting(&hits))
            .unwrap_err();
        assert!(matches!(err, RouteError::Runtime(RuntimeError::Unavailable)));
    }
}
