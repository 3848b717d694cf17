//! Observable projector state
//!
//! Holds the last values the projector confirmed. Fields change only when a
//! response is parsed, never when a command is submitted. Every change that
//! actually alters a value is published to the registered observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::{AspectRatio, PictureMode, SourceType};

/// A single confirmed field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum DeviceChange {
    /// Lamp on (`true`) or off
    PowerState(bool),
    /// Active aspect ratio
    AspectRatio(AspectRatio),
    /// Active input
    CurrentSource(SourceType),
    /// Active picture mode
    PictureMode(PictureMode),
    /// Lamp-hour counter
    LampHours(u32),
}

/// Field identifiers, for observers that only care about some fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum DeviceField {
    PowerState,
    AspectRatio,
    CurrentSource,
    PictureMode,
    LampHours,
}

impl DeviceChange {
    /// The field this change applies to
    pub fn field(&self) -> DeviceField {
        match self {
            DeviceChange::PowerState(_) => DeviceField::PowerState,
            DeviceChange::AspectRatio(_) => DeviceField::AspectRatio,
            DeviceChange::CurrentSource(_) => DeviceField::CurrentSource,
            DeviceChange::PictureMode(_) => DeviceField::PictureMode,
            DeviceChange::LampHours(_) => DeviceField::LampHours,
        }
    }
}

/// Point-in-time copy of the projector state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Lamp on
    pub power_state: bool,
    /// Active aspect ratio
    pub aspect_ratio: AspectRatio,
    /// Active input
    pub current_source: SourceType,
    /// Active picture mode
    pub picture_mode: PictureMode,
    /// Lamp-hour counter, 0 until reported
    pub lamp_hours: u32,
    /// When a field last changed
    pub last_updated: Option<DateTime<Utc>>,
}

impl DeviceSnapshot {
    /// Apply a change, returning whether the value differed
    fn apply(&mut self, change: DeviceChange) -> bool {
        let changed = match change {
            DeviceChange::PowerState(v) => replace_if_changed(&mut self.power_state, v),
            DeviceChange::AspectRatio(v) => replace_if_changed(&mut self.aspect_ratio, v),
            DeviceChange::CurrentSource(v) => replace_if_changed(&mut self.current_source, v),
            DeviceChange::PictureMode(v) => replace_if_changed(&mut self.picture_mode, v),
            DeviceChange::LampHours(v) => replace_if_changed(&mut self.lamp_hours, v),
        };
        if changed {
            self.last_updated = Some(Utc::now());
        }
        changed
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Handle returned by [`DeviceState::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn(&DeviceChange) + Send + Sync>;

/// Shared projector state with change notification
pub struct DeviceState {
    snapshot: RwLock<DeviceSnapshot>,
    observers: RwLock<Vec<(ObserverId, Observer)>>,
    next_observer: AtomicU64,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceState")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl DeviceState {
    /// Create a state with every field unknown
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(DeviceSnapshot::default()),
            observers: RwLock::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last confirmed power state
    pub fn power_state(&self) -> bool {
        self.snapshot().power_state
    }

    /// Last confirmed aspect ratio
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.snapshot().aspect_ratio
    }

    /// Last confirmed input source
    pub fn current_source(&self) -> SourceType {
        self.snapshot().current_source
    }

    /// Last confirmed picture mode
    pub fn picture_mode(&self) -> PictureMode {
        self.snapshot().picture_mode
    }

    /// Last confirmed lamp hours
    pub fn lamp_hours(&self) -> u32 {
        self.snapshot().lamp_hours
    }

    /// Store a confirmed value and notify observers if it changed.
    ///
    /// Returns `true` when the stored value was different.
    pub fn set(&self, change: DeviceChange) -> bool {
        let changed = self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(change);

        if changed {
            tracing::debug!("Device state changed: {:?}", change);
            // Called outside the lock so observers may subscribe or unsubscribe
            let observers: Vec<Observer> = self
                .observers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect();
            for observer in observers {
                observer(&change);
            }
        }
        changed
    }

    /// Register a callback invoked after every value change
    pub fn subscribe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        id
    }

    /// Remove a previously registered callback. Returns `false` if unknown.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_defaults_are_unknown() {
        let state = DeviceState::new();
        let snap = state.snapshot();
        assert!(!snap.power_state);
        assert!(snap.aspect_ratio.is_unknown());
        assert_eq!(snap.lamp_hours, 0);
        assert!(snap.last_updated.is_none());
    }

    #[test]
    fn test_set_notifies_only_on_change() {
        let state = DeviceState::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        state.subscribe(move |c| sink.lock().unwrap().push(*c));

        assert!(state.set(DeviceChange::PowerState(true)));
        assert!(!state.set(DeviceChange::PowerState(true)));
        assert!(state.set(DeviceChange::LampHours(1200)));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![DeviceChange::PowerState(true), DeviceChange::LampHours(1200)]
        );
        assert!(state.snapshot().last_updated.is_some());
    }

    #[test]
    fn test_unsubscribe() {
        let state = DeviceState::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = state.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        state.set(DeviceChange::AspectRatio(AspectRatio::Wide));
        assert!(state.unsubscribe(id));
        assert!(!state.unsubscribe(id));
        state.set(DeviceChange::AspectRatio(AspectRatio::Real));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(state.aspect_ratio(), AspectRatio::Real);
    }

    #[test]
    fn test_observer_can_rebind_itself() {
        let state = Arc::new(DeviceState::new());
        let own_id = Arc::new(Mutex::new(None::<ObserverId>));
        let later = Arc::new(AtomicU64::new(0));

        let weak = Arc::downgrade(&state);
        let id_slot = Arc::clone(&own_id);
        let later_count = Arc::clone(&later);
        let id = state.subscribe(move |_| {
            let Some(state) = weak.upgrade() else { return };
            if let Some(id) = id_slot.lock().unwrap().take() {
                assert!(state.unsubscribe(id));
                let c = Arc::clone(&later_count);
                state.subscribe(move |_| {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        *own_id.lock().unwrap() = Some(id);

        state.set(DeviceChange::PowerState(true));
        assert_eq!(later.load(Ordering::SeqCst), 0);

        state.set(DeviceChange::PowerState(false));
        assert_eq!(later.load(Ordering::SeqCst), 1);
        assert_eq!(state.observers.read().unwrap().len(), 1);
    }

    #[test]
    fn test_change_serializes_with_field_tag() {
        let json = serde_json::to_string(&DeviceChange::CurrentSource(SourceType::Hdmi)).unwrap();
        assert_eq!(json, r#"{"field":"current_source","value":"Hdmi"}"#);
        assert_eq!(
            DeviceChange::PictureMode(PictureMode::Game).field(),
            DeviceField::PictureMode
        );
    }
}
