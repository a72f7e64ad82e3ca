//! Per-session extension state store (component H): a fixed-capacity table
//! of opaque per-type values, split into a *live* side (the handshake
//! currently in progress) and a *resumed* side (state recovered from a
//! resumption ticket, staged until [`ExtensionStore::restore_resumed`]
//! promotes it).

use std::any::Any;

use keycore_error::Error;

use super::registry::ExtensionType;

/// Single bound shared by the global registry, the per-session registry and
/// both sides of this store (§4.G Open Question: the source checks
/// `MAX_EXT_TYPES` inconsistently across these three; this crate enforces
/// one constant everywhere).
pub const MAX_EXT_TYPES: usize = 32;

/// Typed per-extension session state. Any `'static + Send + Sync + Debug`
/// value qualifies, so built-ins store plain `bool`/`Vec<u16>`/`String`
/// rather than purpose-built wrapper types.
///
/// Rust's `Drop` on the boxed trait object stands in for the reference
/// implementation's explicit `deinit` callback (§9 Design Notes):
/// overwriting or unsetting a slot drops the old value, running whatever
/// destructor it has. A descriptor only needs a `pack`/`unpack` pair when
/// its state must survive a resumption round-trip.
pub trait ExtensionState: Any + Send + Sync + std::fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + std::fmt::Debug> ExtensionState for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Downcasts a stored value, for use inside a descriptor's `recv`/`send`.
pub fn downcast<T: 'static>(state: &dyn ExtensionState) -> Option<&T> {
    state.as_any().downcast_ref::<T>()
}

struct Slot {
    ty: ExtensionType,
    data: Box<dyn ExtensionState>,
}

/// Fixed-capacity live and resumed extension state for one session (§3
/// Session Extension State).
#[derive(Default)]
pub struct ExtensionStore {
    live: Vec<Slot>,
    resumed: Vec<Slot>,
}

impl ExtensionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `set(session, type, data)`: overwrites an existing slot in place
    /// (dropping its old value) or appends a new one, failing with
    /// [`Error::MemoryError`] past [`MAX_EXT_TYPES`] live entries.
    pub fn set(&mut self, ty: ExtensionType, data: Box<dyn ExtensionState>) -> Result<(), Error> {
        if let Some(slot) = self.live.iter_mut().find(|s| s.ty == ty) {
            slot.data = data;
            return Ok(());
        }
        if self.live.len() >= MAX_EXT_TYPES {
            return Err(Error::MemoryError);
        }
        self.live.push(Slot { ty, data });
        Ok(())
    }

    /// `get(session, type)`.
    pub fn get(&self, ty: ExtensionType) -> Result<&dyn ExtensionState, Error> {
        self.live
            .iter()
            .find(|s| s.ty == ty)
            .map(|s| s.data.as_ref())
            .ok_or(Error::RequestedDataNotAvailable)
    }

    #[must_use]
    pub fn is_set(&self, ty: ExtensionType) -> bool {
        self.live.iter().any(|s| s.ty == ty)
    }

    /// `unset(session, type)`: a no-op if the type was never set.
    pub fn unset(&mut self, ty: ExtensionType) {
        self.live.retain(|s| s.ty != ty);
    }

    pub(crate) fn set_resumed(&mut self, ty: ExtensionType, data: Box<dyn ExtensionState>) -> Result<(), Error> {
        if let Some(slot) = self.resumed.iter_mut().find(|s| s.ty == ty) {
            slot.data = data;
            return Ok(());
        }
        if self.resumed.len() >= MAX_EXT_TYPES {
            return Err(Error::MemoryError);
        }
        self.resumed.push(Slot { ty, data });
        Ok(())
    }

    pub(crate) fn live_entries(&self) -> impl Iterator<Item = (ExtensionType, &dyn ExtensionState)> {
        self.live.iter().map(|s| (s.ty, s.data.as_ref()))
    }

    /// `restore_resumed(session)`: every live, non-`MANDATORY` entry is
    /// unset, then every resumed, non-`MANDATORY` entry is moved into live
    /// and cleared from the resumed side. `MANDATORY` entries, live or
    /// resumed, are left untouched by this call (§3: mandatory extensions
    /// are exempt from the clear-on-resumption rule).
    pub fn restore_resumed(&mut self, is_mandatory: impl Fn(ExtensionType) -> bool) {
        self.live.retain(|s| is_mandatory(s.ty));
        let mut still_resumed = Vec::new();
        for slot in self.resumed.drain(..) {
            if is_mandatory(slot.ty) {
                still_resumed.push(slot);
            } else {
                self.live.push(slot);
            }
        }
        self.resumed = still_resumed;
    }

    /// `free_session_data(session)`: drops everything, live and resumed.
    pub fn free_session_data(&mut self) {
        self.live.clear();
        self.resumed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips() {
        let mut store = ExtensionStore::new();
        store.set(23, Box::new(true)).expect("set");
        assert!(*downcast::<bool>(store.get(23).expect("get")).expect("bool"));
    }

    #[test]
    fn unset_missing_type_is_a_no_op() {
        let mut store = ExtensionStore::new();
        store.unset(1);
        assert!(!store.is_set(1));
    }

    #[test]
    fn overwrite_replaces_rather_than_duplicates() {
        let mut store = ExtensionStore::new();
        store.set(1, Box::new(1u8)).expect("set");
        store.set(1, Box::new(2u8)).expect("set");
        assert_eq!(store.live_entries().count(), 1);
        assert_eq!(*downcast::<u8>(store.get(1).expect("get")).expect("u8"), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut store = ExtensionStore::new();
        for ty in 0..MAX_EXT_TYPES as u16 {
            store.set(ty, Box::new(())).expect("set within capacity");
        }
        assert!(matches!(store.set(MAX_EXT_TYPES as u16, Box::new(())), Err(Error::MemoryError)));
    }

    #[test]
    fn restore_resumed_moves_non_mandatory_and_preserves_mandatory() {
        let mut store = ExtensionStore::new();
        store.set(1, Box::new("old-live")).expect("set");
        store.set(99, Box::new("mandatory-live")).expect("set");
        store.set_resumed(1, Box::new("resumed")).expect("set_resumed");
        store.set_resumed(99, Box::new("mandatory-resumed")).expect("set_resumed");

        store.restore_resumed(|ty| ty == 99);

        assert_eq!(*downcast::<&str>(store.get(1).expect("get")).expect("str"), "resumed");
        assert_eq!(*downcast::<&str>(store.get(99).expect("get")).expect("str"), "mandatory-live");
    }

    #[test]
    fn free_session_data_clears_both_sides() {
        let mut store = ExtensionStore::new();
        store.set(1, Box::new(1u8)).expect("set");
        store.set_resumed(2, Box::new(2u8)).expect("set_resumed");
        store.free_session_data();
        assert!(!store.is_set(1));
        assert_eq!(store.live_entries().count(), 0);
    }
}
