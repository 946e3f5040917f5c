//! Per-type dispatch tables for virtual functions

use std::collections::HashMap;
use std::sync::Arc;

use super::callable::NativeAddress;

/// Virtual function slots of one implementing type
///
/// Lookups fall back to the parent type's table, so a subtype only has to
/// register the slots it overrides.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    type_name: String,
    slots: HashMap<String, NativeAddress>,
    parent: Option<Arc<DispatchTable>>,
}

impl DispatchTable {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            slots: HashMap::new(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: Arc<DispatchTable>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_slot(mut self, name: impl Into<String>, address: NativeAddress) -> Self {
        self.set_slot(name, address);
        self
    }

    pub fn set_slot(&mut self, name: impl Into<String>, address: NativeAddress) {
        self.slots.insert(name.into(), address);
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Find the implementation of `name`, walking up to the parents
    pub fn resolve(&self, name: &str) -> Option<NativeAddress> {
        let mut table = Some(self);
        while let Some(current) = table {
            if let Some(address) = current.slots.get(name) {
                // A null slot is an unimplemented abstract method
                return (!address.is_null()).then_some(*address);
            }
            table = current.parent.as_deref();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_walks_parents() {
        let base = Arc::new(
            DispatchTable::new("Base")
                .with_slot("draw", NativeAddress::from_ptr(0x10 as *const ()))
                .with_slot("size", NativeAddress::from_ptr(0x20 as *const ())),
        );
        let derived = DispatchTable::new("Derived")
            .with_parent(base)
            .with_slot("draw", NativeAddress::from_ptr(0x30 as *const ()));

        assert_eq!(derived.resolve("draw"), Some(NativeAddress::from_ptr(0x30 as *const ())));
        assert_eq!(derived.resolve("size"), Some(NativeAddress::from_ptr(0x20 as *const ())));
        assert_eq!(derived.resolve("missing"), None);
    }

    #[test]
    fn test_null_slot_is_unresolved() {
        let table = DispatchTable::new("Abstract")
            .with_slot("run", NativeAddress::from_ptr(core::ptr::null()));
        assert_eq!(table.resolve("run"), None);
    }
}
