// id.rs — Stable identifiers for module members
//
// Weaving caches (hidden fields, return slots, entry cursors) are keyed by
// these IDs rather than by position or object identity. IDs are allocated in
// declaration order when a module is assembled and reassigned after a module
// is deserialized, so the same input always yields the same IDs.

use serde::{Deserialize, Serialize};

/// Stable identifier for a type definition.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TypeId(pub u32);

/// Stable identifier for a method definition (unique across the module).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MethodId(pub u32);

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation order, ensuring deterministic assignment.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_type: u32,
    next_method: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_type(&mut self) -> TypeId {
        let id = TypeId(self.next_type);
        self.next_type += 1;
        id
    }

    pub fn alloc_method(&mut self) -> MethodId {
        let id = MethodId(self.next_method);
        self.next_method += 1;
        id
    }
}
