//! Remote object handles
//!
//! A handle names an object living in the callee process, or is null.
//! The message only carries the value; lifetime of the referenced object
//! belongs to whoever owns the handle table.

use std::fmt;
use std::num::NonZeroU64;

/// Wire kind for a null handle
pub const HANDLE_KIND_NULL: i32 = 0;

/// Wire kind for a live object handle
pub const HANDLE_KIND_OBJECT: i32 = 1;

/// Opaque cross-boundary reference, or the null sentinel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RemoteHandle(Option<NonZeroU64>);

impl RemoteHandle {
    /// The null handle ("no object")
    pub const NULL: RemoteHandle = RemoteHandle(None);

    /// Handle for object `id`; id 0 yields the null handle
    pub fn new(id: u64) -> Self {
        Self(NonZeroU64::new(id))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Object id, or `None` for null
    pub fn id(&self) -> Option<u64> {
        self.0.map(NonZeroU64::get)
    }

    /// Wire pair (kind, id)
    pub(crate) fn to_wire(self) -> (i32, u64) {
        match self.0 {
            Some(id) => (HANDLE_KIND_OBJECT, id.get()),
            None => (HANDLE_KIND_NULL, 0),
        }
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "handle#{}", id),
            None => write!(f, "null"),
        }
    }
}
