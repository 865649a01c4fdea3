//! Type-erased release of an adopted allocation.
//!
//! A `Release` is captured once, at the point where an allocation is
//! adopted and its concrete type is known, and then copied verbatim to
//! every sibling. Whichever sibling turns out to be the last owner runs it,
//! whatever element type that sibling happens to be declared over. This is
//! what lets a `Linked<dyn Trait>` (or a handle over an opaque type) be the
//! one that frees the object.

use core::fmt;
use core::ptr::NonNull;

#[derive(Clone, Copy)]
pub(crate) struct Release {
    ptr: NonNull<u8>,
    drop_fn: unsafe fn(NonNull<u8>),
}

impl Release {
    /// Capture the release of a `Box<T>` that was turned into `ptr`.
    ///
    /// Safety: `ptr` must come from `Box::<T>::into_raw` (or `Box::leak`) and
    /// the caller hands over ownership of that box.
    pub(crate) unsafe fn for_box<T>(ptr: NonNull<T>) -> Self {
        Self {
            ptr: ptr.cast(),
            drop_fn: drop_box::<T>,
        }
    }

    #[cfg_attr(not(any(test, feature = "log")), allow(dead_code))]
    pub(crate) fn addr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Drop the object and free its allocation.
    ///
    /// Safety: must run at most once per adopted allocation, and only once no
    /// other owner is left to observe it.
    pub(crate) unsafe fn run(self) {
        unsafe { (self.drop_fn)(self.ptr) }
    }
}

impl fmt::Debug for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Release").field(&self.ptr).finish()
    }
}

unsafe fn drop_box<T>(ptr: NonNull<u8>) {
    drop(unsafe { Box::from_raw(ptr.cast::<T>().as_ptr()) });
}
