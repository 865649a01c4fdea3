//! linked-ptr: a single-threaded shared-ownership pointer that tracks its
//! co-owners with an intrusive list of sibling handles instead of a
//! reference count.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: detect "the last owner let go" without a separate control
//!   block or count field, and keep the chain logic testable on its own.
//! - Layers:
//!   - `node::Node`: payload-free sibling-chain primitive with O(1)
//!     `attach`, `detach` and a position-exchanging `swap`. All raw-pointer
//!     link handling lives here.
//!   - `release::Release`: type-erased "drop this box" captured when an
//!     allocation is adopted and copied to every sibling.
//!   - `Linked<T>`: public handle pairing a node with a typed address and
//!     exposing pointer-like access and address ordering.
//!
//! Constraints
//! - Single-threaded: `!Send`/`!Sync` by design (no atomics on the links).
//! - Each non-empty handle owns one small heap node so handle values can
//!   move freely while siblings keep pointing at a stable node address.
//!   Empty handles carry no node and never allocate.
//! - A handle with no siblings and a non-null address is the sole owner;
//!   that is the only ownership fact ever exposed. There is no count.
//! - Adoption is explicit (`new`, `from_box`, unsafe `from_raw`); every
//!   other way to share an address goes through `Clone` or `convert`.
//!
//! Ownership protocol
//! - Copy: a clone starts with the source's address and release, then is
//!   attached to the right of the source.
//! - Assign: copy the right-hand side into a temporary, swap it in, drop
//!   the temporary. Self-assignment falls out of the same path.
//! - Release (drop, reset, assign-away): decide "was I the last owner"
//!   from the chain shape before unlinking, unlink and free the node, then
//!   run the release if so. User drop code never runs against a
//!   half-linked chain, and a panicking drop leaks nothing of ours.
//!
//! Element types
//! - `Linked<T: ?Sized>`: a handle can be declared, cloned and dropped as
//!   `Linked<dyn Trait>` or over an opaque type. The concrete drop was
//!   captured at adoption, so whichever sibling is last frees the object
//!   with the type it was created as.
//! - `Linked::from_box_with` and `Linked::reset_to_with` adopt a boxed
//!   concrete value straight into a `Linked<dyn Trait>`.
//! - `Linked::convert` joins a chain under another element type as long as
//!   the projection keeps the address (typically an unsizing cast).
//!
//! Notes and non-goals
//! - No weak handles, custom deleters, array forms or allocator
//!   control.
//! - Comparisons and hashing use the object's address only.
//! - Zero-sized values may share an address, so independent handles to
//!   them compare equal.

mod linked;
pub mod node;
mod release;

#[cfg(test)]
mod chain_proptest;

// Public surface
pub use linked::{swap, ConvertError, Linked};

pub(crate) mod logging {
    #[cfg(feature = "log")]
    pub(crate) use log::trace;

    // No-op when the `log` feature is off.
    #[cfg(not(feature = "log"))]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    #[cfg(not(feature = "log"))]
    pub(crate) use trace;
}
