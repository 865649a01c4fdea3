//! Sibling-chain primitive.
//!
//! A [`Node`] is one member of an unordered, doubly-linked chain of
//! co-owners. It carries no payload: the only question a chain answers is
//! "is anybody else here?". Links live in `Cell`s so a chain can be joined
//! or left through a shared reference to any of its members.
//!
//! Every operation that follows a link is `unsafe`: the caller guarantees
//! that all nodes reachable from the chain are alive and have not moved
//! since they were linked. `Linked` upholds this by giving each handle its
//! own heap-allocated node.

use core::cell::Cell;
use core::marker::{PhantomData, PhantomPinned};
use core::ptr::{self, NonNull};
use std::collections::BTreeSet;

type Link = Option<NonNull<Node>>;

/// One member of a sibling chain.
pub struct Node {
    left: Cell<Link>,
    right: Cell<Link>,
    // Neighbours hold raw pointers into this node; it must never receive
    // `noalias` treatment.
    _unpin: PhantomPinned,
    _nosend: PhantomData<*mut ()>,
}

impl Node {
    /// A fresh, isolated node.
    pub const fn new() -> Self {
        Self {
            left: Cell::new(None),
            right: Cell::new(None),
            _unpin: PhantomPinned,
            _nosend: PhantomData,
        }
    }

    #[inline]
    pub fn left(&self) -> Option<NonNull<Node>> {
        self.left.get()
    }

    #[inline]
    pub fn right(&self) -> Option<NonNull<Node>> {
        self.right.get()
    }

    /// True when the node has no siblings on either side.
    #[inline]
    pub fn is_isolated(&self) -> bool {
        self.left.get().is_none() && self.right.get().is_none()
    }

    /// Insert `newcomer` immediately to the right of `self`. O(1).
    ///
    /// # Safety
    ///
    /// Every node in `self`'s chain must be alive and pinned in place while
    /// linked. `newcomer` must be isolated, must not be `self`, and must stay
    /// alive and in place until it is detached again.
    pub unsafe fn attach(&self, newcomer: &Node) {
        debug_assert!(newcomer.is_isolated(), "attach: newcomer is already linked");
        debug_assert!(!ptr::eq(self, newcomer), "attach: node cannot join itself");
        let this = NonNull::from(self);
        let fresh = NonNull::from(newcomer);
        let next = self.right.get();
        newcomer.left.set(Some(this));
        newcomer.right.set(next);
        if let Some(next) = next {
            unsafe { next.as_ref() }.left.set(Some(fresh));
        }
        self.right.set(Some(fresh));
    }

    /// Remove `self` from its chain, splicing the neighbours together.
    /// A no-op on an isolated node.
    ///
    /// # Safety
    ///
    /// Both neighbours (if any) must be alive.
    pub unsafe fn detach(&self) {
        let prev = self.left.get();
        let next = self.right.get();
        if let Some(prev) = prev {
            unsafe { prev.as_ref() }.right.set(next);
        }
        if let Some(next) = next {
            unsafe { next.as_ref() }.left.set(prev);
        }
        self.left.set(None);
        self.right.set(None);
    }

    /// Exchange the chain positions of `self` and `other`.
    ///
    /// Afterwards `self` sits in the chain `other` used to belong to and vice
    /// versa; uninvolved siblings keep their own identity. Swapping a node
    /// with itself or with a direct neighbour leaves both chains untouched,
    /// since both positions then already stand for the same object.
    ///
    /// # Safety
    ///
    /// Same requirements as [`attach`](Self::attach) and
    /// [`detach`](Self::detach) for both chains.
    pub unsafe fn swap(&self, other: &Node) {
        let a = NonNull::from(self);
        let b = NonNull::from(other);
        if a == b {
            return;
        }
        // Pick the anchors before touching anything.
        let anchor_a = self.left.get().or(self.right.get());
        let anchor_b = other.left.get().or(other.right.get());
        if anchor_a == Some(b) || anchor_b == Some(a) {
            return;
        }
        unsafe {
            self.detach();
            other.detach();
            if let Some(anchor) = anchor_a {
                anchor.as_ref().attach(other);
            }
            if let Some(anchor) = anchor_b {
                anchor.as_ref().attach(self);
            }
        }
    }

    /// Walk the chain both ways and panic on a broken back-link or a node
    /// that shows up twice.
    ///
    /// # Safety
    ///
    /// Every node reachable from `self` must be alive.
    pub unsafe fn assert_valid(&self) {
        let here = NonNull::from(self);
        let mut seen = BTreeSet::new();
        seen.insert(here);

        let mut prev = here;
        let mut cur = self.right.get();
        while let Some(node) = cur {
            assert!(seen.insert(node), "chain visits a node twice");
            let links = unsafe { node.as_ref() };
            assert_eq!(links.left.get(), Some(prev), "right neighbour does not link back");
            prev = node;
            cur = links.right.get();
        }

        let mut next = here;
        let mut cur = self.left.get();
        while let Some(node) = cur {
            assert!(seen.insert(node), "chain visits a node twice");
            let links = unsafe { node.as_ref() };
            assert_eq!(links.right.get(), Some(next), "left neighbour does not link back");
            next = node;
            cur = links.left.get();
        }
    }

    /// Every member of the chain, `self` included.
    ///
    /// # Safety
    ///
    /// Every node reachable from `self` must be alive.
    #[cfg(test)]
    pub(crate) unsafe fn members(&self) -> BTreeSet<NonNull<Node>> {
        let mut out = BTreeSet::new();
        out.insert(NonNull::from(self));
        let mut cur = self.right.get();
        while let Some(node) = cur {
            out.insert(node);
            cur = unsafe { node.as_ref() }.right.get();
        }
        let mut cur = self.left.get();
        while let Some(node) = cur {
            out.insert(node);
            cur = unsafe { node.as_ref() }.left.get();
        }
        out
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}
