use crate::logging::trace;
use crate::node::Node;
use crate::release::Release;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::{self, NonNull};

/// A shared-ownership pointer whose co-owners form a chain of siblings.
///
/// Cloning a `Linked` joins the source's chain; dropping one leaves it.
/// The object is freed when the last member of the chain is dropped,
/// reset, or reassigned. There is no count: the only thing a handle can
/// tell about its siblings is whether it has any ([`Linked::is_unique`]).
///
/// Comparison, ordering and hashing go by the address of the object, not
/// by its value, so handles can key ordered and hashed collections.
///
/// Like `Rc`, this type is `!Send` and `!Sync`:
///
/// ```compile_fail
/// fn needs_send<T: Send>(_: T) {}
/// needs_send(linked_ptr::Linked::new(1));
/// ```
///
/// All operations are associated functions (`Linked::is_unique(&h)`) so
/// they never shadow methods of the pointee reached through `Deref`.
pub struct Linked<T: ?Sized> {
    raw: Option<NonNull<T>>,
    // Some iff `raw` is Some; shared verbatim by every sibling.
    release: Option<Release>,
    // Some iff `raw` is Some. Heap-pinned so handles can move while
    // siblings point at the node; empty handles never need one.
    node: Option<NonNull<Node>>,
    _owns: PhantomData<T>,
    _nosend: PhantomData<*mut ()>,
}

/// Error returned by [`Linked::convert`] and the `*_with` adoption paths.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConvertError {
    /// The projection returned a reference to a different address than the
    /// shared object, so the result could not join its chain.
    AddressMismatch,
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::AddressMismatch => {
                f.write_str("converted reference does not point at the shared object")
            }
        }
    }
}

impl std::error::Error for ConvertError {}

impl<T> Linked<T> {
    /// Move `value` to the heap and become its sole owner.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Adopt a boxed value as a new, unique chain.
    pub fn from_box(value: Box<T>) -> Self {
        let raw = NonNull::from(Box::leak(value));
        // SAFETY: `raw` was just released from its box.
        unsafe { Self::adopt(raw, Release::for_box(raw)) }
    }

    /// Adopt a raw pointer as a new, unique chain. A null pointer gives an
    /// empty handle.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `Box::<T>::into_raw`, and nothing else
    /// may own it. Adopting the same address twice creates two independent
    /// chains that will both free it; share an address by cloning instead.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            Some(raw) => unsafe { Self::adopt(raw, Release::for_box(raw)) },
            None => Self::empty(),
        }
    }

    /// Release the current object (as a drop would) and adopt `value`.
    pub fn reset_to(this: &mut Self, value: Box<T>) {
        Self::relinquish(this);
        *this = Self::from_box(value);
    }
}

impl<T: ?Sized> Linked<T> {
    /// A handle that owns nothing. Does not allocate.
    pub const fn empty() -> Self {
        Self {
            raw: None,
            release: None,
            node: None,
            _owns: PhantomData,
            _nosend: PhantomData,
        }
    }

    /// Adopt a boxed `U` as a new, unique chain viewed as `T`.
    ///
    /// `f` projects the value to the handle's element type, typically an
    /// unsizing cast such as `|c| c as &dyn Shape`. The object is still
    /// dropped as a `U`. If the projection moves the address the value is
    /// dropped and `ConvertError::AddressMismatch` is returned.
    pub fn from_box_with<U>(
        value: Box<U>,
        f: impl FnOnce(&U) -> &T,
    ) -> Result<Self, ConvertError> {
        let raw = NonNull::from(Box::leak(value));
        // SAFETY: `raw` was just released from its box and is not shared.
        let target = NonNull::from(f(unsafe { raw.as_ref() }));
        if target.cast::<u8>() != raw.cast::<u8>() {
            // SAFETY: nothing adopted `raw`; hand it back to its box.
            drop(unsafe { Box::from_raw(raw.as_ptr()) });
            return Err(ConvertError::AddressMismatch);
        }
        // SAFETY: `raw` was released from a `Box<U>` and is owned by nobody else.
        Ok(unsafe { Self::adopt(target, Release::for_box(raw)) })
    }

    /// Release the current object (as a drop would) and adopt `value`
    /// viewed as `T`. On `ConvertError` the handle is left untouched.
    pub fn reset_to_with<U>(
        this: &mut Self,
        value: Box<U>,
        f: impl FnOnce(&U) -> &T,
    ) -> Result<(), ConvertError> {
        let fresh = Self::from_box_with(value, f)?;
        Self::relinquish(this);
        *this = fresh;
        Ok(())
    }

    // Safety: `release` frees the allocation behind `raw`, which nothing
    // else owns.
    unsafe fn adopt(raw: NonNull<T>, release: Release) -> Self {
        trace!("linked: adopt {:p}", release.addr());
        Self::linked_to(raw, release)
    }

    // A populated, still isolated handle with a fresh node.
    fn linked_to(raw: NonNull<T>, release: Release) -> Self {
        Self {
            raw: Some(raw),
            release: Some(release),
            node: Some(NonNull::from(Box::leak(Box::new(Node::new())))),
            _owns: PhantomData,
            _nosend: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn node(this: &Self) -> Option<&Node> {
        // SAFETY: the node is owned by this handle and freed only when the
        // handle lets go of its object.
        this.node.map(|n| unsafe { n.as_ref() })
    }

    #[inline]
    fn addr(this: &Self) -> *const u8 {
        this.raw.map_or(ptr::null(), |p| p.cast::<u8>().as_ptr())
    }

    #[inline]
    fn cmp_addr<U: ?Sized>(this: &Self, other: &Linked<U>) -> Ordering {
        Self::addr(this).cmp(&Linked::addr(other))
    }

    /// Address of the shared object, if any.
    #[inline]
    pub fn as_ptr(this: &Self) -> Option<NonNull<T>> {
        this.raw
    }

    /// Borrow the shared object, if any.
    #[inline]
    pub fn get(this: &Self) -> Option<&T> {
        // SAFETY: a non-null `raw` is kept alive by this chain.
        this.raw.map(|p| unsafe { p.as_ref() })
    }

    /// Mutably borrow the object while this handle is its only owner.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        if !Self::is_unique(this) {
            return None;
        }
        // SAFETY: no sibling exists and `this` is borrowed exclusively.
        this.raw.map(|mut p| unsafe { p.as_mut() })
    }

    /// True iff this handle owns an object and has no siblings.
    ///
    /// An empty handle is not unique: it has no owner rather than one.
    #[inline]
    pub fn is_unique(this: &Self) -> bool {
        Self::node(this).is_some_and(Node::is_isolated)
    }

    /// True iff this handle points at an object.
    #[inline]
    pub fn is_some(this: &Self) -> bool {
        this.raw.is_some()
    }

    /// True iff both handles point at the same address (or are both empty).
    #[inline]
    pub fn ptr_eq<U: ?Sized>(this: &Self, other: &Linked<U>) -> bool {
        Self::addr(this) == Linked::addr(other)
    }

    /// Join `this`'s chain under a different element type.
    ///
    /// `f` projects the object to the target type, typically an unsizing
    /// cast such as `|c| c as &dyn Shape`. The projection must keep the
    /// address; anything else (a field at an offset, an unrelated
    /// reference) is rejected. Converting an empty handle gives an empty
    /// handle.
    ///
    /// Assigning from a related type is `Linked::assign(&mut dst,
    /// &Linked::convert(&src, f)?)`.
    pub fn convert<U: ?Sized>(
        this: &Self,
        f: impl FnOnce(&T) -> &U,
    ) -> Result<Linked<U>, ConvertError> {
        let (Some(raw), Some(release), Some(node)) = (this.raw, this.release, Self::node(this))
        else {
            return Ok(Linked::empty());
        };
        // SAFETY: a non-null `raw` is kept alive by this chain.
        let target = NonNull::from(f(unsafe { raw.as_ref() }));
        if target.cast::<u8>() != raw.cast::<u8>() {
            return Err(ConvertError::AddressMismatch);
        }
        let copy = Linked::linked_to(target, release);
        if let Some(fresh) = Linked::node(&copy) {
            // SAFETY: `fresh` is isolated; every sibling is alive and heap-pinned.
            unsafe { node.attach(fresh) };
        }
        Ok(copy)
    }

    /// Make `this` share `source`'s object: copy `source`, then swap the
    /// copy in. The old object is released if `this` was its last owner.
    /// Self-assignment and assignment within one chain need no special case.
    pub fn assign(this: &mut Self, source: &Self) {
        let mut tmp = source.clone();
        Self::swap(this, &mut tmp);
    }

    /// Release the current object (as a drop would) and become empty.
    pub fn reset(this: &mut Self) {
        Self::relinquish(this);
    }

    /// Exchange what `a` and `b` point at. Every other sibling keeps
    /// pointing at the same object it did before.
    pub fn swap(a: &mut Self, b: &mut Self) {
        match (a.node, b.node) {
            // SAFETY: both nodes are heap-pinned and every sibling is alive.
            (Some(x), Some(y)) => unsafe { x.as_ref().swap(y.as_ref()) },
            // An empty side has no position; the other side's node simply
            // moves over with its object.
            _ => mem::swap(&mut a.node, &mut b.node),
        }
        mem::swap(&mut a.raw, &mut b.raw);
        mem::swap(&mut a.release, &mut b.release);
    }

    // Uniqueness is decided on the chain shape before unlinking. The node
    // is freed before the object so a panicking destructor cannot leak it.
    fn relinquish(this: &mut Self) {
        this.raw = None;
        let release = this.release.take();
        let Some(node) = this.node.take() else {
            return;
        };
        // SAFETY: siblings are alive and unlink themselves before going away.
        let last = unsafe {
            let links = node.as_ref();
            let last = links.is_isolated();
            links.detach();
            last
        };
        // SAFETY: the node came from `Box::leak` in `linked_to` and is
        // isolated now, so no sibling refers to it.
        drop(unsafe { Box::from_raw(node.as_ptr()) });
        if let (true, Some(release)) = (last, release) {
            trace!("linked: release {:p}", release.addr());
            // SAFETY: this handle was the only owner left.
            unsafe { release.run() };
        }
    }
}

impl<T> From<Box<T>> for Linked<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized> Default for Linked<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> Clone for Linked<T> {
    /// Join `self`'s chain. Cloning an empty handle gives another empty
    /// handle and allocates nothing.
    fn clone(&self) -> Self {
        let (Some(raw), Some(release), Some(node)) = (self.raw, self.release, Self::node(self))
        else {
            return Self::empty();
        };
        let copy = Self::linked_to(raw, release);
        if let Some(fresh) = Self::node(&copy) {
            // SAFETY: `fresh` is isolated; every sibling is alive and heap-pinned.
            unsafe { node.attach(fresh) };
        }
        copy
    }

    fn clone_from(&mut self, source: &Self) {
        Self::assign(self, source);
    }
}

impl<T: ?Sized> Drop for Linked<T> {
    fn drop(&mut self) {
        Self::relinquish(self);
    }
}

impl<T: ?Sized> Deref for Linked<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty. Check [`Linked::is_some`] first or
    /// use [`Linked::get`].
    fn deref(&self) -> &T {
        match Self::get(self) {
            Some(value) => value,
            None => panic!("dereferenced an empty Linked"),
        }
    }
}

impl<T: ?Sized> AsRef<T> for Linked<T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Linked<U>> for Linked<T> {
    fn eq(&self, other: &Linked<U>) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl<T: ?Sized> Eq for Linked<T> {}

impl<T: ?Sized, U: ?Sized> PartialOrd<Linked<U>> for Linked<T> {
    fn partial_cmp(&self, other: &Linked<U>) -> Option<Ordering> {
        Some(Self::cmp_addr(self, other))
    }
}

impl<T: ?Sized> Ord for Linked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_addr(self, other)
    }
}

impl<T: ?Sized> Hash for Linked<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Self::addr(self).hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Linked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linked")
            .field("ptr", &Self::addr(self))
            .field("unique", &Self::is_unique(self))
            .finish()
    }
}

impl<T: ?Sized> fmt::Pointer for Linked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&Self::addr(self), f)
    }
}

/// Exchange what `a` and `b` point at; see [`Linked::swap`].
pub fn swap<T: ?Sized>(a: &mut Linked<T>, b: &mut Linked<T>) {
    Linked::swap(a, b);
}
