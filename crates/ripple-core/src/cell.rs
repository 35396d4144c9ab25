use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// The raw value slot owned by exactly one state container.
///
/// A `MutableCell` never notifies anyone. Mutations made through it become
/// visible to listeners only when the owning container notifies, which
/// [`State::edit_async`](crate::State::edit_async) does exactly once after the
/// edit future resolves.
///
/// Every accessor borrows the slot for the duration of the call only, so a
/// handle can be held across `.await` points.
///
/// Keeping a handle past the edit that produced it is allowed but silent:
/// later writes land in the container without a notification.
pub struct MutableCell<T>(Rc<RefCell<T>>);

impl<T> Clone for MutableCell<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableCell").field(&*self.0.borrow()).finish()
    }
}

impl<T> MutableCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow())
    }

    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    pub fn replace(&self, value: T) -> T {
        self.0.replace(value)
    }

    /// In-place edit. The closure must not reach back into this cell.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}
