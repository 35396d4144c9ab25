use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Run-once cleanup handle. Cloning shares the same cleanup.
#[derive(Clone)]
pub struct Dispose(Rc<RefCell<Option<Box<dyn FnOnce()>>>>);

impl Dispose {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Rc::new(RefCell::new(Some(Box::new(f)))))
    }

    /// Runs at most once (safe to call multiple times).
    pub fn run(&self) {
        let f = self.0.borrow_mut().take();
        if let Some(f) = f {
            f()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.0.borrow().is_some()
    }
}

/// Something that can be torn down deterministically.
pub trait Disposable {
    fn dispose(&self);
}

/// Owner of a group of containers (a logic box, a screen, a derivation
/// group). Disposing the scope disposes its children first, then runs its
/// own cleanups in registration order.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    disposers: RefCell<Vec<Dispose>>,
    children: RefCell<Vec<Scope>>,
    disposed: Cell<bool>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                disposers: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    pub fn add_disposer(&self, disposer: impl FnOnce() + 'static) -> Dispose {
        let d = Dispose::new(disposer);
        if self.inner.disposed.get() {
            log::warn!("scope already disposed; running cleanup immediately");
            d.run();
        } else {
            self.inner.disposers.borrow_mut().push(d.clone());
        }
        d
    }

    /// Takes ownership of `target`: it is disposed together with this scope.
    pub fn adopt<D>(&self, target: &D) -> Dispose
    where
        D: Disposable + Clone + 'static,
    {
        let target = target.clone();
        self.add_disposer(move || target.dispose())
    }

    pub fn child(&self) -> Scope {
        let child = Scope::new();
        self.inner.children.borrow_mut().push(child.clone());
        child
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.release();
    }
}

impl ScopeInner {
    fn release(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            child.dispose();
        }

        let disposers = std::mem::take(&mut *self.disposers.borrow_mut());
        for disposer in disposers {
            disposer.run();
        }
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Disposable for Scope {
    fn dispose(&self) {
        Scope::dispose(self)
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if !self.disposed.replace(true) {
            self.release();
        }
    }
}
