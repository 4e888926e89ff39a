//! Ordered, deduplicating callback registries.
//!
//! A [`ListenerRegistry`] holds the callbacks for one interception point and
//! phase. Notification order is registration order. Structural changes take
//! the registry mutex; invoking a callback never does, so a listener may
//! register or unregister listeners (including itself) while it runs.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Shared handle to a plugin callback.
///
/// Two handles are the same listener when they point at the same
/// allocation; keep a clone of the handle you registered to remove it later.
pub struct Listener<F: ?Sized> {
    callback: Arc<F>,
}

impl<F: ?Sized> Listener<F> {
    /// Wraps an already shared callback.
    pub fn from_arc(callback: Arc<F>) -> Self {
        Self { callback }
    }

    /// The callback itself.
    pub fn callback(&self) -> &F {
        &self.callback
    }

    /// True when both handles refer to the same registered callback.
    pub fn same_as(&self, other: &Listener<F>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.callback), Arc::as_ptr(&other.callback))
    }
}

impl<F: ?Sized> Clone for Listener<F> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<F: ?Sized> PartialEq for Listener<F> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl<F: ?Sized> Eq for Listener<F> {}

impl<F: ?Sized> fmt::Debug for Listener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Listener")
            .field(&Arc::as_ptr(&self.callback).cast::<()>())
            .finish()
    }
}

/// Callback collection for one fixed signature.
pub struct ListenerRegistry<F: ?Sized> {
    callbacks: Mutex<Vec<Listener<F>>>,
}

impl<F: ?Sized> ListenerRegistry<F> {
    pub fn new() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Appends a listener. Returns `false` if it is already registered.
    pub fn register(&self, listener: Listener<F>) -> bool {
        let mut callbacks = self.callbacks.lock();
        if callbacks.iter().any(|existing| existing.same_as(&listener)) {
            warn!("⚠️ Callback already registered");
            return false;
        }
        callbacks.push(listener);
        true
    }

    /// Removes a listener, keeping the order of the rest. Returns `false` if
    /// it was never registered.
    pub fn unregister(&self, listener: &Listener<F>) -> bool {
        let mut callbacks = self.callbacks.lock();
        match callbacks.iter().position(|existing| existing.same_as(listener)) {
            Some(index) => {
                callbacks.remove(index);
                true
            }
            None => {
                warn!("⚠️ Callback not registered");
                false
            }
        }
    }

    /// Position of a listener in notification order.
    pub fn find(&self, listener: &Listener<F>) -> Option<usize> {
        self.callbacks
            .lock()
            .iter()
            .position(|existing| existing.same_as(listener))
    }

    pub fn is_registered(&self, listener: &Listener<F>) -> bool {
        self.find(listener).is_some()
    }

    /// The listener at `index`, if the registry still has that many.
    ///
    /// This is the notify-by-index primitive: callers fetch, release the
    /// lock, then invoke the callback.
    pub fn get(&self, index: usize) -> Option<Listener<F>> {
        self.callbacks.lock().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    pub fn clear(&self) {
        self.callbacks.lock().clear();
    }

    /// Live view over the registry.
    ///
    /// Each step re-reads the current length, so listeners appended during
    /// iteration are visited and removals shift the remaining ones down.
    pub fn iter(&self) -> ListenerIter<'_, F> {
        ListenerIter {
            registry: self,
            index: 0,
        }
    }

    /// Invokes every listener with `notify`, in order.
    pub fn notify_all(&self, mut notify: impl FnMut(&F)) {
        for listener in self.iter() {
            notify(listener.callback());
        }
    }
}

impl<F: ?Sized> Default for ListenerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for ListenerRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("count", &self.len())
            .finish()
    }
}

/// Iterator returned by [`ListenerRegistry::iter`].
pub struct ListenerIter<'a, F: ?Sized> {
    registry: &'a ListenerRegistry<F>,
    index: usize,
}

impl<F: ?Sized> Iterator for ListenerIter<'_, F> {
    type Item = Listener<F>;

    fn next(&mut self) -> Option<Self::Item> {
        let listener = self.registry.get(self.index)?;
        self.index += 1;
        Some(listener)
    }
}
