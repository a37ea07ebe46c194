//! Deferred teardown of GPU objects.
//!
//! Each object registers its destroy action right after it is created. Flushing
//! runs the actions newest first, so dependents are destroyed before the objects
//! they were created from.

/// A destroy action run against the owning context `C`.
pub type TeardownFn<C> = Box<dyn FnOnce(&mut C)>;

/// LIFO list of destroy actions.
pub struct DeletionQueue<C> {
    actions: Vec<TeardownFn<C>>,
}

impl<C> Default for DeletionQueue<C> {
    fn default() -> Self {
        Self { actions: Vec::new() }
    }
}

impl<C> DeletionQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action` to run at the next flush.
    pub fn push(&mut self, action: impl FnOnce(&mut C) + 'static) {
        self.actions.push(Box::new(action));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Runs every action newest first, leaving the queue empty.
    pub fn flush(&mut self, ctx: &mut C) {
        while let Some(action) = self.actions.pop() {
            action(ctx);
        }
    }
}

impl<C> std::fmt::Debug for DeletionQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.actions.len())
            .finish()
    }
}
