//! List with deferred mutation
//!
//! Adds and removals are queued and only merged into the live list by
//! [`SafeList::synchronize`], so the owner can iterate the live entries while
//! callbacks running inside that iteration request changes.

/// Identifier handed out for every queued entry.
pub type EntryId = u64;

#[derive(Debug)]
pub struct SafeList<T> {
    live: Vec<(EntryId, T)>,
    pending_add: Vec<(EntryId, T)>,
    pending_remove: Vec<EntryId>,
    next_id: EntryId,
}

impl<T> Default for SafeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SafeList<T> {
    pub fn new() -> Self {
        Self {
            live: Vec::new(),
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
            next_id: 0,
        }
    }

    /// Queue an entry; it becomes visible after the next synchronize.
    pub fn queue_add(&mut self, item: T) -> EntryId {
        self.next_id += 1;
        let id = self.next_id;
        self.pending_add.push((id, item));
        id
    }

    pub fn queue_remove(&mut self, id: EntryId) {
        if !self.pending_remove.contains(&id) {
            self.pending_remove.push(id);
        }
    }

    pub fn is_pending_removal(&self, id: EntryId) -> bool {
        self.pending_remove.contains(&id)
    }

    /// Merge queued adds, then queued removals. Returns the removed entries so
    /// the caller decides where they are dropped.
    pub fn synchronize(&mut self) -> Vec<T> {
        if !self.pending_add.is_empty() {
            self.live.append(&mut self.pending_add);
        }

        let mut removed = Vec::new();
        if !self.pending_remove.is_empty() {
            let pending = std::mem::take(&mut self.pending_remove);
            let mut remaining = Vec::with_capacity(self.live.len());
            for (id, item) in self.live.drain(..) {
                if pending.contains(&id) {
                    removed.push(item);
                } else {
                    remaining.push((id, item));
                }
            }
            self.live = remaining;
        }
        removed
    }

    /// Drop every live and queued entry.
    pub fn clear(&mut self) {
        self.live.clear();
        self.pending_add.clear();
        self.pending_remove.clear();
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_add.is_empty() || !self.pending_remove.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &T)> {
        self.live.iter().map(|(id, item)| (*id, item))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntryId, &mut T)> {
        self.live.iter_mut().map(|(id, item)| (*id, item))
    }

    /// Move the live entries out for iteration without holding a borrow.
    pub(crate) fn take_live(&mut self) -> Vec<(EntryId, T)> {
        std::mem::take(&mut self.live)
    }

    pub(crate) fn restore_live(&mut self, mut live: Vec<(EntryId, T)>) {
        live.append(&mut self.live);
        self.live = live;
    }
}
