use crate::core::Selection;
use crate::ops::Op;

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

/// Two bounded stacks of inverse-op records. The oldest entry of `past` is
/// dropped once `limit` is exceeded.
#[derive(Debug, Clone)]
pub struct History {
    past: Vec<UndoRecord>,
    future: Vec<UndoRecord>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            past: Vec::new(),
            future: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.past.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.future.len()
    }

    /// Records a fresh edit. Anything that could have been redone is gone.
    pub(crate) fn record(&mut self, record: UndoRecord) {
        self.future.clear();
        self.push_past(record);
    }

    pub(crate) fn pop_undo(&mut self) -> Option<UndoRecord> {
        self.past.pop()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<UndoRecord> {
        self.future.pop()
    }

    pub(crate) fn push_past(&mut self, record: UndoRecord) {
        self.past.push(record);
        if self.past.len() > self.limit {
            self.past.remove(0);
        }
    }

    pub(crate) fn push_future(&mut self, record: UndoRecord) {
        self.future.push(record);
    }
}
