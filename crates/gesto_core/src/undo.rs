//! Undo history
//!
//! Completed undoable commands are pushed on an [`UndoHistory`]. Undoing
//! moves the entry to the redo stack; adding a new entry clears it. The undo
//! stack is bounded, the oldest entries are dropped first.

use crate::error::CommandError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Default bound of the undo stack
pub const DEFAULT_SIZE_MAX: usize = 30;

/// Something that can be undone and redone
pub trait Undoable {
    fn undo(&mut self) -> Result<(), CommandError>;

    fn redo(&mut self) -> Result<(), CommandError>;

    /// Label shown in undo/redo menus
    fn undo_name(&self) -> String;
}

/// History shared between bindings
pub type SharedHistory = Rc<RefCell<UndoHistory>>;

/// Bounded undo and redo stacks
pub struct UndoHistory {
    /// Most recent entry at the front
    undo: VecDeque<Box<dyn Undoable>>,
    redo: VecDeque<Box<dyn Undoable>>,
    size_max: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoHistory {
    pub fn new() -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            size_max: DEFAULT_SIZE_MAX,
        }
    }

    /// Create a history ready to be shared between bindings
    pub fn shared() -> SharedHistory {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Push a completed entry and clear the redo stack
    ///
    /// Ignored when the bound is zero.
    pub fn add(&mut self, undoable: Box<dyn Undoable>) {
        if self.size_max == 0 {
            return;
        }
        if self.undo.len() == self.size_max {
            self.undo.pop_back();
        }
        tracing::debug!(target: "gesto::command", entry = %undoable.undo_name(), "undoable registered");
        self.undo.push_front(undoable);
        self.redo.clear();
    }

    /// Undo the last entry
    ///
    /// Returns false when there is nothing to undo. A failing entry stays on
    /// the undo stack.
    pub fn undo(&mut self) -> Result<bool, CommandError> {
        let Some(mut entry) = self.undo.pop_front() else {
            return Ok(false);
        };
        if let Err(err) = entry.undo() {
            self.undo.push_front(entry);
            return Err(err);
        }
        self.redo.push_front(entry);
        Ok(true)
    }

    /// Redo the last undone entry
    pub fn redo(&mut self) -> Result<bool, CommandError> {
        let Some(mut entry) = self.redo.pop_front() else {
            return Ok(false);
        };
        if let Err(err) = entry.redo() {
            self.redo.push_front(entry);
            return Err(err);
        }
        self.undo.push_front(entry);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn last_undo_name(&self) -> Option<String> {
        self.undo.front().map(|entry| entry.undo_name())
    }

    pub fn last_redo_name(&self) -> Option<String> {
        self.redo.front().map(|entry| entry.undo_name())
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn size_max(&self) -> usize {
        self.size_max
    }

    /// Change the bound, dropping the oldest entries above it
    pub fn set_size_max(&mut self, size_max: usize) {
        self.undo.truncate(size_max);
        self.size_max = size_max;
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl fmt::Debug for UndoHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoHistory")
            .field("undo", &self.undo.len())
            .field("redo", &self.redo.len())
            .field("size_max", &self.size_max)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entry {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        fail_undo: bool,
    }

    impl Entry {
        fn boxed(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Box<dyn Undoable> {
            Box::new(Entry {
                name,
                log: log.clone(),
                fail_undo: false,
            })
        }
    }

    impl Undoable for Entry {
        fn undo(&mut self) -> Result<(), CommandError> {
            if self.fail_undo {
                return Err(CommandError::new(self.name, "cannot undo"));
            }
            self.log.borrow_mut().push(format!("undo {}", self.name));
            Ok(())
        }

        fn redo(&mut self) -> Result<(), CommandError> {
            self.log.borrow_mut().push(format!("redo {}", self.name));
            Ok(())
        }

        fn undo_name(&self) -> String {
            self.name.to_string()
        }
    }

    #[test]
    fn test_undo_redo() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut history = UndoHistory::new();
        history.add(Entry::boxed("a", &log));
        history.add(Entry::boxed("b", &log));

        assert_eq!(history.last_undo_name().as_deref(), Some("b"));
        assert!(history.undo().unwrap());
        assert_eq!(history.last_redo_name().as_deref(), Some("b"));
        assert!(history.redo().unwrap());
        assert!(!history.can_redo());

        assert_eq!(*log.borrow(), vec!["undo b", "redo b"]);
    }

    #[test]
    fn test_add_clears_redo() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut history = UndoHistory::new();
        history.add(Entry::boxed("a", &log));
        history.undo().unwrap();
        assert!(history.can_redo());

        history.add(Entry::boxed("b", &log));
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_bound_drops_oldest() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut history = UndoHistory::new();
        history.set_size_max(2);
        for name in ["a", "b", "c"] {
            history.add(Entry::boxed(name, &log));
        }
        assert_eq!(history.undo_len(), 2);

        history.set_size_max(1);
        assert_eq!(history.last_undo_name().as_deref(), Some("c"));
        assert_eq!(history.undo_len(), 1);

        history.set_size_max(0);
        history.add(Entry::boxed("d", &log));
        assert!(!history.can_undo());
    }

    #[test]
    fn test_failed_undo_keeps_entry() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut history = UndoHistory::new();
        history.add(Box::new(Entry {
            name: "stuck",
            log: log.clone(),
            fail_undo: true,
        }));

        assert!(history.undo().is_err());
        assert!(history.can_undo());
        assert!(!history.can_redo());
        assert!(!UndoHistory::new().undo().unwrap());
    }
}
