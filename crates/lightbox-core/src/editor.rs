use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::commands::{self, Command, CommandError, Step};
use crate::core::{ApplyError, Document, Marks, Node, Point, Selection, apply_op_to};
use crate::history::{History, UndoRecord};
use crate::html;
use crate::normalize::{first_text_point, normalize_selection, normalize_with_inverse_ops};
use crate::ops::{Op, Transaction};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_normalize_iterations: usize,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_normalize_iterations == 0 {
            self.max_normalize_iterations = 100;
        }
        self
    }
}

/// Document, selection, undo history and the marks pending at a collapsed
/// caret. Every change goes through [`EditorState::apply`].
#[derive(Debug, Clone)]
pub struct EditorState {
    doc: Document,
    selection: Selection,
    stored_marks: Option<Marks>,
    history: History,
    config: EditorConfig,
}

impl Default for EditorState {
    fn default() -> Self {
        let config = EditorConfig::default().with_defaults();
        Self {
            doc: Document::empty(),
            selection: Selection::collapsed(Point::new(vec![0, 0], 0)),
            stored_marks: None,
            history: History::new(config.max_undo),
            config,
        }
    }
}

impl EditorState {
    /// Normalizes `doc` and places the caret at its first text leaf.
    pub fn new(mut doc: Document, config: EditorConfig) -> Result<Self, ApplyError> {
        let config = config.with_defaults();
        let mut selection = Selection::collapsed(Point::new(vec![0, 0], 0));
        normalize_with_inverse_ops(&mut doc, &mut selection, config.max_normalize_iterations)?;
        let caret = first_text_point(&doc).unwrap_or(Point::new(vec![0, 0], 0));
        Ok(Self {
            doc,
            selection: Selection::collapsed(caret),
            stored_marks: None,
            history: History::new(config.max_undo),
            config,
        })
    }

    pub fn from_html(input: &str, config: EditorConfig) -> Result<Self, ApplyError> {
        let config = config.with_defaults();
        let doc = html::parse_with_limit(input, config.max_normalize_iterations)?;
        Self::new(doc, config)
    }

    pub fn to_html(&self) -> String {
        html::serialize(&self.doc)
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn stored_marks(&self) -> Option<&Marks> {
        self.stored_marks.as_ref()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Marks the next typed text would carry.
    pub fn active_marks(&self) -> Marks {
        if let Some(marks) = &self.stored_marks {
            return marks.clone();
        }
        match self.doc.node(&self.selection.focus.path) {
            Some(Node::Text(text)) => text.marks.clone(),
            _ => Marks::default(),
        }
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = normalize_selection(&self.doc, &selection);
        self.stored_marks = None;
    }

    pub fn select(&mut self, anchor: Point, focus: Point) {
        self.set_selection(Selection::new(anchor, focus));
    }

    pub fn apply(&mut self, command: Command) -> Result<(), CommandError> {
        let name = command.name();
        let result = self.dispatch(command);
        match &result {
            Ok(()) => debug!(
                command = name,
                undo_depth = self.history.undo_depth(),
                "command applied"
            ),
            Err(err) => warn!(command = name, %err, "command rejected"),
        }
        result
    }

    fn dispatch(&mut self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::Undo => self.undo(),
            Command::Redo => self.redo(),
            command => match commands::compile(self, command)? {
                Step::Transaction(tx) => self.apply_transaction(tx).map_err(CommandError::from),
                Step::StoredMarks(marks) => {
                    self.stored_marks = marks;
                    Ok(())
                }
            },
        }
    }

    /// Applies `tx` atomically as one history step. Ops run against a staged
    /// copy; the state is replaced only when every op and normalization succeed.
    pub fn apply_transaction(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        if tx.is_empty() {
            return Ok(());
        }

        let selection_before = self.selection.clone();
        let mut doc = self.doc.clone();
        let mut selection = self.selection.clone();

        let mut inverse_ops: Vec<Op> = Vec::new();
        for op in tx.ops {
            inverse_ops.push(apply_op_to(&mut doc, &mut selection, op)?);
        }

        if let Some(sel) = tx.selection_after {
            selection = sel;
        }

        let mut inverse_normalize = normalize_with_inverse_ops(
            &mut doc,
            &mut selection,
            self.config.max_normalize_iterations,
        )?;
        inverse_ops.append(&mut inverse_normalize);
        inverse_ops.reverse();

        let selection = normalize_selection(&doc, &selection);
        if doc == self.doc {
            self.selection = selection;
            return Ok(());
        }

        debug!(
            source = tx.meta.source.as_deref().unwrap_or("unknown"),
            ops = inverse_ops.len(),
            "transaction committed"
        );

        self.doc = doc;
        self.selection = selection.clone();
        self.stored_marks = None;
        self.history.record(UndoRecord {
            inverse_ops,
            selection_before,
            selection_after: selection,
        });
        Ok(())
    }

    fn undo(&mut self) -> Result<(), CommandError> {
        let Some(record) = self.history.pop_undo() else {
            return Err(CommandError::EmptyHistory);
        };

        match self.replay(&record.inverse_ops, &record.selection_before) {
            Ok(redo_ops) => {
                debug!(ops = redo_ops.len(), "undo");
                self.history.push_future(UndoRecord {
                    inverse_ops: redo_ops,
                    selection_before: record.selection_before,
                    selection_after: record.selection_after,
                });
                Ok(())
            }
            Err(err) => {
                self.history.push_past(record);
                Err(err.into())
            }
        }
    }

    fn redo(&mut self) -> Result<(), CommandError> {
        let Some(record) = self.history.pop_redo() else {
            return Err(CommandError::EmptyHistory);
        };

        match self.replay(&record.inverse_ops, &record.selection_after) {
            Ok(undo_ops) => {
                debug!(ops = undo_ops.len(), "redo");
                self.history.push_past(UndoRecord {
                    inverse_ops: undo_ops,
                    selection_before: record.selection_before,
                    selection_after: record.selection_after,
                });
                Ok(())
            }
            Err(err) => {
                self.history.push_future(record);
                Err(err.into())
            }
        }
    }

    /// Runs recorded ops against a staged copy and commits it, returning the
    /// ops that reverse the replay.
    fn replay(&mut self, ops: &[Op], selection: &Selection) -> Result<Vec<Op>, ApplyError> {
        let mut doc = self.doc.clone();
        let mut scratch = self.selection.clone();

        let mut reverse_ops: Vec<Op> = Vec::new();
        for op in ops.iter().cloned() {
            reverse_ops.push(apply_op_to(&mut doc, &mut scratch, op)?);
        }
        reverse_ops.reverse();

        self.selection = normalize_selection(&doc, selection);
        self.doc = doc;
        self.stored_marks = None;
        Ok(reverse_ops)
    }
}
