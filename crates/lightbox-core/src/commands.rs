use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    ATTR_LEVEL, ATTR_TEXT_ALIGN, ApplyError, AttrPatch, Document, ElementKind, ElementNode,
    ImageNode, MAX_HEADING_LEVEL, MIN_HEADING_LEVEL, Marks, Node, Point, Selection, TextAlign,
    TextNode, apply_op_to, clamp_to_char_boundary,
};
use crate::editor::EditorState;
use crate::normalize::child_path;
use crate::ops::{Op, Path, Transaction};

/// Every edit the toolbar and the keyboard can request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    ToggleBold,
    ToggleItalic,
    ToggleHeading { level: u8 },
    ToggleBulletList,
    ToggleOrderedList,
    ToggleBlockquote,
    ToggleAlign(TextAlign),
    SetLink { href: String },
    UnsetLink,
    InsertImage(ImageNode),
    InsertText(String),
    Undo,
    Redo,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ToggleBold => "toggle_bold",
            Command::ToggleItalic => "toggle_italic",
            Command::ToggleHeading { .. } => "toggle_heading",
            Command::ToggleBulletList => "toggle_bullet_list",
            Command::ToggleOrderedList => "toggle_ordered_list",
            Command::ToggleBlockquote => "toggle_blockquote",
            Command::ToggleAlign(_) => "toggle_align",
            Command::SetLink { .. } => "set_link",
            Command::UnsetLink => "unset_link",
            Command::InsertImage(_) => "insert_image",
            Command::InsertText(_) => "insert_text",
            Command::Undo => "undo",
            Command::Redo => "redo",
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("not an image file: {0}")]
    InvalidFileType(String),
    #[error("invalid command argument: {0}")]
    InvalidCommandArgument(String),
    #[error("history is empty")]
    EmptyHistory,
    #[error("failed to encode image: {0}")]
    EncodeFailure(String),
    #[error("an image upload is already in progress")]
    UploadInProgress,
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

fn invalid(message: impl Into<String>) -> CommandError {
    CommandError::InvalidCommandArgument(message.into())
}

/// What a command compiles to before it touches the state.
pub(crate) enum Step {
    Transaction(Transaction),
    StoredMarks(Option<Marks>),
}

pub(crate) fn compile(state: &EditorState, command: Command) -> Result<Step, CommandError> {
    let source = format!("command:{}", command.name());
    let tx = match command {
        Command::ToggleBold => {
            return toggle_bool_mark(state, |m| m.bold, |m, v| m.bold = v, source);
        }
        Command::ToggleItalic => {
            return toggle_bool_mark(state, |m| m.italic, |m, v| m.italic = v, source);
        }
        Command::ToggleHeading { level } => toggle_heading(state, level)?,
        Command::ToggleBulletList => toggle_list(state, ElementKind::BulletList)?,
        Command::ToggleOrderedList => toggle_list(state, ElementKind::OrderedList)?,
        Command::ToggleBlockquote => toggle_blockquote(state)?,
        Command::ToggleAlign(align) => toggle_align(state, align)?,
        Command::SetLink { href } => set_link(state, &href)?,
        Command::UnsetLink => unset_link(state)?,
        Command::InsertImage(image) => insert_image(state, image)?,
        Command::InsertText(text) => insert_text(state, &text)?,
        Command::Undo | Command::Redo => {
            return Err(invalid("history commands are not compiled"));
        }
    };
    Ok(Step::Transaction(tx.source(source)))
}

impl EditorState {
    /// Whether the toolbar button for `command` shows as pressed.
    pub fn is_active(&self, command: &Command) -> bool {
        let doc = self.doc();
        let focus_block = self
            .selection()
            .focus
            .path
            .split_last()
            .map(|(_, block)| block.to_vec())
            .unwrap_or_default();

        match command {
            Command::ToggleBold => self.marks_active(|m| m.bold),
            Command::ToggleItalic => self.marks_active(|m| m.italic),
            Command::ToggleHeading { level } => doc
                .element(&focus_block)
                .and_then(ElementNode::heading_level)
                == Some(*level),
            Command::ToggleBulletList | Command::ToggleOrderedList => {
                let kind = if *command == Command::ToggleBulletList {
                    ElementKind::BulletList
                } else {
                    ElementKind::OrderedList
                };
                nearest_ancestor(doc, &focus_block, |el| el.kind.is_list())
                    .and_then(|path| doc.element(&path))
                    .is_some_and(|el| el.kind == kind)
            }
            Command::ToggleBlockquote => {
                nearest_ancestor(doc, &focus_block, |el| el.kind == ElementKind::Blockquote)
                    .is_some()
            }
            Command::ToggleAlign(align) => doc
                .element(&focus_block)
                .is_some_and(|el| el.text_align() == Some(*align)),
            Command::SetLink { .. } | Command::UnsetLink => self.active_marks().link.is_some(),
            Command::InsertImage(_) | Command::InsertText(_) | Command::Undo | Command::Redo => {
                false
            }
        }
    }

    fn marks_active(&self, get: fn(&Marks) -> bool) -> bool {
        let sel = self.selection();
        if sel.is_collapsed() {
            return get(&self.active_marks());
        }
        selected_blocks(self.doc(), sel)
            .map(|blocks| all_selected_text_nodes_have_mark(&blocks, get))
            .unwrap_or(false)
    }
}

struct TextBlock<'a> {
    path: Path,
    el: &'a ElementNode,
}

fn text_blocks_in_order(doc: &Document) -> Vec<TextBlock<'_>> {
    fn walk<'a>(nodes: &'a [Node], path: &mut Vec<usize>, out: &mut Vec<TextBlock<'a>>) {
        for (ix, node) in nodes.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };

            path.push(ix);
            if el.kind.is_text_block() {
                out.push(TextBlock {
                    path: path.clone(),
                    el,
                });
            } else {
                walk(&el.children, path, out);
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

fn inline_len(node: &Node) -> usize {
    match node {
        Node::Text(t) => t.text.len(),
        Node::Image(_) => 1,
        Node::Element(_) => 0,
    }
}

fn total_inline_len(children: &[Node]) -> usize {
    children.iter().map(inline_len).sum()
}

fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    let mut global = 0usize;
    for (ix, node) in children.iter().enumerate() {
        if ix < child_ix {
            global += inline_len(node);
            continue;
        }
        global += match node {
            Node::Text(t) => clamp_to_char_boundary(&t.text, offset),
            _ => offset.min(inline_len(node)),
        };
        break;
    }
    global
}

fn point_for_global_offset(block_path: &[usize], children: &[Node], global_offset: usize) -> Point {
    let mut remaining = global_offset;
    for (child_ix, node) in children.iter().enumerate() {
        match node {
            Node::Text(t) => {
                if remaining < t.text.len() {
                    return Point::new(
                        child_path(block_path, child_ix),
                        clamp_to_char_boundary(&t.text, remaining),
                    );
                }
                if remaining == t.text.len() {
                    if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                        return Point::new(child_path(block_path, child_ix + 1), 0);
                    }
                    return Point::new(child_path(block_path, child_ix), t.text.len());
                }
                remaining -= t.text.len();
            }
            Node::Image(_) => {
                if remaining == 0 {
                    if let Some(point) = text_before(block_path, children, child_ix) {
                        return point;
                    }
                }
                if remaining <= 1 {
                    if let Some(point) = text_after(block_path, children, child_ix) {
                        return point;
                    }
                }
                remaining = remaining.saturating_sub(1);
            }
            Node::Element(_) => {}
        }
    }

    text_before(block_path, children, children.len())
        .unwrap_or_else(|| Point::new(child_path(block_path, 0), 0))
}

fn text_before(block_path: &[usize], children: &[Node], ix: usize) -> Option<Point> {
    children
        .iter()
        .enumerate()
        .take(ix)
        .rev()
        .find_map(|(ix, node)| match node {
            Node::Text(t) => Some(Point::new(child_path(block_path, ix), t.text.len())),
            _ => None,
        })
}

fn text_after(block_path: &[usize], children: &[Node], ix: usize) -> Option<Point> {
    children
        .iter()
        .enumerate()
        .skip(ix + 1)
        .find_map(|(ix, node)| match node {
            Node::Text(_) => Some(Point::new(child_path(block_path, ix), 0)),
            _ => None,
        })
}

fn is_point_in_block(point: &Point, block_path: &[usize]) -> bool {
    point.path.len() == block_path.len() + 1 && point.path.starts_with(block_path)
}

/// A selected text block with the selected inline range in global offsets.
struct BlockRange<'a> {
    block: TextBlock<'a>,
    start: usize,
    end: usize,
}

fn block_path_of(point: &Point) -> Result<Path, CommandError> {
    point
        .path
        .split_last()
        .map(|(_, block)| block.to_vec())
        .ok_or_else(|| invalid("selection is not in a text block"))
}

fn selected_blocks<'a>(
    doc: &'a Document,
    sel: &Selection,
) -> Result<Vec<BlockRange<'a>>, CommandError> {
    let (start, end) = sel.ordered();
    let start_block_path = block_path_of(&start)?;
    let end_block_path = block_path_of(&end)?;

    let blocks = text_blocks_in_order(doc);
    let start_index = blocks
        .iter()
        .position(|b| b.path == start_block_path)
        .ok_or_else(|| invalid("selection start is not in a text block"))?;
    let end_index = blocks
        .iter()
        .position(|b| b.path == end_block_path)
        .ok_or_else(|| invalid("selection end is not in a text block"))?;
    let (start_index, end_index) = if start_index <= end_index {
        (start_index, end_index)
    } else {
        (end_index, start_index)
    };

    let start_inline_ix = start.path.last().copied().unwrap_or(0);
    let end_inline_ix = end.path.last().copied().unwrap_or(0);

    Ok(blocks
        .into_iter()
        .enumerate()
        .take(end_index + 1)
        .skip(start_index)
        .map(|(block_index, block)| {
            let children = block.el.children.as_slice();
            let start_global = if block_index == start_index {
                point_global_offset(children, start_inline_ix, start.offset)
            } else {
                0
            };
            let end_global = if block_index == end_index {
                point_global_offset(children, end_inline_ix, end.offset)
            } else {
                total_inline_len(children)
            };
            BlockRange {
                block,
                start: start_global,
                end: end_global,
            }
        })
        .collect())
}

fn all_selected_text_nodes_have_mark(blocks: &[BlockRange<'_>], get: fn(&Marks) -> bool) -> bool {
    for range in blocks {
        if range.start >= range.end {
            continue;
        }
        let mut cursor = 0usize;
        for node in &range.block.el.children {
            let node_start = cursor;
            cursor += inline_len(node);
            if range.end <= node_start || range.start >= cursor {
                continue;
            }
            if let Node::Text(t) = node {
                if !get(&t.marks) {
                    return false;
                }
            }
        }
    }
    true
}

fn apply_marks_in_block(
    children: &[Node],
    start_global: usize,
    end_global: usize,
    apply: &dyn Fn(Marks) -> Marks,
) -> Vec<Node> {
    if start_global >= end_global {
        return children.to_vec();
    }

    let mut out: Vec<Node> = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(t) = node else {
            cursor += inline_len(node);
            out.push(node.clone());
            continue;
        };

        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end_global <= node_start || start_global >= node_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = clamp_to_char_boundary(&t.text, start_global.saturating_sub(node_start));
        let sel_end = clamp_to_char_boundary(&t.text, end_global.saturating_sub(node_start));

        if sel_start == 0 && sel_end == t.text.len() {
            let mut next = t.clone();
            next.marks = apply(next.marks);
            out.push(Node::Text(next));
            continue;
        }

        let pieces = [
            (t.text.get(..sel_start).unwrap_or(""), t.marks.clone()),
            (t.text.get(sel_start..sel_end).unwrap_or(""), apply(t.marks.clone())),
            (t.text.get(sel_end..).unwrap_or(""), t.marks.clone()),
        ];
        for (text, marks) in pieces {
            if !text.is_empty() {
                out.push(Node::marked_text(text, marks));
            }
        }
    }

    if out.is_empty() {
        out.push(Node::text(""));
    }
    out
}

/// Replaces the inline children of `block_path` wholesale.
fn replace_children_ops(block_path: &[usize], old_len: usize, children: Vec<Node>) -> Vec<Op> {
    let mut ops: Vec<Op> = (0..old_len)
        .rev()
        .map(|ix| Op::RemoveNode {
            path: child_path(block_path, ix),
        })
        .collect();
    ops.extend(children.into_iter().enumerate().map(|(ix, node)| Op::InsertNode {
        path: child_path(block_path, ix),
        node,
    }));
    ops
}

fn apply_mark_range(
    blocks: &[BlockRange<'_>],
    sel: &Selection,
    apply: &dyn Fn(Marks) -> Marks,
) -> Transaction {
    let mut ops: Vec<Op> = Vec::new();
    let mut new_anchor = sel.anchor.clone();
    let mut new_focus = sel.focus.clone();

    for range in blocks {
        if range.start >= range.end {
            continue;
        }
        let block_path = &range.block.path;
        let children = range.block.el.children.as_slice();
        let new_children = apply_marks_in_block(children, range.start, range.end, apply);

        for point in [&mut new_anchor, &mut new_focus] {
            if is_point_in_block(point, block_path) {
                let global = point_global_offset(
                    children,
                    point.path.last().copied().unwrap_or(0),
                    point.offset,
                );
                *point = point_for_global_offset(block_path, &new_children, global);
            }
        }

        ops.extend(replace_children_ops(block_path, children.len(), new_children));
    }

    Transaction::new(ops).selection_after(Selection {
        anchor: new_anchor,
        focus: new_focus,
    })
}

fn caret_leaf<'a>(doc: &'a Document, point: &Point) -> Result<&'a TextNode, CommandError> {
    match doc.node(&point.path) {
        Some(Node::Text(text)) => Ok(text),
        _ => Err(invalid("selection is not in a text node")),
    }
}

fn toggle_bool_mark(
    state: &EditorState,
    get: fn(&Marks) -> bool,
    set: fn(&mut Marks, bool),
    source: String,
) -> Result<Step, CommandError> {
    let sel = state.selection();
    if sel.is_collapsed() {
        let leaf_marks = caret_leaf(state.doc(), &sel.focus)?.marks.clone();
        let mut next = state.active_marks();
        let target = !get(&next);
        set(&mut next, target);
        return Ok(Step::StoredMarks((next != leaf_marks).then_some(next)));
    }

    let blocks = selected_blocks(state.doc(), sel)?;
    let target = !all_selected_text_nodes_have_mark(&blocks, get);
    let tx = apply_mark_range(&blocks, sel, &|mut marks: Marks| {
        set(&mut marks, target);
        marks
    });
    Ok(Step::Transaction(tx.source(source)))
}

fn set_link(state: &EditorState, href: &str) -> Result<Transaction, CommandError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(invalid("link href must not be empty"));
    }
    let sel = state.selection();
    if sel.is_collapsed() {
        return Err(invalid("select the text to link first"));
    }

    let blocks = selected_blocks(state.doc(), sel)?;
    Ok(apply_mark_range(&blocks, sel, &|mut marks: Marks| {
        marks.link = Some(href.to_string());
        marks
    }))
}

fn unset_link(state: &EditorState) -> Result<Transaction, CommandError> {
    let sel = state.selection();
    if !sel.is_collapsed() {
        let blocks = selected_blocks(state.doc(), sel)?;
        return Ok(apply_mark_range(&blocks, sel, &|mut marks: Marks| {
            marks.link = None;
            marks
        }));
    }

    // A collapsed caret clears the whole link it sits in, which may span
    // several leaves with different bold/italic marks.
    let leaf = caret_leaf(state.doc(), &sel.focus)?;
    let Some(href) = leaf.marks.link.as_deref() else {
        return Ok(Transaction::new(Vec::new()));
    };
    let (&caret_ix, block_path) = sel
        .focus
        .path
        .split_last()
        .ok_or_else(|| invalid("selection is not in a text node"))?;
    let siblings = state
        .doc()
        .children_at(block_path)
        .ok_or_else(|| invalid("selection is not in a text block"))?;

    let linked = |ix: usize| match siblings.get(ix) {
        Some(Node::Text(t)) if t.marks.link.as_deref() == Some(href) => Some(t),
        _ => None,
    };
    let mut first = caret_ix;
    while first > 0 && linked(first - 1).is_some() {
        first -= 1;
    }

    let mut ops = Vec::new();
    let mut ix = first;
    while let Some(text) = linked(ix) {
        let mut marks = text.marks.clone();
        marks.link = None;
        ops.push(Op::SetTextMarks {
            path: child_path(block_path, ix),
            marks,
        });
        ix += 1;
    }
    Ok(Transaction::new(ops).selection_after(sel.clone()))
}

fn toggle_heading(state: &EditorState, level: u8) -> Result<Transaction, CommandError> {
    if !(MIN_HEADING_LEVEL..=MAX_HEADING_LEVEL).contains(&level) {
        return Err(invalid(format!(
            "heading level {level} is outside {MIN_HEADING_LEVEL}..={MAX_HEADING_LEVEL}"
        )));
    }

    let sel = state.selection();
    let blocks = selected_blocks(state.doc(), sel)?;
    let all_set = blocks
        .iter()
        .all(|range| range.block.el.heading_level() == Some(level));

    let mut ops = Vec::new();
    for range in &blocks {
        let mut el = range.block.el.clone();
        if all_set {
            el.kind = ElementKind::Paragraph;
            el.attrs.remove(ATTR_LEVEL);
        } else {
            if el.heading_level() == Some(level) {
                continue;
            }
            el.kind = ElementKind::Heading;
            el.attrs
                .insert(ATTR_LEVEL.to_string(), u64::from(level).into());
        }
        ops.push(Op::RemoveNode {
            path: range.block.path.clone(),
        });
        ops.push(Op::InsertNode {
            path: range.block.path.clone(),
            node: Node::Element(el),
        });
    }

    Ok(Transaction::new(ops).selection_after(sel.clone()))
}

fn toggle_align(state: &EditorState, align: TextAlign) -> Result<Transaction, CommandError> {
    let blocks = selected_blocks(state.doc(), state.selection())?;
    let all_set = blocks
        .iter()
        .all(|range| range.block.el.text_align() == Some(align));

    let ops = blocks
        .iter()
        .filter(|range| all_set || range.block.el.text_align() != Some(align))
        .map(|range| Op::SetNodeAttrs {
            path: range.block.path.clone(),
            patch: if all_set {
                AttrPatch::remove(ATTR_TEXT_ALIGN)
            } else {
                AttrPatch::set(ATTR_TEXT_ALIGN, align.as_str().into())
            },
        })
        .collect();
    Ok(Transaction::new(ops))
}

fn nearest_ancestor(
    doc: &Document,
    path: &[usize],
    pred: impl Fn(&ElementNode) -> bool,
) -> Option<Path> {
    (1..path.len())
        .rev()
        .map(|len| &path[..len])
        .find(|ancestor| doc.element(ancestor).is_some_and(&pred))
        .map(<[usize]>::to_vec)
}

/// The sibling blocks covering both selection ends, one level above any list
/// they would otherwise sit directly inside.
fn sibling_range(doc: &Document, start: &[usize], end: &[usize]) -> Option<(Path, usize, usize)> {
    let common = start.iter().zip(end).take_while(|(a, b)| a == b).count();
    let depth = common.min(start.len().checked_sub(1)?).min(end.len().checked_sub(1)?);

    let mut parent = start[..depth].to_vec();
    let mut first = start[depth];
    let mut last = end[depth];
    loop {
        let in_list = doc.element(&parent).is_some_and(|el| el.kind.is_list());
        if !in_list {
            break;
        }
        let (&ix, up) = parent.split_last()?;
        first = ix;
        last = ix;
        parent = up.to_vec();
    }
    Some((parent, first, last))
}

fn wrap_siblings_ops(
    doc: &Document,
    parent: &[usize],
    first: usize,
    last: usize,
    wrap: impl FnOnce(Vec<Node>) -> Node,
) -> Result<Vec<Op>, CommandError> {
    let siblings = doc
        .children_at(parent)
        .and_then(|children| children.get(first..=last))
        .ok_or_else(|| invalid("selection does not cover sibling blocks"))?;

    let mut ops: Vec<Op> = (first..=last)
        .rev()
        .map(|ix| Op::RemoveNode {
            path: child_path(parent, ix),
        })
        .collect();
    ops.push(Op::InsertNode {
        path: child_path(parent, first),
        node: wrap(siblings.to_vec()),
    });
    Ok(ops)
}

fn replace_node_ops(path: &[usize], replacement: Vec<Node>) -> Vec<Op> {
    let Some((&ix, parent)) = path.split_last() else {
        return Vec::new();
    };
    let mut ops = vec![Op::RemoveNode {
        path: path.to_vec(),
    }];
    ops.extend(replacement.into_iter().enumerate().map(|(offset, node)| Op::InsertNode {
        path: child_path(parent, ix + offset),
        node,
    }));
    ops
}

fn text_leaf_paths(doc: &Document) -> Vec<Path> {
    fn walk(children: &[Node], path: &mut Vec<usize>, out: &mut Vec<Path>) {
        for (ix, node) in children.iter().enumerate() {
            path.push(ix);
            match node {
                Node::Text(_) => out.push(path.clone()),
                Node::Element(el) => walk(&el.children, path, out),
                Node::Image(_) => {}
            }
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(&doc.children, &mut Vec::new(), &mut out);
    out
}

/// Builds a transaction for ops that move blocks around without touching any
/// text leaf. Points follow their leaf by its position in document order.
fn structural_tx(state: &EditorState, ops: Vec<Op>) -> Result<Transaction, CommandError> {
    let mut preview = state.doc().clone();
    let mut scratch = state.selection().clone();
    for op in ops.iter().cloned() {
        apply_op_to(&mut preview, &mut scratch, op)?;
    }

    let before = text_leaf_paths(state.doc());
    let after = text_leaf_paths(&preview);
    let remap = |point: &Point| {
        before
            .iter()
            .position(|path| *path == point.path)
            .and_then(|ordinal| after.get(ordinal))
            .map(|path| Point::new(path.clone(), point.offset))
            .unwrap_or_else(|| point.clone())
    };

    let sel = state.selection();
    Ok(Transaction::new(ops).selection_after(Selection::new(
        remap(&sel.anchor),
        remap(&sel.focus),
    )))
}

fn toggle_list(state: &EditorState, kind: ElementKind) -> Result<Transaction, CommandError> {
    let doc = state.doc();
    let (start, end) = state.selection().ordered();
    let start_block = block_path_of(&start)?;
    let end_block = block_path_of(&end)?;

    let Some(list_path) = nearest_ancestor(doc, &start_block, |el| el.kind.is_list()) else {
        let (parent, first, last) = sibling_range(doc, &start_block, &end_block)
            .ok_or_else(|| invalid("selection is not in a block"))?;
        let ops = wrap_siblings_ops(doc, &parent, first, last, |blocks| {
            Node::element(
                kind,
                blocks
                    .into_iter()
                    .map(|block| Node::list_item(vec![block]))
                    .collect(),
            )
        })?;
        return structural_tx(state, ops);
    };

    let list = doc
        .element(&list_path)
        .ok_or_else(|| invalid("list not found"))?;

    if list.kind != kind {
        let mut switched = list.clone();
        switched.kind = kind;
        return structural_tx(state, replace_node_ops(&list_path, vec![Node::Element(switched)]));
    }

    let depth = list_path.len();
    let first = start_block[depth];
    let last = if end_block.len() > depth && end_block.starts_with(&list_path) {
        end_block[depth]
    } else {
        list.children.len().saturating_sub(1)
    };
    let last = last.max(first).min(list.children.len().saturating_sub(1));

    let remainder = |items: &[Node]| {
        (!items.is_empty()).then(|| {
            Node::Element(ElementNode {
                kind: list.kind,
                attrs: list.attrs.clone(),
                children: items.to_vec(),
            })
        })
    };

    let mut replacement: Vec<Node> = Vec::new();
    replacement.extend(remainder(&list.children[..first]));
    for item in &list.children[first..=last] {
        match item {
            Node::Element(li) if li.kind == ElementKind::ListItem => {
                replacement.extend(li.children.iter().cloned());
            }
            other => replacement.push(other.clone()),
        }
    }
    replacement.extend(remainder(&list.children[last + 1..]));

    structural_tx(state, replace_node_ops(&list_path, replacement))
}

fn toggle_blockquote(state: &EditorState) -> Result<Transaction, CommandError> {
    let doc = state.doc();
    let (start, end) = state.selection().ordered();
    let start_block = block_path_of(&start)?;
    let end_block = block_path_of(&end)?;

    if let Some(quote_path) =
        nearest_ancestor(doc, &start_block, |el| el.kind == ElementKind::Blockquote)
    {
        let quote = doc
            .element(&quote_path)
            .ok_or_else(|| invalid("blockquote not found"))?;
        return structural_tx(state, replace_node_ops(&quote_path, quote.children.clone()));
    }

    let (parent, first, last) = sibling_range(doc, &start_block, &end_block)
        .ok_or_else(|| invalid("selection is not in a block"))?;
    let ops = wrap_siblings_ops(doc, &parent, first, last, Node::blockquote)?;
    structural_tx(state, ops)
}

/// Splits the caret leaf and places `image` between the halves. The caret ends
/// up right after the image.
fn insert_image(state: &EditorState, image: ImageNode) -> Result<Transaction, CommandError> {
    if image.src.trim().is_empty() {
        return Err(invalid("image source must not be empty"));
    }

    let (_, caret) = state.selection().ordered();
    let text = caret_leaf(state.doc(), &caret)?;
    let (&child_ix, block_path) = caret
        .path
        .split_last()
        .ok_or_else(|| invalid("selection is not in a text node"))?;

    let cursor = clamp_to_char_boundary(&text.text, caret.offset);
    let left = text.text.get(..cursor).unwrap_or("");
    let right = text.text.get(cursor..).unwrap_or("");

    let mut replacement: Vec<Node> = Vec::new();
    if !left.is_empty() {
        replacement.push(Node::marked_text(left, text.marks.clone()));
    }
    let image_ix = child_ix + replacement.len();
    replacement.push(Node::Image(image));
    replacement.push(Node::marked_text(right, text.marks.clone()));

    let mut ops = vec![Op::RemoveNode {
        path: caret.path.clone(),
    }];
    for (offset, node) in replacement.into_iter().enumerate() {
        ops.push(Op::InsertNode {
            path: child_path(block_path, child_ix + offset),
            node,
        });
    }

    let selection_after = Selection::collapsed(Point::new(child_path(block_path, image_ix + 1), 0));
    Ok(Transaction::new(ops).selection_after(selection_after))
}

/// Inline nodes covering `[from, to)` of a block, with text cut at the edges.
fn slice_inline(children: &[Node], from: usize, to: usize) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = 0usize;
    for node in children {
        let node_start = cursor;
        cursor += inline_len(node);
        match node {
            Node::Text(t) => {
                let a = clamp_to_char_boundary(&t.text, from.max(node_start) - node_start);
                let b = clamp_to_char_boundary(&t.text, to.min(cursor).saturating_sub(node_start));
                if a < b {
                    out.push(Node::marked_text(&t.text[a..b], t.marks.clone()));
                }
            }
            Node::Image(_) => {
                if node_start >= from && cursor <= to {
                    out.push(node.clone());
                }
            }
            Node::Element(_) => {}
        }
    }
    out
}

fn insert_text(state: &EditorState, text: &str) -> Result<Transaction, CommandError> {
    if text.is_empty() {
        return Ok(Transaction::new(Vec::new()));
    }

    let sel = state.selection();
    let (start, _) = sel.ordered();
    let leaf = caret_leaf(state.doc(), &start)?;
    let marks = state
        .stored_marks()
        .cloned()
        .unwrap_or_else(|| leaf.marks.clone());

    if sel.is_collapsed() && marks == leaf.marks {
        let offset = clamp_to_char_boundary(&leaf.text, start.offset);
        let caret = Point::new(start.path.clone(), offset + text.len());
        return Ok(Transaction::new(vec![Op::InsertText {
            path: start.path.clone(),
            offset,
            text: text.to_string(),
        }])
        .selection_after(Selection::collapsed(caret)));
    }

    let blocks = selected_blocks(state.doc(), sel)?;
    let [range] = blocks.as_slice() else {
        return Err(invalid("replacing text across blocks is not supported"));
    };

    let children = range.block.el.children.as_slice();
    let mut new_children = slice_inline(children, 0, range.start);
    let inserted_ix = new_children.len();
    new_children.push(Node::marked_text(text, marks));
    new_children.extend(slice_inline(children, range.end, total_inline_len(children)));

    let block_path = &range.block.path;
    let caret = Point::new(child_path(block_path, inserted_ix), text.len());
    Ok(
        Transaction::new(replace_children_ops(block_path, children.len(), new_children))
            .selection_after(Selection::collapsed(caret)),
    )
}
