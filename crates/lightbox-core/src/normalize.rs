use crate::core::{
    ATTR_LEVEL, ATTR_TEXT_ALIGN, ApplyError, AttrPatch, Attrs, Document, ElementKind,
    ElementNode, MAX_HEADING_LEVEL, MIN_HEADING_LEVEL, Marks, Node, Point, Selection, TextAlign,
    TextNode, apply_op_to,
};
use crate::ops::{Op, Path};

/// One structural rule. A pass inspects the document and returns the ops that
/// repair every violation it can fix without invalidating its own paths.
pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document) -> Vec<Op>;
}

static PASSES: [&dyn NormalizePass; 7] = [
    &EnsureNonEmptyDocument,
    &EnforceChildRoles,
    &EnsureNonEmptyContainers,
    &NormalizeHeadingLevels,
    &RestrictBlockAttrs,
    &ShapeInlineText,
    &MergeAdjacentTextLeaves,
];

pub fn passes() -> &'static [&'static dyn NormalizePass] {
    &PASSES
}

/// Ops of the first pass that still finds something to fix. Later passes may
/// assume every earlier rule already holds.
pub fn normalize_ops(doc: &Document) -> Vec<Op> {
    for pass in passes() {
        let ops = pass.run(doc);
        if !ops.is_empty() {
            tracing::trace!(pass = pass.id(), ops = ops.len(), "normalize pass");
            return ops;
        }
    }
    Vec::new()
}

pub fn is_normalized(doc: &Document) -> bool {
    normalize_ops(doc).is_empty()
}

/// Normalizes `doc` in place, returning the inverse ops in application order.
pub(crate) fn normalize_with_inverse_ops(
    doc: &mut Document,
    selection: &mut Selection,
    max_iterations: usize,
) -> Result<Vec<Op>, ApplyError> {
    let mut inverse_ops: Vec<Op> = Vec::new();
    for _ in 0..max_iterations {
        let ops = normalize_ops(doc);
        if ops.is_empty() {
            return Ok(inverse_ops);
        }
        for op in ops {
            let inv = apply_op_to(doc, selection, op)?;
            inverse_ops.push(inv);
        }
    }
    Err(ApplyError::NormalizeDidNotConverge)
}

pub fn normalize_document(doc: &mut Document, max_iterations: usize) -> Result<(), ApplyError> {
    let mut selection = Selection::collapsed(Point::new(vec![0, 0], 0));
    normalize_with_inverse_ops(doc, &mut selection, max_iterations).map(|_| ())
}

/// Moves both points of `selection` onto existing text leaves.
pub fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    let fallback = first_text_point(doc).unwrap_or(Point {
        path: vec![0],
        offset: 0,
    });

    let anchor = normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| {
        normalize_point_to_existing_text(doc, &selection.focus)
            .unwrap_or_else(|| fallback.clone())
    });
    let focus =
        normalize_point_to_existing_text(doc, &selection.focus).unwrap_or_else(|| anchor.clone());

    Selection { anchor, focus }
}

pub(crate) fn first_text_point(doc: &Document) -> Option<Point> {
    first_text_descendant(&doc.children, &mut Vec::new())
}

fn first_text_descendant(children: &[Node], path: &mut Vec<usize>) -> Option<Point> {
    for (ix, node) in children.iter().enumerate() {
        path.push(ix);
        match node {
            Node::Text(_) => {
                let point = Point::new(path.clone(), 0);
                path.pop();
                return Some(point);
            }
            Node::Element(el) => {
                if let Some(point) = first_text_descendant(&el.children, path) {
                    path.pop();
                    return Some(point);
                }
            }
            Node::Image(_) => {}
        }
        path.pop();
    }
    None
}

fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    if point.path.is_empty() || doc.children.is_empty() {
        return None;
    }

    let mut resolved_path: Vec<usize> = Vec::new();
    let mut children: &[Node] = &doc.children;

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point {
                    path: resolved_path,
                    offset: crate::core::clamp_to_char_boundary(&t.text, point.offset),
                });
            }
            Node::Element(el) => {
                children = &el.children;
            }
            Node::Image(_) => {
                return text_beside_image(children, &resolved_path);
            }
        }
    }

    match doc.node(&resolved_path)? {
        Node::Text(t) => Some(Point {
            path: resolved_path,
            offset: crate::core::clamp_to_char_boundary(&t.text, point.offset),
        }),
        Node::Element(el) => first_text_descendant(&el.children, &mut resolved_path),
        Node::Image(_) => None,
    }
}

fn text_beside_image(siblings: &[Node], image_path: &[usize]) -> Option<Point> {
    let (&ix, parent) = image_path.split_last()?;
    if let Some(Node::Text(_)) = siblings.get(ix + 1) {
        return Some(Point::new(child_path(parent, ix + 1), 0));
    }
    let prev = ix.checked_sub(1)?;
    match siblings.get(prev) {
        Some(Node::Text(t)) => Some(Point::new(child_path(parent, prev), t.text.len())),
        _ => None,
    }
}

pub(crate) fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ChildRole {
    Blocks,
    Inline,
    Items,
}

fn child_role(kind: Option<ElementKind>) -> ChildRole {
    match kind {
        None => ChildRole::Blocks,
        Some(kind) if kind.is_text_block() => ChildRole::Inline,
        Some(kind) if kind.is_list() => ChildRole::Items,
        Some(_) => ChildRole::Blocks,
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        if doc.children.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::paragraph(""),
            }];
        }
        Vec::new()
    }
}

/// Text blocks hold inline nodes, containers hold blocks, lists hold items.
struct EnforceChildRoles;

impl NormalizePass for EnforceChildRoles {
    fn id(&self) -> &'static str {
        "core.enforce_child_roles"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>, role: ChildRole, ops: &mut Vec<Op>) {
            let mut ix = children.len();
            while ix > 0 {
                ix -= 1;
                let node = &children[ix];

                if node.is_inline() {
                    if role == ChildRole::Inline {
                        continue;
                    }
                    let end = ix;
                    while ix > 0 && children[ix - 1].is_inline() {
                        ix -= 1;
                    }
                    let run = children[ix..=end].to_vec();
                    for remove_ix in (ix..=end).rev() {
                        ops.push(Op::RemoveNode {
                            path: child_path(path, remove_ix),
                        });
                    }
                    let paragraph = Node::element(ElementKind::Paragraph, run);
                    let node = match role {
                        ChildRole::Items => Node::list_item(vec![paragraph]),
                        _ => paragraph,
                    };
                    ops.push(Op::InsertNode {
                        path: child_path(path, ix),
                        node,
                    });
                    continue;
                }

                let Node::Element(el) = node else {
                    continue;
                };

                match role {
                    ChildRole::Inline => {
                        ops.push(Op::RemoveNode {
                            path: child_path(path, ix),
                        });
                        for (offset, child) in el.children.iter().enumerate() {
                            ops.push(Op::InsertNode {
                                path: child_path(path, ix + offset),
                                node: child.clone(),
                            });
                        }
                    }
                    ChildRole::Items if el.kind != ElementKind::ListItem => {
                        ops.push(Op::RemoveNode {
                            path: child_path(path, ix),
                        });
                        ops.push(Op::InsertNode {
                            path: child_path(path, ix),
                            node: Node::list_item(vec![node.clone()]),
                        });
                    }
                    ChildRole::Blocks if el.kind == ElementKind::ListItem => {
                        ops.push(Op::RemoveNode {
                            path: child_path(path, ix),
                        });
                        for (offset, child) in el.children.iter().enumerate() {
                            ops.push(Op::InsertNode {
                                path: child_path(path, ix + offset),
                                node: child.clone(),
                            });
                        }
                    }
                    _ => {
                        path.push(ix);
                        walk(&el.children, path, child_role(Some(el.kind)), ops);
                        path.pop();
                    }
                }
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), ChildRole::Blocks, &mut ops);
        ops
    }
}

struct EnsureNonEmptyContainers;

impl NormalizePass for EnsureNonEmptyContainers {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_containers"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Vec<usize>, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate().rev() {
                let Node::Element(el) = node else {
                    continue;
                };

                path.push(ix);
                if el.children.is_empty() {
                    if el.kind.is_list() {
                        ops.push(Op::RemoveNode { path: path.clone() });
                    } else if el.kind.is_text_block() {
                        ops.push(Op::InsertNode {
                            path: child_path(path, 0),
                            node: Node::text(""),
                        });
                    } else {
                        ops.push(Op::InsertNode {
                            path: child_path(path, 0),
                            node: Node::paragraph(""),
                        });
                    }
                } else if !el.kind.is_text_block() {
                    walk(&el.children, path, ops);
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.children, &mut Vec::new(), &mut ops);
        ops
    }
}

fn for_each_element(doc: &Document, mut f: impl FnMut(&ElementNode, &Path)) {
    fn walk(
        children: &[Node],
        path: &mut Vec<usize>,
        f: &mut dyn FnMut(&ElementNode, &Path),
    ) {
        for (ix, node) in children.iter().enumerate() {
            let Node::Element(el) = node else {
                continue;
            };
            path.push(ix);
            f(el, path);
            if !el.kind.is_text_block() {
                walk(&el.children, path, f);
            }
            path.pop();
        }
    }

    walk(&doc.children, &mut Vec::new(), &mut f);
}

struct NormalizeHeadingLevels;

impl NormalizePass for NormalizeHeadingLevels {
    fn id(&self) -> &'static str {
        "heading.normalize_levels"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();
        for_each_element(doc, |el, path| {
            if el.kind != ElementKind::Heading {
                return;
            }
            let current = el.attrs.get(ATTR_LEVEL).and_then(|v| v.as_u64());
            let level = current
                .unwrap_or(u64::from(MIN_HEADING_LEVEL))
                .clamp(u64::from(MIN_HEADING_LEVEL), u64::from(MAX_HEADING_LEVEL));
            if current != Some(level) {
                ops.push(Op::SetNodeAttrs {
                    path: path.clone(),
                    patch: AttrPatch::set(ATTR_LEVEL, level.into()),
                });
            }
        });
        ops
    }
}

/// Only attributes with an HTML form survive: `level` on headings and a known
/// `text_align` on text blocks.
struct RestrictBlockAttrs;

impl NormalizePass for RestrictBlockAttrs {
    fn id(&self) -> &'static str {
        "core.restrict_block_attrs"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();
        for_each_element(doc, |el, path| {
            let mut patch = AttrPatch {
                set: Attrs::default(),
                remove: Vec::new(),
            };
            for (key, value) in &el.attrs {
                let allowed = match key.as_str() {
                    ATTR_LEVEL => el.kind == ElementKind::Heading,
                    ATTR_TEXT_ALIGN => el.kind.is_text_block(),
                    _ => false,
                };
                if !allowed {
                    patch.remove.push(key.clone());
                    continue;
                }
                if key == ATTR_TEXT_ALIGN {
                    match value.as_str().and_then(|s| s.parse::<TextAlign>().ok()) {
                        Some(align) if value.as_str() == Some(align.as_str()) => {}
                        Some(align) => {
                            patch.set.insert(key.clone(), align.as_str().into());
                        }
                        None => patch.remove.push(key.clone()),
                    }
                }
            }
            if !patch.set.is_empty() || !patch.remove.is_empty() {
                ops.push(Op::SetNodeAttrs {
                    path: path.clone(),
                    patch,
                });
            }
        });
        ops
    }
}

fn for_each_text_block(doc: &Document, mut f: impl FnMut(&ElementNode, &Path)) {
    for_each_element(doc, |el, path| {
        if el.kind.is_text_block() {
            f(el, path);
        }
    });
}

/// Between two images, or between an image and a block edge, there is exactly
/// one text slot: either non-empty leaves or a single unmarked empty leaf.
struct ShapeInlineText;

impl NormalizePass for ShapeInlineText {
    fn id(&self) -> &'static str {
        "core.shape_inline_text"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();
        for_each_text_block(doc, |el, path| {
            let mut segments: Vec<(usize, Vec<usize>)> = vec![(0, Vec::new())];
            for (ix, node) in el.children.iter().enumerate() {
                match node {
                    Node::Image(_) => segments.push((ix + 1, Vec::new())),
                    Node::Text(_) => {
                        if let Some((_, texts)) = segments.last_mut() {
                            texts.push(ix);
                        }
                    }
                    Node::Element(_) => {}
                }
            }

            for (start, texts) in segments.iter().rev() {
                let leaf = |ix: usize| match &el.children[ix] {
                    Node::Text(t) => Some(t),
                    _ => None,
                };
                let any_content = texts
                    .iter()
                    .any(|&ix| leaf(ix).is_some_and(|t| !t.text.is_empty()));

                if any_content {
                    for &ix in texts.iter().rev() {
                        if leaf(ix).is_some_and(|t| t.text.is_empty()) {
                            ops.push(Op::RemoveNode {
                                path: child_path(path, ix),
                            });
                        }
                    }
                    continue;
                }

                let Some((&keep, extra)) = texts.split_first() else {
                    ops.push(Op::InsertNode {
                        path: child_path(path, *start),
                        node: Node::text(""),
                    });
                    continue;
                };
                for &ix in extra.iter().rev() {
                    ops.push(Op::RemoveNode {
                        path: child_path(path, ix),
                    });
                }
                if leaf(keep).is_some_and(|t| !t.marks.is_plain()) {
                    ops.push(Op::SetTextMarks {
                        path: child_path(path, keep),
                        marks: Marks::default(),
                    });
                }
            }
        });
        ops
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();
        for_each_text_block(doc, |el, path| {
            let text_at = |ix: usize| match el.children.get(ix) {
                Some(Node::Text(t)) => Some(t),
                _ => None,
            };

            let mut ix = el.children.len();
            while ix > 0 {
                ix -= 1;
                let Some(right) = text_at(ix) else {
                    continue;
                };

                let mut start = ix;
                while start > 0 {
                    let Some(left) = text_at(start - 1) else {
                        break;
                    };
                    if left.marks != right.marks {
                        break;
                    }
                    start -= 1;
                }
                if start == ix {
                    continue;
                }

                // Fold right to left so each removed leaf lands at the end of
                // its left neighbour.
                let mut tail = right.text.clone();
                for merge_ix in (start + 1..=ix).rev() {
                    let Some(TextNode { text: left, .. }) = text_at(merge_ix - 1) else {
                        break;
                    };
                    ops.push(Op::InsertText {
                        path: child_path(path, merge_ix - 1),
                        offset: left.len(),
                        text: tail.clone(),
                    });
                    ops.push(Op::RemoveNode {
                        path: child_path(path, merge_ix),
                    });
                    tail = format!("{left}{tail}");
                }

                ix = start;
            }
        });
        ops
    }
}
