//! The stored form of a post body: a single HTML string.
//!
//! Serialization emits only the tags the editor understands. Parsing accepts
//! looser markup (unknown wrappers, `<b>`/`<i>`, deep headings) and normalizes
//! the result, so `parse(serialize(doc)) == doc` for any normalized document.

use html5ever::tendril::TendrilSink;
use html5ever::{LocalName, Namespace, ParseOpts, QualName, parse_fragment};
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::core::{
    ATTR_LEVEL, ATTR_TEXT_ALIGN, ApplyError, Attrs, Document, ElementKind, ElementNode,
    ImageNode, MAX_HEADING_LEVEL, Marks, Node, TextAlign,
};
use crate::editor::EditorConfig;
use crate::normalize::normalize_document;

pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    write_blocks(&doc.children, &mut out);
    out
}

pub fn parse(input: &str) -> Result<Document, ApplyError> {
    let config = EditorConfig::default().with_defaults();
    parse_with_limit(input, config.max_normalize_iterations)
}

pub fn parse_with_limit(input: &str, max_iterations: usize) -> Result<Document, ApplyError> {
    let dom = build_dom(input);
    let mut children = Vec::new();
    blocks_from(&dom, &mut children);
    let mut doc = Document::new(children);
    normalize_document(&mut doc, max_iterations)?;
    Ok(doc)
}

fn write_blocks(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(el) => write_element(el, out),
            Node::Text(_) | Node::Image(_) => write_inline(std::slice::from_ref(node), out),
        }
    }
}

fn write_element(el: &ElementNode, out: &mut String) {
    let tag = match el.kind {
        ElementKind::Paragraph => "p".to_string(),
        ElementKind::Heading => format!("h{}", el.heading_level().unwrap_or(1)),
        ElementKind::BulletList => "ul".to_string(),
        ElementKind::OrderedList => "ol".to_string(),
        ElementKind::ListItem => "li".to_string(),
        ElementKind::Blockquote => "blockquote".to_string(),
    };

    out.push('<');
    out.push_str(&tag);
    if let Some(align) = el.text_align() {
        out.push_str(" style=\"text-align: ");
        out.push_str(align.as_str());
        out.push('"');
    }
    out.push('>');

    if el.kind.is_text_block() {
        write_inline(&el.children, out);
    } else {
        write_blocks(&el.children, out);
    }

    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}

fn write_inline(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => {
                if t.text.is_empty() {
                    continue;
                }
                if let Some(href) = &t.marks.link {
                    out.push_str("<a href=\"");
                    escape_attr(href, out);
                    out.push_str("\">");
                }
                if t.marks.bold {
                    out.push_str("<strong>");
                }
                if t.marks.italic {
                    out.push_str("<em>");
                }
                escape_text(&t.text, out);
                if t.marks.italic {
                    out.push_str("</em>");
                }
                if t.marks.bold {
                    out.push_str("</strong>");
                }
                if t.marks.link.is_some() {
                    out.push_str("</a>");
                }
            }
            Node::Image(image) => write_image(image, out),
            Node::Element(el) => write_element(el, out),
        }
    }
}

fn write_image(image: &ImageNode, out: &mut String) {
    out.push_str("<img src=\"");
    escape_attr(&image.src, out);
    out.push_str("\" alt=\"");
    escape_attr(&image.alt, out);
    out.push('"');
    if let Some(caption) = &image.caption {
        out.push_str(" title=\"");
        escape_attr(caption, out);
        out.push('"');
    }
    if !image.style.is_empty() {
        out.push_str(" style=\"");
        escape_attr(&image.style, out);
        out.push('"');
    }
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("<br>"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(ch),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Dom {
    Element(DomElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct DomElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Dom>,
}

impl DomElement {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// Parses `input` as the inner HTML of a `<body>`, with the usual browser
/// error recovery, and keeps only elements and text.
fn build_dom(input: &str) -> Vec<Dom> {
    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from("body"),
    );
    let rcdom = parse_fragment(RcDom::default(), ParseOpts::default(), context, Vec::new())
        .one(input);

    // The fragment's nodes hang off a synthetic <html> root.
    let roots = rcdom.document.children.borrow();
    let dom = roots.iter().flat_map(dom_children).collect();
    dom
}

fn dom_children(handle: &Handle) -> Vec<Dom> {
    handle.children.borrow().iter().filter_map(dom_node).collect()
}

fn dom_node(handle: &Handle) -> Option<Dom> {
    match &handle.data {
        // Source line breaks are formatting; `<br>` carries real ones.
        NodeData::Text { contents } => Some(Dom::Text(contents.borrow().replace('\n', " "))),
        NodeData::Element { name, attrs, .. } => {
            let name = name.local.to_string();
            if matches!(name.as_str(), "script" | "style" | "template" | "noscript") {
                return None;
            }
            let attrs = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            Some(Dom::Element(DomElement {
                name,
                attrs,
                children: dom_children(handle),
            }))
        }
        _ => None,
    }
}

fn text_align_from_style(style: &str) -> Option<TextAlign> {
    style.split(';').find_map(|decl| {
        let (key, value) = decl.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("text-align") {
            value.parse().ok()
        } else {
            None
        }
    })
}

fn block_attrs(el: &DomElement) -> Attrs {
    let mut attrs = Attrs::default();
    if let Some(align) = el.attr("style").and_then(text_align_from_style) {
        attrs.insert(ATTR_TEXT_ALIGN.to_string(), align.as_str().into());
    }
    attrs
}

fn text_block(kind: ElementKind, mut attrs: Attrs, el: &DomElement) -> Node {
    if kind == ElementKind::Heading {
        let level = el.name[1..]
            .parse::<u8>()
            .unwrap_or(1)
            .min(MAX_HEADING_LEVEL);
        attrs.insert(ATTR_LEVEL.to_string(), u64::from(level).into());
    }
    let mut children = Vec::new();
    inlines_from(&el.children, &Marks::default(), &mut children);
    Node::Element(ElementNode {
        kind,
        attrs,
        children,
    })
}

fn flush_inline_run(pending: &mut Vec<Node>, out: &mut Vec<Node>) {
    let blank = pending.iter().all(|node| match node {
        Node::Text(t) => t.text.trim().is_empty(),
        _ => false,
    });
    let run = std::mem::take(pending);
    if !blank {
        out.push(Node::element(ElementKind::Paragraph, run));
    }
}

/// Converts nodes found where blocks are expected. Stray inline content is
/// gathered into paragraphs and unknown wrappers are looked through.
fn blocks_from(nodes: &[Dom], out: &mut Vec<Node>) {
    let mut pending: Vec<Node> = Vec::new();

    for node in nodes {
        let Dom::Element(el) = node else {
            inlines_from(std::slice::from_ref(node), &Marks::default(), &mut pending);
            continue;
        };

        let block = match el.name.as_str() {
            "p" => Some(text_block(ElementKind::Paragraph, block_attrs(el), el)),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                Some(text_block(ElementKind::Heading, block_attrs(el), el))
            }
            "ul" | "ol" => {
                let kind = if el.name == "ul" {
                    ElementKind::BulletList
                } else {
                    ElementKind::OrderedList
                };
                let mut items = Vec::new();
                for child in &el.children {
                    match child {
                        Dom::Element(li) if li.name == "li" => {
                            let mut content = Vec::new();
                            blocks_from(&li.children, &mut content);
                            items.push(Node::list_item(content));
                        }
                        other => blocks_from(std::slice::from_ref(other), &mut items),
                    }
                }
                Some(Node::element(kind, items))
            }
            "li" => {
                let mut content = Vec::new();
                blocks_from(&el.children, &mut content);
                Some(Node::list_item(content))
            }
            "blockquote" => {
                let mut content = Vec::new();
                blocks_from(&el.children, &mut content);
                Some(Node::blockquote(content))
            }
            _ if is_inline_tag(&el.name) => None,
            _ => {
                flush_inline_run(&mut pending, out);
                blocks_from(&el.children, out);
                continue;
            }
        };

        match block {
            Some(block) => {
                flush_inline_run(&mut pending, out);
                out.push(block);
            }
            None => inlines_from(std::slice::from_ref(node), &Marks::default(), &mut pending),
        }
    }

    flush_inline_run(&mut pending, out);
}

fn is_inline_tag(name: &str) -> bool {
    matches!(
        name,
        "a" | "b"
            | "strong"
            | "i"
            | "em"
            | "img"
            | "br"
            | "span"
            | "u"
            | "s"
            | "code"
            | "small"
            | "sub"
            | "sup"
            | "mark"
            | "abbr"
            | "cite"
            | "q"
            | "label"
    )
}

fn inlines_from(nodes: &[Dom], marks: &Marks, out: &mut Vec<Node>) {
    for node in nodes {
        let el = match node {
            Dom::Text(text) => {
                out.push(Node::marked_text(text.as_str(), marks.clone()));
                continue;
            }
            Dom::Element(el) => el,
        };

        match el.name.as_str() {
            "br" => out.push(Node::marked_text("\n", marks.clone())),
            "img" => {
                let src = el.attr("src").unwrap_or_default();
                if src.trim().is_empty() {
                    continue;
                }
                out.push(Node::Image(ImageNode {
                    src: src.to_string(),
                    alt: el.attr("alt").unwrap_or_default().to_string(),
                    caption: el.attr("title").map(str::to_string),
                    style: el.attr("style").unwrap_or_default().to_string(),
                }));
            }
            "strong" | "b" => {
                let mut inner = marks.clone();
                inner.bold = true;
                inlines_from(&el.children, &inner, out);
            }
            "em" | "i" => {
                let mut inner = marks.clone();
                inner.italic = true;
                inlines_from(&el.children, &inner, out);
            }
            "a" => {
                let mut inner = marks.clone();
                if let Some(href) = el.attr("href").map(str::trim).filter(|h| !h.is_empty()) {
                    inner.link = Some(href.to_string());
                }
                inlines_from(&el.children, &inner, out);
            }
            _ => inlines_from(&el.children, marks, out),
        }
    }
}
