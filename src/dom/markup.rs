//! Minimal HTML fragment parsing and serialization.

use std::borrow::Cow;

use crate::dom::{Document, NodeId, NodeKind};
use crate::parser::Parser;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Parse `markup` into detached nodes owned by `doc`; returns the top-level nodes.
pub fn parse_fragment(doc: &mut Document, markup: &str) -> Vec<NodeId> {
    let mut p = Parser::new(markup);
    let mut top = Vec::new();
    let mut open: Vec<(NodeId, String)> = Vec::new();

    let mut attach = |doc: &mut Document, open: &[(NodeId, String)], node: NodeId| match open.last() {
        Some((parent, _)) => doc.init_child(*parent, node),
        None => top.push(node),
    };

    while !p.eof() {
        if p.peek_str("<!--") {
            p.consume_str("<!--");
            p.capture_until_or_eof("-->");
            p.consume_str("-->");
        } else if p.peek_str("<!") || p.peek_str("<?") {
            p.capture_until_or_eof(">");
            p.consume_char('>');
        } else if p.peek_str("</") && p.peek_nth(2).is_some_and(|c| c.is_ascii_alphabetic()) {
            p.consume_str("</");
            let tag = p.parse_name().unwrap_or_default().to_ascii_lowercase();
            p.capture_until_or_eof(">");
            p.consume_char('>');
            if let Some(pos) = open.iter().rposition(|(_, t)| *t == tag) {
                open.truncate(pos);
            }
        } else if p.peek_char() == Some('<') && p.peek_nth(1).is_some_and(|c| c.is_ascii_alphabetic()) {
            p.consume_char('<');
            let tag = p.parse_name().unwrap_or_default().to_ascii_lowercase();
            let element = doc.create_element(&tag);
            let self_closing = parse_attributes(doc, &mut p, element);
            attach(doc, &open, element);
            if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) && !self_closing {
                let body = p.capture_until_or_eof(&format!("</{tag}"));
                if !body.is_empty() {
                    let text = doc.create_text(body);
                    doc.init_child(element, text);
                }
                p.capture_until_or_eof(">");
                p.consume_char('>');
            } else if !self_closing && !VOID_ELEMENTS.contains(&tag.as_str()) {
                open.push((element, tag));
            }
        } else {
            let mut raw = String::new();
            loop {
                raw.push_str(p.capture_until_or_eof("<"));
                if p.eof() || starts_markup(&p) {
                    break;
                }
                p.consume_char('<');
                raw.push('<');
            }
            let text = doc.create_text(decode_entities(&raw));
            attach(doc, &open, text);
        }
    }
    top
}

fn starts_markup(p: &Parser<'_>) -> bool {
    p.peek_str("<!")
        || p.peek_str("<?")
        || (p.peek_str("</") && p.peek_nth(2).is_some_and(|c| c.is_ascii_alphabetic()))
        || (p.peek_char() == Some('<') && p.peek_nth(1).is_some_and(|c| c.is_ascii_alphabetic()))
}

/// Parse attributes up to and including the tag's `>`; returns true for `/>`.
fn parse_attributes(doc: &mut Document, p: &mut Parser<'_>, element: NodeId) -> bool {
    loop {
        p.skip_ws();
        if p.eof() {
            return false;
        }
        if p.consume_str("/>") {
            return true;
        }
        if p.consume_char('>') {
            return false;
        }
        let name = match p.parse_name() {
            Ok(name) => name.to_ascii_lowercase(),
            Err(_) => {
                p.bump();
                continue;
            }
        };
        p.skip_ws();
        let value = if p.consume_char('=') {
            p.skip_ws();
            match p.peek_char() {
                Some(q @ ('"' | '\'')) => {
                    p.bump();
                    let raw = p.capture_until_or_eof(q.encode_utf8(&mut [0u8; 4]));
                    p.consume_char(q);
                    decode_entities(raw).into_owned()
                }
                _ => {
                    let start = p.rest();
                    let mut len = 0;
                    while let Some(c) = p.peek_char() {
                        if c.is_whitespace() || c == '>' {
                            break;
                        }
                        p.bump();
                        len += c.len_utf8();
                    }
                    decode_entities(&start[..len]).into_owned()
                }
            }
        } else {
            String::new()
        };
        doc.init_attribute(element, name, value);
    }
}

pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

pub fn serialize(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, node, &mut out);
    out
}

pub fn serialize_children(doc: &Document, node: NodeId) -> String {
    let mut out = String::new();
    for &child in doc.children(node) {
        write_node(doc, child, &mut out);
    }
    out
}

fn write_node(doc: &Document, node: NodeId, out: &mut String) {
    match doc.kind(node) {
        NodeKind::Text(data) => {
            let raw_parent = doc
                .parent(node)
                .and_then(|p| doc.tag_name(p))
                .is_some_and(|t| RAW_TEXT_ELEMENTS.contains(&t));
            if raw_parent {
                out.push_str(data);
            } else {
                escape_text(data, out);
            }
        }
        NodeKind::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in doc.attributes(node) {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    escape_attribute(value, out);
                    out.push('"');
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                return;
            }
            for &child in doc.children(node) {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn roundtrip(markup: &str) -> String {
        let mut doc = Document::new();
        let body = doc.body().unwrap();
        doc.native_set_inner_html(body, markup);
        doc.inner_html(body)
    }

    #[test]
    fn nested_elements_and_attributes() {
        assert_eq!(
            roundtrip(r#"<div class='a' data-tse-disable><p title="x &amp; y">hi</p></div>"#),
            r#"<div class="a" data-tse-disable><p title="x &amp; y">hi</p></div>"#
        );
    }

    #[test]
    fn placeholders_survive_parsing() {
        assert_eq!(roundtrip("<p>Sum: ${2+2}</p>"), "<p>Sum: ${2+2}</p>");
        assert_eq!(roundtrip("<p>${a < b}</p>"), "<p>${a &lt; b}</p>");
    }

    #[test]
    fn void_and_self_closing_elements() {
        assert_eq!(
            roundtrip("<input data-tse-bind-value=\"'abc'\"><br/><span/>x"),
            "<input data-tse-bind-value=\"'abc'\"><br><span></span>x"
        );
    }

    #[test]
    fn comments_are_dropped_and_raw_text_is_kept() {
        assert_eq!(
            roundtrip("<!-- note --><script>if (a < b) {}</script>"),
            "<script>if (a < b) {}</script>"
        );
    }

    #[test]
    fn stray_end_tags_are_ignored() {
        assert_eq!(roundtrip("<p>a</span>b</p>"), "<p>ab</p>");
    }

    #[test]
    fn entities_decode() {
        assert_eq!(decode_entities("&lt;&#65;&#x42;&unknown;"), "<AB&unknown;");
    }
}
