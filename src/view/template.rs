//! Template parsing.
//!
//! A template is parsed once into an ordered list of nodes and rendered by
//! walking the list. Substituted text is never re-scanned, so data or slot
//! content containing `{{` or `@slot` is emitted as-is.
//!
//! | Syntax            | Node                                   |
//! |-------------------|----------------------------------------|
//! | `{{ user.name }}` | `Echo`: dotted lookup, HTML-escaped    |
//! | `{!! html !!}`    | `Raw`: dotted lookup, unescaped        |
//! | `@slot`           | `Slot("slot")`: the default slot       |
//! | `@slot(sidebar)`  | `Slot("sidebar")`                      |
//! | `@extends(a.b)`   | parent layout; emits nothing           |
//!
//! Anything else, including unterminated tags, is literal text.

use std::collections::HashMap;

use serde_json::Value;

use super::DEFAULT_SLOT;
use crate::config::lookup;
use crate::support::html::escape;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    Echo(String),
    Raw(String),
    Slot(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
    extends: Option<String>,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut nodes = Vec::new();
        let mut extends = None;
        let mut literal = String::new();
        let mut rest = source;

        while let Some(at) = rest.find(['{', '@']) {
            literal.push_str(&rest[..at]);
            rest = &rest[at..];

            let Some((tag, len)) = parse_tag(rest) else {
                // Not a tag: keep the marker character and move on.
                let ch = rest.chars().next().map_or(1, char::len_utf8);
                literal.push_str(&rest[..ch]);
                rest = &rest[ch..];
                continue;
            };

            rest = &rest[len..];
            match tag {
                Tag::Extends(name) => extends = Some(name),
                Tag::Node(node) => {
                    if !literal.is_empty() {
                        nodes.push(Node::Literal(std::mem::take(&mut literal)));
                    }
                    nodes.push(node);
                }
            }
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            nodes.push(Node::Literal(literal));
        }

        Self { nodes, extends }
    }

    pub fn nodes(&self) -> &[Node] { &self.nodes }

    /// The layout named by an `@extends(..)` directive, if any.
    pub fn extends(&self) -> Option<&str> { self.extends.as_deref() }

    /// Renders against `data`. Slots missing from `slots` render empty.
    pub fn render(&self, data: &Value, slots: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Literal(text) => out.push_str(text),
                Node::Echo(path) => out.push_str(&escape(&display(lookup(data, path)))),
                Node::Raw(path) => out.push_str(&display(lookup(data, path))),
                Node::Slot(name) => {
                    if let Some(content) = slots.get(name) {
                        out.push_str(content);
                    }
                }
            }
        }
        out
    }
}

enum Tag {
    Node(Node),
    Extends(String),
}

/// Tries to read one tag at the start of `input`. Returns the tag and the
/// number of bytes it spans.
fn parse_tag(input: &str) -> Option<(Tag, usize)> {
    if let Some(body) = input.strip_prefix("{!!") {
        let end = body.find("!!}")?;
        let path = body[..end].trim().to_owned();
        return Some((Tag::Node(Node::Raw(path)), 3 + end + 3));
    }

    if let Some(body) = input.strip_prefix("{{") {
        let end = body.find("}}")?;
        let path = body[..end].trim().to_owned();
        return Some((Tag::Node(Node::Echo(path)), 2 + end + 2));
    }

    if let Some((arg, len)) = directive(input, "@extends") {
        return Some((Tag::Extends(arg?), len));
    }

    if let Some((arg, len)) = directive(input, "@slot") {
        let name = arg.unwrap_or_else(|| DEFAULT_SLOT.to_owned());
        return Some((Tag::Node(Node::Slot(name)), len));
    }

    None
}

/// Matches `@name` or `@name(arg)`. The argument may be quoted.
///
/// Returns `None` when `input` does not start with the directive as a whole
/// word (`@slotted` is not `@slot`).
fn directive(input: &str, name: &str) -> Option<(Option<String>, usize)> {
    let after = input.strip_prefix(name)?;

    if let Some(args) = after.strip_prefix('(') {
        let end = args.find(')')?;
        let arg = args[..end].trim().trim_matches(|c| c == '\'' || c == '"').trim();
        let arg = (!arg.is_empty()).then(|| arg.to_owned());
        return Some((arg, name.len() + 1 + end + 1));
    }

    match after.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' || c == '-' => None,
        _ => Some((None, name.len())),
    }
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn slots(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn parses_into_ordered_nodes() {
        let t = Template::parse("<h1>{{ title }}</h1>@slot<aside>@slot('side')</aside>{!! raw !!}");
        assert_eq!(
            t.nodes(),
            &[
                Node::Literal("<h1>".into()),
                Node::Echo("title".into()),
                Node::Literal("</h1>".into()),
                Node::Slot("slot".into()),
                Node::Literal("<aside>".into()),
                Node::Slot("side".into()),
                Node::Literal("</aside>".into()),
                Node::Raw("raw".into()),
            ]
        );
    }

    #[test]
    fn echo_escapes_and_raw_does_not() {
        let t = Template::parse("{{ v }}|{!! v !!}");
        let out = t.render(&json!({ "v": "<b>&</b>" }), &HashMap::new());
        assert_eq!(out, "&lt;b&gt;&amp;&lt;/b&gt;|<b>&</b>");
    }

    #[test]
    fn dotted_paths_and_scalars() {
        let t = Template::parse("{{ user.name }} is {{ user.age }}, admin={{ user.admin }}{{ missing }}");
        let data = json!({ "user": { "name": "Ada", "age": 36, "admin": true } });
        assert_eq!(t.render(&data, &HashMap::new()), "Ada is 36, admin=true");
    }

    #[test]
    fn slots_fill_and_missing_slots_are_empty() {
        let t = Template::parse("[@slot][@slot(side)]");
        assert_eq!(t.render(&json!({}), &slots(&[("slot", "main")])), "[main][]");
    }

    #[test]
    fn substituted_content_is_not_rescanned() {
        let t = Template::parse("@slot");
        let out = t.render(&json!({}), &slots(&[("slot", "{{ secret }} @slot(x)")]));
        assert_eq!(out, "{{ secret }} @slot(x)");
    }

    #[test]
    fn extends_is_recorded_not_emitted() {
        let t = Template::parse("@extends(layouts.app)\n<p>hi</p>");
        assert_eq!(t.extends(), Some("layouts.app"));
        assert_eq!(t.render(&json!({}), &HashMap::new()), "\n<p>hi</p>");
    }

    #[test]
    fn unterminated_tags_and_lookalikes_are_literal() {
        let source = "a {{ b and me@example.com @slotted { x";
        let t = Template::parse(source);
        assert_eq!(t.render(&json!({}), &HashMap::new()), source);
    }
}
