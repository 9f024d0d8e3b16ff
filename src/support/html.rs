//! HTML string helpers used by templates and views.

use std::fmt::Write;

/// Escapes the five characters that are significant in HTML text and
/// attribute values.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&'  => out.push_str("&amp;"),
            '<'  => out.push_str("&lt;"),
            '>'  => out.push_str("&gt;"),
            '"'  => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c    => out.push(c),
        }
    }
    out
}

/// Joins the class names whose condition holds.
///
/// ```rust
/// use trellis::support::html::classes;
///
/// assert_eq!(classes(&[("btn", true), ("active", false), ("lg", true)]), "btn lg");
/// ```
pub fn classes(entries: &[(&str, bool)]) -> String {
    entries
        .iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders `name="value"` pairs separated by spaces. Values are escaped.
pub fn attributes(attrs: &[(&str, &str)]) -> String {
    let mut out = String::new();
    for (i, (name, value)) in attrs.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{name}=\"{}\"", escape(value));
    }
    out
}

/// A unique element id such as `email__a1b2c3d4`.
pub fn id(field: &str) -> String {
    let field = if field.is_empty() { "unlabeled_element" } else { field };
    format!("{field}__{:08x}", rand::random::<u32>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/a&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn attributes_are_joined_and_escaped() {
        assert_eq!(
            attributes(&[("type", "text"), ("value", "a\"b")]),
            r#"type="text" value="a&quot;b""#
        );
        assert_eq!(attributes(&[]), "");
    }

    #[test]
    fn ids_keep_field_prefix() {
        let a = id("email");
        assert!(a.starts_with("email__"));
        assert_eq!(a.len(), "email__".len() + 8);
        assert!(id("").starts_with("unlabeled_element__"));
    }
}
