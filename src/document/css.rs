//! Minimal CSS rewriting for declaration lists and embedded style sheets.
//!
//! Only the structure needed to visit every property is recognised: style
//! rules, grouping at-rules (`@media`, `@supports`, ...) whose bodies are
//! visited recursively, and everything else, which is kept verbatim. Comments
//! collapse to a single space.

use once_cell::sync::Lazy;
use regex::Regex;

/// A property hook: `(name, value) -> value`. An empty result removes the property.
pub type PropertyHook<'a> = dyn FnMut(&str, &str) -> String + 'a;

static IMPORTANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s*!\s*important\s*$").expect("important regex"));

static URL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\burl\((["']?)([^\s?"')]+)"#).expect("url regex"));

const GROUPING_AT_RULES: &[&str] = &[
    "media",
    "supports",
    "container",
    "layer",
    "document",
    "-moz-document",
    "scope",
    "starting-style",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

/// Parses the body of a `style` attribute or a style rule.
pub fn parse_declarations(text: &str) -> Vec<Declaration> {
    let text = strip_comments(text);
    split_top_level(&text, ';')
        .into_iter()
        .filter_map(|piece| {
            let (name, value) = piece.split_once(':')?;
            let name = name.trim();
            let name = if name.starts_with("--") {
                name.to_string()
            } else {
                name.to_ascii_lowercase()
            };

            let important = IMPORTANT.is_match(value);
            let value = IMPORTANT.replace(value, "").trim().to_string();
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some(Declaration {
                name,
                value,
                important,
            })
        })
        .collect()
}

pub fn serialize_declarations(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|d| {
            if d.important {
                format!("{}: {} !important;", d.name, d.value)
            } else {
                format!("{}: {};", d.name, d.value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `hook` over every declaration in `text`.
///
/// A property whose value changes is removed and, when the new value is not
/// empty, appended again at the end with its original priority.
pub fn rewrite_declarations(text: &str, hook: &mut PropertyHook<'_>) -> String {
    let mut kept = Vec::new();
    let mut reinserted = Vec::new();

    for declaration in parse_declarations(text) {
        let value = hook(&declaration.name, &declaration.value);
        if value == declaration.value {
            kept.push(declaration);
        } else if !value.is_empty() {
            reinserted.push(Declaration {
                value,
                ..declaration
            });
        }
    }

    kept.extend(reinserted);
    serialize_declarations(&kept)
}

/// Runs `hook` over every property of every style rule in a style sheet,
/// descending into grouping at-rules.
///
/// The result is safe to put back into a `<style>` element: every `<` is
/// written as the CSS escape `\3c `, so the sheet can never close its element.
pub fn rewrite_sheet(text: &str, hook: &mut PropertyHook<'_>) -> String {
    let text = strip_comments(text);
    escape_markup(&rewrite_rules(&text, hook).join("\n"))
}

/// Escapes `<` so raw style text cannot end its element early.
pub fn escape_markup(sheet: &str) -> String {
    sheet.replace('<', "\\3c ")
}

/// Replaces the address inside the first `url(...)` token of `value`.
///
/// The quote character, if any, is preserved. Returns `None` when `resolve`
/// rejects the address.
pub fn rewrite_first_url(value: &str, resolve: impl FnOnce(&str) -> Option<String>) -> Option<String> {
    let Some(caps) = URL_TOKEN.captures(value) else {
        return Some(value.to_string());
    };
    let (Some(whole), Some(address)) = (caps.get(0), caps.get(2)) else {
        return Some(value.to_string());
    };
    let quote = caps.get(1).map_or("", |m| m.as_str());
    let resolved = resolve(address.as_str())?;

    Some(format!(
        "{}url({}{}{}",
        &value[..whole.start()],
        quote,
        resolved,
        &value[whole.end()..]
    ))
}

fn rewrite_rules(text: &str, hook: &mut PropertyHook<'_>) -> Vec<String> {
    let mut rules = Vec::new();
    let mut rest = text;

    loop {
        let current = rest.trim_start();
        if current.is_empty() {
            break;
        }

        match find_top_level(current, &['{', ';']) {
            None => {
                rules.push(current.trim_end().to_string());
                break;
            }
            Some((idx, ';')) => {
                rules.push(current[..=idx].trim().to_string());
                rest = &current[idx + 1..];
            }
            Some((open, _)) => {
                let prelude = current[..open].trim();
                let Some(close) = matching_brace(current, open) else {
                    rules.push(current.trim_end().to_string());
                    break;
                };
                let body = &current[open + 1..close];
                rules.push(rewrite_rule(prelude, body, hook));
                rest = &current[close + 1..];
            }
        }
    }

    rules
}

fn rewrite_rule(prelude: &str, body: &str, hook: &mut PropertyHook<'_>) -> String {
    if let Some(at_rule) = prelude.strip_prefix('@') {
        let keyword = at_rule
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        if GROUPING_AT_RULES.contains(&keyword.as_str()) {
            let inner = rewrite_rules(body, hook).join("\n");
            return format!("{} {{\n{}\n}}", prelude, inner);
        }
        return format!("{} {{{}}}", prelude, body);
    }

    // Nested style rules are left as written.
    if find_top_level(body, &['{']).is_some() {
        return format!("{} {{{}}}", prelude, body);
    }

    format!("{} {{ {} }}", prelude, rewrite_declarations(body, hook))
}

/// Finds the first of `targets` outside strings and parentheses.
fn find_top_level(text: &str, targets: &[char]) -> Option<(usize, char)> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 && targets.contains(&c) => return Some((idx, c)),
            _ => {}
        }
    }
    None
}

fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    for (idx, c) in text[open..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while let Some((idx, _)) = find_top_level(rest, &[separator]) {
        pieces.push(&rest[..idx]);
        rest = &rest[idx + separator.len_utf8()..];
    }
    pieces.push(rest);
    pieces
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '/' && chars.peek() == Some(&'*') => {
                chars.next();
                out.push(' ');
                let mut previous = '\0';
                for c in chars.by_ref() {
                    if previous == '*' && c == '/' {
                        break;
                    }
                    previous = c;
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper_urls(name: &str, value: &str) -> String {
        if name == "background-image" {
            rewrite_first_url(value, |u| Some(format!("https://ex.com/{}", u))).unwrap_or_default()
        } else {
            value.to_string()
        }
    }

    #[test]
    fn test_parse_declarations() {
        let decls = parse_declarations("color: red; /* note */ Margin : 0 auto !important;;--Var: 1");
        assert_eq!(decls.len(), 3);
        assert_eq!(decls[0].name, "color");
        assert_eq!(decls[1].name, "margin");
        assert_eq!(decls[1].value, "0 auto");
        assert!(decls[1].important);
        assert_eq!(decls[2].name, "--Var");
    }

    #[test]
    fn test_parse_declarations_respects_strings_and_parens() {
        let decls = parse_declarations(r#"content: "a;b"; background: url(data:image/png;base64,AAA)"#);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].value, r#""a;b""#);
        assert_eq!(decls[1].value, "url(data:image/png;base64,AAA)");
    }

    #[test]
    fn test_rewrite_declarations_reinserts_changed_property_last() {
        let mut hook = upper_urls;
        let out = rewrite_declarations(
            "background-image: url('a.png') !important; color: red",
            &mut hook,
        );
        assert_eq!(
            out,
            "color: red; background-image: url('https://ex.com/a.png') !important;"
        );
    }

    #[test]
    fn test_rewrite_declarations_empty_result_removes() {
        let mut hook = |name: &str, value: &str| {
            if name == "color" {
                String::new()
            } else {
                value.to_string()
            }
        };
        assert_eq!(rewrite_declarations("color: red; margin: 0", &mut hook), "margin: 0;");
    }

    #[test]
    fn test_rewrite_sheet_descends_into_grouping_rules() {
        let sheet = r#"
            @import url("x.css");
            body { background-image: url(bg.png) }
            @media (min-width: 10px) {
                @supports (display: grid) {
                    .a { background-image: url("inner.png"); }
                }
            }
            @keyframes spin { from { top: 0 } to { top: 1px } }
        "#;
        let mut hook = upper_urls;
        let out = rewrite_sheet(sheet, &mut hook);

        assert!(out.contains(r#"@import url("x.css");"#));
        assert!(out.contains("body { background-image: url(https://ex.com/bg.png); }"));
        assert!(out.contains(r#".a { background-image: url("https://ex.com/inner.png"); }"#));
        assert!(out.contains("@keyframes spin { from { top: 0 } to { top: 1px } }"));
    }

    #[test]
    fn test_rewrite_sheet_visits_every_property() {
        let mut seen = Vec::new();
        let mut hook = |name: &str, value: &str| {
            seen.push(name.to_string());
            value.to_string()
        };
        rewrite_sheet("a { color: red } @media print { b { margin: 0; padding: 0 } }", &mut hook);
        assert_eq!(seen, ["color", "margin", "padding"]);
    }

    #[test]
    fn test_comment_inside_tag_cannot_close_style() {
        let mut hook = |_: &str, value: &str| value.to_string();
        let out = rewrite_sheet("p{color:red}</sty/**/le><img src=x onerror=alert(1)>", &mut hook);
        assert!(!out.contains('<'));
        assert!(!out.to_ascii_lowercase().contains("</style"));
        assert!(out.contains("\\3c /sty le>"));
    }

    #[test]
    fn test_rewrite_sheet_escapes_markup_in_strings() {
        let mut hook = |_: &str, value: &str| value.to_string();
        let out = rewrite_sheet(r#"a::after { content: "</style>" }"#, &mut hook);
        assert_eq!(out, r#"a::after { content: "\3c /style>"; }"#);
    }

    #[test]
    fn test_rewrite_first_url_only_first() {
        let out = rewrite_first_url("url(a.png), url(b.png)", |u| Some(format!("/abs/{}", u))).unwrap();
        assert_eq!(out, "url(/abs/a.png), url(b.png)");
    }

    #[test]
    fn test_rewrite_first_url_without_url() {
        assert_eq!(rewrite_first_url("none", |_| None).as_deref(), Some("none"));
        assert_eq!(rewrite_first_url("url(a.png)", |_| None), None);
    }
}
