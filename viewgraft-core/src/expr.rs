//! Lexical analysis of the Python-syntax expressions embedded in view
//! attributes (domains, contexts, modifier conditions).
//!
//! Nothing here evaluates anything. The validator only needs to know which
//! names an expression refers to, so we scan the source text: string literals
//! are skipped, dotted chains are collected whole (`parent.model`), chains
//! hanging off a call result (`foo().strftime`) are discarded, and a fixed
//! set of builtin evaluation-context names is ignored.

use std::collections::BTreeSet;

/// Names always present in the expression evaluation context. References to
/// these are not validated as fields.
const BUILTIN_NAMES: &[&str] = &[
    "True",
    "False",
    "None",
    "true",
    "false",
    "self",
    "user",
    "id",
    "uid",
    "context",
    "context_today",
    "active_id",
    "active_ids",
    "active_model",
    "allowed_company_ids",
    "current_company_id",
    "time",
    "datetime",
    "relativedelta",
    "current_date",
    "today",
    "now",
    "abs",
    "len",
    "bool",
    "float",
    "int",
    "str",
    "set",
    "min",
    "max",
];

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "for", "lambda",
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Free dotted names referenced by an expression.
///
/// A chain like `parent.model` is returned joined; builtins and keywords are
/// dropped, as is any chain whose base is not a plain name (attribute access
/// on a call result cannot name a field).
pub fn variable_names(expr: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let bytes = expr.as_bytes();
    let mut i = 0;
    // last significant byte seen before the current token
    let mut prev: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\'' || b == b'"' {
            i = skip_string(bytes, i);
            prev = Some(b'\'');
        } else if is_ident_start(b) {
            let (chain, next) = read_chain(expr, bytes, i);
            // `.name` after `)` or `]` or a string is an attribute of a
            // computed value, not a variable reference
            let attr_of_value = prev == Some(b'.');
            if !attr_of_value {
                let base = chain.split('.').next().unwrap_or("");
                if !KEYWORDS.contains(&base) && !BUILTIN_NAMES.contains(&base) {
                    names.insert(chain);
                } else if BUILTIN_NAMES.contains(&base) {
                    // ignored base swallows the whole chain
                }
            }
            i = next;
            prev = Some(b'a');
        } else {
            if !b.is_ascii_whitespace() {
                prev = Some(b);
            }
            i += 1;
        }
    }
    names
}

/// Read a dotted chain of names starting at `start`. Stops before a dot that
/// is not followed by a name. Returns the joined chain and the position past
/// it.
fn read_chain(src: &str, bytes: &[u8], start: usize) -> (String, usize) {
    let mut i = start;
    let mut parts: Vec<&str> = Vec::new();
    loop {
        let seg_start = i;
        while i < bytes.len() && is_ident_continue(bytes[i]) {
            i += 1;
        }
        parts.push(&src[seg_start..i]);
        // lookahead across whitespace for `.name`
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'.' {
            let mut k = j + 1;
            while k < bytes.len() && bytes[k].is_ascii_whitespace() {
                k += 1;
            }
            if k < bytes.len() && is_ident_start(bytes[k]) {
                i = k;
                continue;
            }
        }
        break;
    }
    (parts.join("."), i)
}

/// Skip a quoted string starting at `start` (which holds the quote), handling
/// backslash escapes. Returns the position past the closing quote.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Split the field names and the variable names referenced by a domain
/// expression.
///
/// For a literal domain list, every 3-element condition contributes its
/// left-hand string as a field name and the free names of its right-hand
/// expression as variables. A dynamic domain (anything that is not a literal
/// list) contributes only variables.
pub fn domain_identifiers(expr: &str) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut fields = BTreeSet::new();
    let mut vars = BTreeSet::new();
    let trimmed = expr.trim();
    if !trimmed.starts_with('[') {
        return (fields, vars.union(&variable_names(trimmed)).cloned().collect());
    }
    collect_domain(trimmed, &mut fields, &mut vars);
    (fields, vars)
}

fn collect_domain(src: &str, fields: &mut BTreeSet<String>, vars: &mut BTreeSet<String>) {
    let inner = match strip_brackets(src) {
        Some(inner) => inner,
        None => {
            vars.extend(variable_names(src));
            return;
        }
    };
    for element in split_top_level(inner) {
        let element = element.trim();
        if element.is_empty() {
            continue;
        }
        if element.starts_with('(') || element.starts_with('[') {
            let parts: Vec<&str> = match strip_brackets(element) {
                Some(inner) => split_top_level(inner),
                None => Vec::new(),
            };
            if parts.len() == 3 {
                if let Some(lhs) = string_literal(parts[0].trim()) {
                    fields.insert(lhs);
                    vars.extend(variable_names(parts[2]));
                    continue;
                }
            }
            // not a recognizable condition: treat it as opaque code
            vars.extend(variable_names(element));
        } else if string_literal(element).is_some() {
            // '&' / '|' / '!' prefix operators
        } else {
            vars.extend(variable_names(element));
        }
    }
}

/// Key/value source pairs of a dict literal, for string-literal keys only.
/// `None` when the expression is not a dict literal.
pub fn dict_expressions(expr: &str) -> Option<Vec<(String, String)>> {
    let trimmed = expr.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let inner = strip_brackets(trimmed)?;
    let mut pairs = Vec::new();
    for entry in split_top_level(inner) {
        let (key, value) = split_dict_entry(entry)?;
        if let Some(key) = string_literal(key.trim()) {
            pairs.push((key, value.trim().to_string()));
        }
    }
    Some(pairs)
}

/// Split `key: value` on the first top-level colon.
fn split_dict_entry(entry: &str) -> Option<(&str, &str)> {
    let bytes = entry.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => i = skip_string(bytes, i).saturating_sub(1),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b':' if depth == 0 => return Some((&entry[..i], &entry[i + 1..])),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Contents of `[...]`, `(...)` or `{...}` when the brackets span the whole
/// trimmed input.
fn strip_brackets(src: &str) -> Option<&str> {
    let src = src.trim();
    let bytes = src.as_bytes();
    let (open, close) = match bytes.first()? {
        b'[' => (b'[', b']'),
        b'(' => (b'(', b')'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    if *bytes.last()? != close {
        return None;
    }
    // the closing bracket must match the opening one
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => i = skip_string(bytes, i).saturating_sub(1),
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return (i == bytes.len() - 1).then(|| &src[1..bytes.len() - 1]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on top-level commas, respecting nesting and strings.
fn split_top_level(src: &str) -> Vec<&str> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' => i = skip_string(bytes, i).saturating_sub(1),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' if depth == 0 => {
                out.push(&src[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if start < src.len() || !out.is_empty() {
        out.push(&src[start..]);
    } else if !src.trim().is_empty() {
        out.push(src);
    }
    out
}

/// Unquoted content of a string literal, or `None`.
fn string_literal(src: &str) -> Option<String> {
    let bytes = src.as_bytes();
    if bytes.len() >= 2 {
        let q = bytes[0];
        if (q == b'\'' || q == b'"') && bytes[bytes.len() - 1] == q {
            return Some(src[1..src.len() - 1].to_string());
        }
    }
    None
}
