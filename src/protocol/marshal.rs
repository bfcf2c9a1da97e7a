//! Native value to script text conversion.
//!
//! Every value that ends up inside an evaluated snippet goes through one of
//! these helpers:
//!
//! | Input | Rendering |
//! |-------|-----------|
//! | string | single-quoted literal, escaped (`'hello'`) |
//! | any other JSON value | `serde_json` text (`{"a":1}`, `42`, `null`) |
//! | identifier | spliced verbatim after validation |
//!
//! Hub names become script globals, so besides the identifier syntax they
//! must not be reserved words or names the page already defines.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Script identifiers accepted for hub names.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern is valid")
});

/// Reserved words and literals that cannot name a binding.
const RESERVED_WORDS: &[&str] = &[
    "arguments",
    "await",
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "eval",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "implements",
    "import",
    "in",
    "instanceof",
    "interface",
    "let",
    "new",
    "null",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "static",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
];

/// Globals defined by the page, its libraries or the browser that a hub
/// proxy would collide with.
///
/// `typeof <name> == 'undefined'` is false for these, so the proxy would
/// never be created.
const PAGE_GLOBALS: &[&str] = &[
    // Adapter
    "connection",
    "initialize",
    "start",
    "addHandler",
    "hubRelay",
    // Protocol library
    "$",
    "jQuery",
    // Runtime
    "window",
    "self",
    "document",
    "location",
    "name",
    "status",
    "parent",
    "top",
    "frames",
    "globalThis",
    "undefined",
    "NaN",
    "Infinity",
    "JSON",
    "Object",
    "Array",
    "String",
    "Number",
    "Boolean",
    "Function",
    "Symbol",
    "Promise",
    "Math",
    "Date",
    "Error",
    "WebSocket",
    "webkit",
    "ipc",
];

// ============================================================================
// Public Functions
// ============================================================================

/// Renders `s` as a single-quoted script string literal.
///
/// Plain text renders unchanged between the quotes; backslashes, quotes,
/// line terminators and other control characters are escaped.
#[must_use]
pub fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Renders a JSON value as a script expression.
///
/// Strings become single-quoted literals; everything else is JSON text.
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn js_value(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(js_string(s)),
        other => Ok(serde_json::to_string(other)?),
    }
}

/// Converts any serializable value to a JSON value.
///
/// # Errors
///
/// Returns [`Error::Json`] if the value has no JSON representation
/// (for example a map with non-string keys).
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Renders a list of names as a script array of string literals.
///
/// `None` renders as `null`.
#[must_use]
pub fn js_string_array(items: Option<&[String]>) -> String {
    match items {
        None => "null".to_string(),
        Some(items) => {
            let rendered: Vec<String> = items.iter().map(|item| js_string(item)).collect();
            format!("[{}]", rendered.join(","))
        }
    }
}

/// Returns `true` if `name` can be spliced into script as an identifier.
///
/// Reserved words are not identifiers.
#[inline]
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED_WORDS.contains(&name)
}

/// Returns `true` if `name` is already a global of the relay page.
#[inline]
#[must_use]
pub fn is_page_global(name: &str) -> bool {
    PAGE_GLOBALS.contains(&name)
}

/// Validates that `name` can become a hub global.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] if `name` is not an identifier, is a
/// reserved word, or collides with a page global.
pub fn validate_identifier(name: &str) -> Result<()> {
    if is_identifier(name) && !is_page_global(name) {
        Ok(())
    } else {
        Err(Error::invalid_identifier(name))
    }
}

// ============================================================================
// Tests
// ============================================================================
