//! Wire name <-> attribute name mapping.
//!
//! Wire keys such as `type` or `for` collide with Rust keywords, so the
//! attribute side carries a trailing `_` for them. The mapping is a bijection
//! over the reserved set and the identity everywhere else.

/// Appended to a reserved wire name to obtain its attribute name.
pub const SHADOW_SUFFIX: char = '_';

/// Rust keywords (strict, reserved and edition-specific).
pub const RESERVED: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait",
    "true", "try", "type", "unsafe", "use", "where", "while", "abstract", "become", "box", "do",
    "final", "macro", "override", "priv", "typeof", "unsized", "virtual", "yield",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Wire name -> attribute name.
pub fn shadow(name: &str) -> String {
    if is_reserved(name) {
        let mut out = String::with_capacity(name.len() + 1);
        out.push_str(name);
        out.push(SHADOW_SUFFIX);
        out
    } else {
        name.to_string()
    }
}

/// Attribute name -> wire name.
pub fn unshadow(name: &str) -> String {
    match name.strip_suffix(SHADOW_SUFFIX) {
        Some(stem) if is_reserved(stem) => stem.to_string(),
        _ => name.to_string(),
    }
}
