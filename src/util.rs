macro_rules! time_debug {
    ($name:expr, $f:block) => {{
        let start = std::time::Instant::now();
        let result = $f;
        let end = std::time::Instant::now();
        log::debug!("{} (took {:?})", $name, end.duration_since(start));
        result
    }};
}

static INVALID_IDENTIFIER_CHARS: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

/// Replaces every character that is not valid inside a dot identifier.
pub fn sanitize_identifier(name: &str) -> String {
    let pattern = INVALID_IDENTIFIER_CHARS
        .get_or_init(|| regex::Regex::new(r"[^A-Za-z0-9_]").expect("pattern is a valid regex"));

    pattern.replace_all(name, "_").into_owned()
}
