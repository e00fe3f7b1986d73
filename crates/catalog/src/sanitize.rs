//! Display-name cleanup.

/// Program prefixes stripped by default.
pub const DEFAULT_PREFIXES: [&str; 2] = ["ST_PRG_WITH_RS_LIB.", "ST_PRG_WITH_RS_LIB/"];

/// Strips known program prefixes from display names.
///
/// Only display copies pass through here; node ids are never rewritten.
/// Prefixes are stripped repeatedly until none matches, so sanitizing an
/// already sanitized name returns it unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitizer {
    prefixes: Vec<String>,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES.iter().map(|p| p.to_string()))
    }
}

impl Sanitizer {
    /// Empty prefixes are ignored.
    pub fn new(prefixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn sanitize(&self, name: &str) -> String {
        let mut rest = name;
        'strip: loop {
            for prefix in &self.prefixes {
                if let Some(stripped) = rest.strip_prefix(prefix.as_str()) {
                    rest = stripped;
                    continue 'strip;
                }
            }
            break;
        }
        rest.to_string()
    }
}
