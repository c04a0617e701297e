use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Reserved-character escaping applied to free-form clause values
/// (`$filter`, `$search` and expression-valued options).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeMode {
    /// Everything outside the RFC 3986 unreserved set is percent-encoded.
    #[default]
    Canonical,
    /// Older services expect the RFC 2396 mark characters `' ( ) * !` to be
    /// left as they are.
    Legacy,
}

const CANONICAL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const LEGACY: &AsciiSet = &CANONICAL
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'!');

/// Percent-encodes a clause value.
///
/// # Examples
///
/// ```
/// use odata_engine::formatter::{EscapeMode, escape};
///
/// assert_eq!(escape("Name eq 'Chai'", EscapeMode::Canonical), "Name%20eq%20%27Chai%27");
/// assert_eq!(escape("Name eq 'Chai'", EscapeMode::Legacy), "Name%20eq%20'Chai'");
/// ```
pub fn escape(value: &str, mode: EscapeMode) -> String {
    let set = match mode {
        EscapeMode::Canonical => CANONICAL,
        EscapeMode::Legacy => LEGACY,
    };
    utf8_percent_encode(value, set).to_string()
}
