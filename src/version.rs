use std::{fmt, str::FromStr};

/// Wire dialect of the query protocol.
///
/// The legacy dialect (V3) and the modern one (V4) differ in function names,
/// literal formats, count syntax and how function arguments are passed. The
/// version is chosen once per session and selects the formatting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// Legacy dialect (`$inlinecount`, `substringof`, `datetime'...'`)
    V3,
    /// Modern dialect (`$count=true`, `$search`, qualified operations)
    #[default]
    V4,
}

impl ProtocolVersion {
    /// Value of the `DataServiceVersion` / `OData-Version` header
    pub fn header_value(self) -> &'static str {
        match self {
            ProtocolVersion::V3 => "3.0",
            ProtocolVersion::V4 => "4.0",
        }
    }

    /// Name of the version request header
    pub fn header_name(self) -> &'static str {
        match self {
            ProtocolVersion::V3 => "DataServiceVersion",
            ProtocolVersion::V4 => "OData-Version",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V3 => write!(f, "V3"),
            ProtocolVersion::V4 => write!(f, "V4"),
        }
    }
}

/// Error returned when a version string names neither dialect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported protocol version: '{0}'")]
pub struct UnknownVersion(pub String);

impl FromStr for ProtocolVersion {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches(['V', 'v']) {
            "3" | "3.0" => Ok(ProtocolVersion::V3),
            "4" | "4.0" | "4.01" => Ok(ProtocolVersion::V4),
            _ => Err(UnknownVersion(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_strings() {
        assert_eq!("V3".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V3);
        assert_eq!("3.0".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V3);
        assert_eq!("v4".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V4);
        assert_eq!("4.01".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V4);
    }

    #[test]
    fn test_parse_unknown_version() {
        let err = "2.0".parse::<ProtocolVersion>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported protocol version: '2.0'");
    }
}
