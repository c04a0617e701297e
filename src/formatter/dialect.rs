use crate::ProtocolVersion;

/// How function arguments travel in the URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArgumentFormat {
    /// `Function?name=value&...`
    Query,
    /// `Function(name=value,...)`, collections hoisted into `@pN` aliases
    Key,
}

/// Version-specific formatting rules, selected once per formatter.
pub(crate) trait Dialect: Sync {
    fn version(&self) -> ProtocolVersion;

    /// Query option that asks for an inline total count
    fn inline_count(&self) -> &'static str;

    fn argument_format(&self) -> ArgumentFormat;

    fn supports_search(&self) -> bool;

    /// True when expand options nest inside the expand clause
    /// (`Nav($select=...)`) instead of being flattened into paths.
    fn nests_expand_options(&self) -> bool;
}

pub(crate) struct V3Dialect;

pub(crate) struct V4Dialect;

impl Dialect for V3Dialect {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V3
    }

    fn inline_count(&self) -> &'static str {
        "$inlinecount=allpages"
    }

    fn argument_format(&self) -> ArgumentFormat {
        ArgumentFormat::Query
    }

    fn supports_search(&self) -> bool {
        false
    }

    fn nests_expand_options(&self) -> bool {
        false
    }
}

impl Dialect for V4Dialect {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V4
    }

    fn inline_count(&self) -> &'static str {
        "$count=true"
    }

    fn argument_format(&self) -> ArgumentFormat {
        ArgumentFormat::Key
    }

    fn supports_search(&self) -> bool {
        true
    }

    fn nests_expand_options(&self) -> bool {
        true
    }
}

pub(crate) fn dialect(version: ProtocolVersion) -> &'static dyn Dialect {
    match version {
        ProtocolVersion::V3 => &V3Dialect,
        ProtocolVersion::V4 => &V4Dialect,
    }
}
