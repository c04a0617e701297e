//! Function mapping table.
//!
//! Filter expressions call functions by their logical name on a target
//! (`Name.Contains("ai")`). The protocol names those functions differently and
//! does not always take the target first, so every supported
//! (logical name, argument count) pair maps to a protocol name plus an
//! argument assembly rule. The argument count excludes the target.
//!
//! ```text
//! Contains(Name, 'ai')    V3 -> substringof('ai',Name)   (target last)
//!                         V4 -> contains(Name,'ai')      (target first)
//! StartsWith(Name, 'C')   both -> startswith(Name,'C')
//! Length(Name)            both -> length(Name)           (target only)
//! ```

use crate::ProtocolVersion;

/// Where the call target lands in the protocol argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentOrder {
    /// `fn(target, args...)`
    TargetFirst,
    /// `fn(args..., target)`
    TargetLast,
    /// `fn(target)`; the logical call takes no arguments
    TargetOnly,
}

/// Protocol-side description of a logical function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub protocol_name: &'static str,
    pub order: ArgumentOrder,
}

struct Entry {
    name: &'static str,
    arity: usize,
    v3: Option<FunctionDescriptor>,
    v4: Option<FunctionDescriptor>,
}

const fn both(protocol_name: &'static str, order: ArgumentOrder) -> Option<FunctionDescriptor> {
    Some(FunctionDescriptor { protocol_name, order })
}

const fn entry(name: &'static str, arity: usize, protocol_name: &'static str, order: ArgumentOrder) -> Entry {
    Entry {
        name,
        arity,
        v3: both(protocol_name, order),
        v4: both(protocol_name, order),
    }
}

const fn v4_only(name: &'static str, protocol_name: &'static str) -> Entry {
    Entry {
        name,
        arity: 0,
        v3: None,
        v4: both(protocol_name, ArgumentOrder::TargetOnly),
    }
}

use ArgumentOrder::*;

const TABLE: &[Entry] = &[
    // String functions
    Entry {
        name: "Contains",
        arity: 1,
        v3: both("substringof", TargetLast),
        v4: both("contains", TargetFirst),
    },
    entry("StartsWith", 1, "startswith", TargetFirst),
    entry("EndsWith", 1, "endswith", TargetFirst),
    entry("IndexOf", 1, "indexof", TargetFirst),
    entry("Replace", 2, "replace", TargetFirst),
    entry("Substring", 1, "substring", TargetFirst),
    entry("Substring", 2, "substring", TargetFirst),
    entry("Concat", 1, "concat", TargetFirst),
    entry("Length", 0, "length", TargetOnly),
    entry("ToLower", 0, "tolower", TargetOnly),
    entry("ToUpper", 0, "toupper", TargetOnly),
    entry("Trim", 0, "trim", TargetOnly),
    // Date parts
    entry("Year", 0, "year", TargetOnly),
    entry("Month", 0, "month", TargetOnly),
    entry("Day", 0, "day", TargetOnly),
    entry("Hour", 0, "hour", TargetOnly),
    entry("Minute", 0, "minute", TargetOnly),
    entry("Second", 0, "second", TargetOnly),
    v4_only("FractionalSeconds", "fractionalseconds"),
    v4_only("Date", "date"),
    v4_only("Time", "time"),
    v4_only("TotalOffsetMinutes", "totaloffsetminutes"),
    // Math
    entry("Round", 0, "round", TargetOnly),
    entry("Floor", 0, "floor", TargetOnly),
    entry("Ceiling", 0, "ceiling", TargetOnly),
];

/// Looks up a function by logical name and argument count.
///
/// Names match case-insensitively. Returns `None` when the pair is unknown
/// or the dialect has no equivalent.
///
/// # Examples
///
/// ```
/// use odata_engine::ProtocolVersion;
/// use odata_engine::ast::functions::{ArgumentOrder, lookup};
///
/// let f = lookup("contains", 1, ProtocolVersion::V3).unwrap();
/// assert_eq!(f.protocol_name, "substringof");
/// assert_eq!(f.order, ArgumentOrder::TargetLast);
///
/// assert!(lookup("Contains", 2, ProtocolVersion::V3).is_none());
/// ```
pub fn lookup(name: &str, arity: usize, version: ProtocolVersion) -> Option<FunctionDescriptor> {
    TABLE
        .iter()
        .find(|e| e.arity == arity && e.name.eq_ignore_ascii_case(name))
        .and_then(|e| match version {
            ProtocolVersion::V3 => e.v3,
            ProtocolVersion::V4 => e.v4,
        })
}

/// True when `name` is a zero-argument function usable as a trailing
/// path segment (`OrderDate.Year`).
pub fn is_segment_function(name: &str, version: ProtocolVersion) -> bool {
    lookup(name, 0, version).is_some()
}

/// All (logical name, argument count) pairs supported by a dialect.
pub fn supported(version: ProtocolVersion) -> impl Iterator<Item = (&'static str, usize, FunctionDescriptor)> {
    TABLE.iter().filter_map(move |e| {
        let descriptor = match version {
            ProtocolVersion::V3 => e.v3,
            ProtocolVersion::V4 => e.v4,
        };
        descriptor.map(|d| (e.name, e.arity, d))
    })
}
