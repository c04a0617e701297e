//! Schema name resolution.
//!
//! Formatting needs exact, case-correct names for collections, properties,
//! navigation links and operations. Parsing the service's metadata document
//! is outside this crate; callers plug in a [`MetadataResolver`]. The
//! in-memory [`Schema`] implementation covers tests and services whose shape
//! is known up front.

use std::collections::HashMap;

/// An identifier the schema does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Name not found: '{0}'")]
pub struct NameNotFound(pub String);

/// Read-only view of a service schema.
///
/// Implementations are shared across concurrent formatting calls, hence the
/// `Send + Sync` bound.
pub trait MetadataResolver: Send + Sync {
    /// Exact entity set name for a possibly miscased or singular/plural name.
    fn exact_collection_name(&self, name: &str) -> Result<String, NameNotFound>;

    /// Exact structural property name within a collection.
    fn exact_field_name(&self, collection: &str, name: &str) -> Result<String, NameNotFound>;

    /// Exact navigation property name within a collection.
    fn exact_navigation_name(&self, collection: &str, name: &str) -> Result<String, NameNotFound>;

    fn is_navigation_multivalued(&self, collection: &str, name: &str) -> Result<bool, NameNotFound>;

    /// Collection the navigation property points at.
    fn navigation_target_collection(&self, collection: &str, name: &str) -> Result<String, NameNotFound>;

    /// Namespace-qualified name of a function or action.
    fn function_qualified_name(&self, name: &str) -> Result<String, NameNotFound>;

    /// Namespace-qualified name of an entity type, used for cast segments.
    fn qualified_type_name(&self, name: &str) -> Result<String, NameNotFound> {
        Ok(name.to_string())
    }

    /// True when the property is string-typed.
    fn is_string_field(&self, _collection: &str, _name: &str) -> bool {
        false
    }
}

/// Kind of a structural property, as far as formatting cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Other,
}

#[derive(Debug, Clone)]
struct Navigation {
    name: String,
    target: String,
    multivalued: bool,
}

#[derive(Debug, Clone, Default)]
struct CollectionDef {
    name: String,
    fields: Vec<(String, FieldKind)>,
    navigations: Vec<Navigation>,
}

/// In-memory schema.
///
/// Lookups try the exact name, then a case-insensitive match, then the
/// singular/plural counterpart (`Product` ↔ `Products`, `Category` ↔
/// `Categories`).
///
/// # Examples
///
/// ```
/// use odata_engine::metadata::{FieldKind, MetadataResolver, Schema};
///
/// let schema = Schema::new("NorthwindModel")
///     .collection("Products")
///     .field("Products", "ProductName", FieldKind::String)
///     .navigation("Products", "Category", "Categories", false);
///
/// assert_eq!(schema.exact_collection_name("product").unwrap(), "Products");
/// assert_eq!(schema.exact_field_name("Products", "productname").unwrap(), "ProductName");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Schema {
    namespace: String,
    collections: Vec<CollectionDef>,
    functions: HashMap<String, String>,
}

impl Schema {
    pub fn new(namespace: impl Into<String>) -> Self {
        Schema {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn collection(mut self, name: &str) -> Self {
        if self.find_collection(name).is_none() {
            self.collections.push(CollectionDef {
                name: name.to_string(),
                ..Default::default()
            });
        }
        self
    }

    pub fn field(mut self, collection: &str, name: &str, kind: FieldKind) -> Self {
        self = self.collection(collection);
        if let Some(def) = self.collection_mut(collection) {
            def.fields.push((name.to_string(), kind));
        }
        self
    }

    pub fn navigation(mut self, collection: &str, name: &str, target: &str, multivalued: bool) -> Self {
        self = self.collection(collection);
        if let Some(def) = self.collection_mut(collection) {
            def.navigations.push(Navigation {
                name: name.to_string(),
                target: target.to_string(),
                multivalued,
            });
        }
        self
    }

    /// Registers a function or action; it resolves to `Namespace.Name`.
    pub fn function(mut self, name: &str) -> Self {
        let qualified = format!("{}.{}", self.namespace, name);
        self.functions.insert(name.to_string(), qualified);
        self
    }

    fn find_collection(&self, name: &str) -> Option<&CollectionDef> {
        find_by_name(&self.collections, name, |c| &c.name)
    }

    fn collection_mut(&mut self, name: &str) -> Option<&mut CollectionDef> {
        let idx = self
            .collections
            .iter()
            .position(|c| c.name == name)?;
        self.collections.get_mut(idx)
    }

    fn resolve_collection(&self, name: &str) -> Result<&CollectionDef, NameNotFound> {
        self.find_collection(name)
            .ok_or_else(|| NameNotFound(name.to_string()))
    }

    fn resolve_navigation(&self, collection: &str, name: &str) -> Result<&Navigation, NameNotFound> {
        let def = self.resolve_collection(collection)?;
        find_by_name(&def.navigations, name, |n| &n.name)
            .ok_or_else(|| NameNotFound(format!("{}.{}", def.name, name)))
    }
}

impl MetadataResolver for Schema {
    fn exact_collection_name(&self, name: &str) -> Result<String, NameNotFound> {
        self.resolve_collection(name).map(|c| c.name.clone())
    }

    fn exact_field_name(&self, collection: &str, name: &str) -> Result<String, NameNotFound> {
        let def = self.resolve_collection(collection)?;
        find_by_name(&def.fields, name, |(n, _)| n)
            .map(|(n, _)| n.clone())
            .ok_or_else(|| NameNotFound(format!("{}.{}", def.name, name)))
    }

    fn exact_navigation_name(&self, collection: &str, name: &str) -> Result<String, NameNotFound> {
        self.resolve_navigation(collection, name).map(|n| n.name.clone())
    }

    fn is_navigation_multivalued(&self, collection: &str, name: &str) -> Result<bool, NameNotFound> {
        self.resolve_navigation(collection, name).map(|n| n.multivalued)
    }

    fn navigation_target_collection(&self, collection: &str, name: &str) -> Result<String, NameNotFound> {
        let target = &self.resolve_navigation(collection, name)?.target;
        self.exact_collection_name(target)
    }

    fn function_qualified_name(&self, name: &str) -> Result<String, NameNotFound> {
        self.functions
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| NameNotFound(name.to_string()))
    }

    fn qualified_type_name(&self, name: &str) -> Result<String, NameNotFound> {
        if name.contains('.') {
            Ok(name.to_string())
        } else {
            Ok(format!("{}.{}", self.namespace, name))
        }
    }

    fn is_string_field(&self, collection: &str, name: &str) -> bool {
        self.find_collection(collection)
            .and_then(|def| find_by_name(&def.fields, name, |(n, _)| n))
            .is_some_and(|(_, kind)| *kind == FieldKind::String)
    }
}

fn find_by_name<'a, T>(items: &'a [T], name: &str, key: impl Fn(&T) -> &String) -> Option<&'a T> {
    items
        .iter()
        .find(|item| key(item) == name)
        .or_else(|| items.iter().find(|item| key(item).eq_ignore_ascii_case(name)))
        .or_else(|| {
            items.iter().find(|item| {
                let candidate = key(item);
                number_variants(name)
                    .iter()
                    .any(|variant| candidate.eq_ignore_ascii_case(variant))
            })
        })
}

/// Singular and plural spellings of an English noun, good enough for
/// entity set names.
fn number_variants(name: &str) -> Vec<String> {
    let lower = name.to_ascii_lowercase();
    let mut variants = Vec::new();

    if let Some(stem) = lower.strip_suffix("ies") {
        variants.push(format!("{}y", stem));
    } else if let Some(stem) = lower.strip_suffix("es") {
        variants.push(stem.to_string());
        variants.push(format!("{}e", stem));
    } else if let Some(stem) = lower.strip_suffix('s') {
        variants.push(stem.to_string());
    }

    if let Some(stem) = lower.strip_suffix('y') {
        variants.push(format!("{}ies", stem));
    }
    variants.push(format!("{}s", lower));
    variants.push(format!("{}es", lower));
    variants
}
