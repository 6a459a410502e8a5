//! Parse, build and dump options, plus the attribute plug-in capabilities.

use std::fmt;
use std::sync::Arc;

use crate::slice::Slice;

/// What the dumper does with values that have no JSON equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedTypeBehavior {
    /// Emit `null` in place of the value.
    NullifyUnsupportedType,
    /// Emit a `"(non-representable type <name>)"` string.
    ConvertUnsupportedType,
    /// Abort the dump with [`Error::NoJsonEquivalent`](crate::Error::NoJsonEquivalent).
    #[default]
    FailOnUnsupportedType,
}

/// JSON dialect handled by the parser and dumper.
///
/// The VJSON dialect types quoted strings through a two-character prefix:
/// `s:` for plain strings, `b:` for base64 binary, `d:` for UTC dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    #[default]
    Json,
    VJson,
}

/// Bidirectional mapping between attribute names and small integer ids,
/// used to compact object keys.
pub trait AttributeTranslator {
    /// Map an attribute name to its id. `None` leaves the key untranslated.
    fn translate_name(&self, name: &[u8]) -> Option<u64>;

    /// Map an id back to the attribute name it stands for.
    fn translate_id(&self, id: u64) -> Option<&[u8]>;
}

/// Predicate deciding whether a just-parsed object key (and its value)
/// should be dropped from the output.
pub trait AttributeExcludeHandler {
    fn should_exclude(&self, key: Slice<'_>, nesting: usize) -> bool;
}

/// Options shared by the parser, builder and dumper.
#[derive(Clone)]
pub struct Options {
    /// Validate UTF-8 correctness of strings while JSON-parsing.
    pub validate_utf8_strings: bool,
    /// Reject duplicate attribute names when closing an object.
    pub check_attribute_uniqueness: bool,
    /// Order object entries lexicographically by attribute name before the
    /// hash table is constructed.
    pub sort_attribute_names: bool,
    /// Escape `/` as `\/` when dumping.
    pub escape_forward_slashes: bool,
    /// Indent dumped output.
    pub pretty_print: bool,
    /// Leave the outermost object or array open after parsing so that the
    /// builder can append further values before closing it.
    pub keep_top_level_open: bool,
    /// Close arrays in the compact (unindexed) representation.
    pub build_unindexed_arrays: bool,
    /// Close objects in the compact (unindexed) representation.
    pub build_unindexed_objects: bool,
    /// Dump policy for types without a JSON equivalent.
    pub unsupported_type_behavior: UnsupportedTypeBehavior,
    /// Optional key translator (name <-> integer id).
    pub attribute_translator: Option<Arc<dyn AttributeTranslator>>,
    /// Optional key exclusion predicate applied while parsing objects.
    pub attribute_exclude_handler: Option<Arc<dyn AttributeExcludeHandler>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            validate_utf8_strings: false,
            check_attribute_uniqueness: false,
            sort_attribute_names: true,
            escape_forward_slashes: false,
            pretty_print: false,
            keep_top_level_open: false,
            build_unindexed_arrays: false,
            build_unindexed_objects: false,
            unsupported_type_behavior: UnsupportedTypeBehavior::default(),
            attribute_translator: None,
            attribute_exclude_handler: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("validate_utf8_strings", &self.validate_utf8_strings)
            .field("check_attribute_uniqueness", &self.check_attribute_uniqueness)
            .field("sort_attribute_names", &self.sort_attribute_names)
            .field("escape_forward_slashes", &self.escape_forward_slashes)
            .field("pretty_print", &self.pretty_print)
            .field("keep_top_level_open", &self.keep_top_level_open)
            .field("build_unindexed_arrays", &self.build_unindexed_arrays)
            .field("build_unindexed_objects", &self.build_unindexed_objects)
            .field("unsupported_type_behavior", &self.unsupported_type_behavior)
            .field(
                "attribute_translator",
                &self.attribute_translator.as_ref().map(|_| ".."),
            )
            .field(
                "attribute_exclude_handler",
                &self.attribute_exclude_handler.as_ref().map(|_| ".."),
            )
            .finish()
    }
}
