//! Query translation: CQL trees to native query strings and SRU sort keys
//! to native sort specifications.

pub mod sort;
pub mod translator;

pub use self::sort::{
    MissingValue, NativeSort, SortCriterion, SortKey, translate_sort_key_list, translate_sort_keys,
};
pub use self::translator::{
    NoActiveResultSets, ResultSetLookup, escape_query_text, quote_if_contains_space, translate,
};
