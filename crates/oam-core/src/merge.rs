//! A type that can be merged with itself.
//!
//! Used for the Policy Engine's override layering (a partial patch applied
//! after trait patches) and for trait `patch` blocks that fall back to
//! plain record merge rather than the strategic by-key merge. Exists for
//! the "tighter scope wins, fall back to defaults" layering problem that
//! shows up anywhere overrides stack on top of base configuration.
//!
//! ```
//! use oam_core::merge::Merge;
//!
//! #[derive(oam_macros::Merge, Debug, PartialEq, Eq)]
//! struct Override {
//!     replicas: Option<u32>,
//!     image: Option<String>,
//! }
//!
//! let mut effective = Override { replicas: Some(3), image: None };
//! effective.merge(&Override { replicas: Some(1), image: Some("nginx".into()) });
//! assert_eq!(effective, Override { replicas: Some(3), image: Some("nginx".into()) });
//! ```
pub trait Merge {
    /// Merge with `defaults`, preferring values already set on `self`.
    fn merge(&mut self, defaults: &Self);
}

/// Marker for scalar types merged atomically: "set" beats "unset", there is
/// no merging of sub-fields.
trait Atomic: Clone {}
impl Atomic for u8 {}
impl Atomic for u16 {}
impl Atomic for u32 {}
impl Atomic for u64 {}
impl Atomic for i8 {}
impl Atomic for i16 {}
impl Atomic for i32 {}
impl Atomic for i64 {}
impl Atomic for bool {}
impl Atomic for String {}
impl Atomic for serde_json::Value {}

impl<T: Atomic> Merge for Option<T> {
    fn merge(&mut self, defaults: &Self) {
        if self.is_none() {
            self.clone_from(defaults);
        }
    }
}

impl<T: Clone> Merge for Vec<T> {
    /// Lists merge atomically too: a non-empty `self` is left untouched,
    /// an empty one is replaced wholesale by `defaults`. Elementwise,
    /// strategic-merge-by-key behaviour lives in `oam-render::patch`
    /// instead, since it needs the JSON-path context a blanket `Merge` impl
    /// does not have.
    fn merge(&mut self, defaults: &Self) {
        if self.is_empty() {
            self.clone_from(defaults);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Merge;

    fn merge<T: Merge>(mut overrides: T, defaults: &T) -> T {
        overrides.merge(defaults);
        overrides
    }

    #[test]
    fn option_prefers_self() {
        assert_eq!(merge(Some(1u32), &Some(2u32)), Some(1u32));
    }

    #[test]
    fn option_falls_back_to_defaults() {
        assert_eq!(merge(None::<u32>, &Some(2u32)), Some(2u32));
    }

    #[test]
    fn empty_vec_falls_back() {
        assert_eq!(merge(Vec::<u32>::new(), &vec![1, 2]), vec![1, 2]);
    }

    #[test]
    fn non_empty_vec_is_kept() {
        assert_eq!(merge(vec![9], &vec![1, 2]), vec![9]);
    }
}
