//! `PropertySet` for pass communication.
//!
//! Passes of one pipeline share results through a [`PropertySet`]: the
//! transformation rules pass leaves its [`TransformationStatistics`], the
//! validation pass its [`ValidationReport`]. Any other `'static` type can be
//! stored as well, keyed by its type.
//!
//! [`TransformationStatistics`]: crate::passes::TransformationStatistics
//! [`ValidationReport`]: crate::passes::ValidationReport
//!
//! # Example
//!
//! ```
//! use qat_compile::PropertySet;
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct CallCount(usize);
//!
//! let mut props = PropertySet::new();
//! props.insert(CallCount(3));
//!
//! assert_eq!(props.get::<CallCount>(), Some(&CallCount(3)));
//! props.get_mut::<CallCount>().unwrap().0 += 1;
//! assert_eq!(props.remove::<CallCount>(), Some(CallCount(4)));
//! assert!(props.is_empty());
//! ```

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;

/// Type-keyed storage shared by the passes of a pipeline.
#[derive(Debug, Default)]
pub struct PropertySet {
    /// Properties storage (type-erased).
    custom: FxHashMap<TypeId, Box<dyn Any>>,
}

impl PropertySet {
    /// Create a new empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a property, replacing any previous value of the same type.
    pub fn insert<T: Any>(&mut self, value: T) {
        self.custom.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a property.
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.custom
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Get a mutable property.
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.custom
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Remove a property.
    pub fn remove<T: Any>(&mut self) -> Option<T> {
        self.custom
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|v| *v)
    }

    /// Check if a property of type `T` is present.
    pub fn contains<T: Any>(&self) -> bool {
        self.custom.contains_key(&TypeId::of::<T>())
    }

    /// Number of stored properties.
    pub fn len(&self) -> usize {
        self.custom.len()
    }

    /// Check if no property is stored.
    pub fn is_empty(&self) -> bool {
        self.custom.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::items_after_statements)]
    fn test_property_set_custom() {
        let mut props = PropertySet::new();

        #[derive(Debug, PartialEq)]
        struct CustomData(i32);

        props.insert(CustomData(42));
        assert!(props.contains::<CustomData>());
        assert_eq!(props.get::<CustomData>(), Some(&CustomData(42)));

        props.insert(CustomData(7));
        assert_eq!(props.len(), 1);

        let removed = props.remove::<CustomData>();
        assert_eq!(removed, Some(CustomData(7)));
        assert_eq!(props.get::<CustomData>(), None);
    }
}
