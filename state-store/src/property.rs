//! Property trait for typed, persisted state values
//!
//! A property is one field of the persisted record. Its `KEY` is the name
//! the value is stored under, so renaming a key is a schema change.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use state_store::Property;
//!
//! #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
//! pub struct DeliveryAddress(pub String);
//!
//! impl Property for DeliveryAddress {
//!     const KEY: &'static str = "delivery_address";
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Marker trait for values that can be stored in a [`StateStore`](crate::StateStore)
///
/// Properties must be:
/// - Serialize + DeserializeOwned: values are persisted as JSON
/// - Clone: reads hand out owned copies
/// - PartialEq: unchanged writes are skipped
/// - Send + Sync + 'static: the store is shared across threads
pub trait Property: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    /// Key this property is persisted under
    ///
    /// Must be unique within one store.
    const KEY: &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
    struct TestProperty(i32);

    impl Property for TestProperty {
        const KEY: &'static str = "test_property";
    }

    #[test]
    fn test_property_key() {
        assert_eq!(TestProperty::KEY, "test_property");
    }

    #[test]
    fn test_property_roundtrips_through_json() {
        let value = serde_json::to_value(TestProperty(42)).unwrap();
        let back: TestProperty = serde_json::from_value(value).unwrap();
        assert_eq!(back, TestProperty(42));
    }
}
