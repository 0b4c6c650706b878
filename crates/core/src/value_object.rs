//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their
//! attribute values. A shelf location or a normalized item identifier are
//! value objects, an audit session is not.

/// Marker trait for value objects.
///
/// Implementors are immutable and compared by value. To "modify" one, build a
/// new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
