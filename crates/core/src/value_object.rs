//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; two value objects with the same values
//! are equal. In this workspace they are also the place where input
//! normalization happens (e.g. an email address is trimmed and lowercased on
//! construction, so two spellings of the same address compare equal).

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**:
///
/// - `Email("alice@example.com")` is a value object
/// - `User { id: UserId(...), .. }` is an entity
///
/// Implementors should validate in their constructor so that holding an
/// instance is proof the value is well-formed.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
