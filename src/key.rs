//! Type identity keys used by the registry, the container and bind points.

use std::any::TypeId;
use std::fmt;

/// Identity of a concrete Rust type.
///
/// A `TypeKey` pairs the [`TypeId`] used for lookups with the type name used
/// for diagnostics and error messages. Two keys are equal when their
/// `TypeId`s are equal; the name never takes part in comparisons.
///
/// # Examples
///
/// ```rust
/// use ferrous_lifecycle::TypeKey;
///
/// struct Clock;
///
/// let key = TypeKey::of::<Clock>();
/// assert_eq!(key, TypeKey::of::<Clock>());
/// assert_ne!(key, TypeKey::of::<String>());
/// assert!(key.name().ends_with("Clock"));
/// assert_eq!(key.short_name(), "Clock");
/// ```
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of the concrete type `T`.
    #[inline(always)]
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name as reported by `std::any::type_name`.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path (generic arguments are kept as-is).
    ///
    /// ```rust
    /// use ferrous_lifecycle::TypeKey;
    ///
    /// assert_eq!(TypeKey::of::<String>().short_name(), "String");
    /// assert_eq!(TypeKey::of::<u32>().short_name(), "u32");
    /// ```
    pub fn short_name(&self) -> &'static str {
        let base = match self.name.find('<') {
            Some(generic) => &self.name[..generic],
            None => self.name,
        };
        match base.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

// Equality and hashing look at the TypeId only
impl PartialEq for TypeKey {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
