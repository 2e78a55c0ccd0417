//! Internal implementation details.

pub(crate) mod arena;

pub(crate) use arena::{Arena, RawHandle};

#[cfg(feature = "ahash")]
pub(crate) type FastMap<K, V> = ahash::AHashMap<K, V>;
#[cfg(not(feature = "ahash"))]
pub(crate) type FastMap<K, V> = std::collections::HashMap<K, V>;

#[cfg(feature = "ahash")]
pub(crate) type FastSet<K> = ahash::AHashSet<K>;
#[cfg(not(feature = "ahash"))]
pub(crate) type FastSet<K> = std::collections::HashSet<K>;

/// Per-object list of link handles. Most objects hold a handful of links.
#[cfg(feature = "smallvec")]
pub(crate) type LinkList = smallvec::SmallVec<[crate::dependency::LinkId; 4]>;
#[cfg(not(feature = "smallvec"))]
pub(crate) type LinkList = Vec<crate::dependency::LinkId>;
