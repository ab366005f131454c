//! Process-wide interning of attribute names.
//!
//! Every name that reaches a shape transition or a call site is interned once,
//! so comparing two names is a single pointer comparison and hashing a name
//! never touches its bytes.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

// =============================================================================
// Interned String
// =============================================================================

/// An interned, immutable string.
///
/// Two `InternedString`s are equal iff they were produced by interning the
/// same text, which is checked by pointer identity.
#[derive(Clone)]
pub struct InternedString(Arc<str>);

impl InternedString {
    /// Get the string contents.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address of the interned allocation.
    #[inline]
    fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl PartialEq for InternedString {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for InternedString {}

impl Hash for InternedString {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl PartialEq<str> for InternedString {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl AsRef<str> for InternedString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Interner
// =============================================================================

/// The interned string table.
struct Interner {
    strings: Mutex<FxHashSet<Arc<str>>>,
}

impl Interner {
    fn new() -> Self {
        Self {
            strings: Mutex::new(FxHashSet::default()),
        }
    }

    fn intern(&self, text: &str) -> InternedString {
        let mut strings = self.strings.lock();
        if let Some(existing) = strings.get(text) {
            return InternedString(Arc::clone(existing));
        }
        let fresh: Arc<str> = Arc::from(text);
        strings.insert(Arc::clone(&fresh));
        InternedString(fresh)
    }

    fn len(&self) -> usize {
        self.strings.lock().len()
    }
}

static INTERNER: OnceLock<Interner> = OnceLock::new();

#[inline]
fn interner() -> &'static Interner {
    INTERNER.get_or_init(Interner::new)
}

/// Intern a string, returning the canonical instance for its text.
pub fn intern(text: &str) -> InternedString {
    interner().intern(text)
}

/// Number of distinct strings interned so far.
pub fn interned_count() -> usize {
    interner().len()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_intern_same_text_same_instance() {
        let a = intern("alpha");
        let b = intern("alpha");
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn test_intern_different_text() {
        assert_ne!(intern("left"), intern("right"));
    }

    #[test]
    fn test_intern_empty_string() {
        let empty = intern("");
        assert_eq!(empty.as_str(), "");
        assert_eq!(empty, intern(""));
    }

    #[test]
    fn test_interned_count_grows_once() {
        let before = interned_count();
        let _ = intern("test_interned_count_grows_once_unique");
        let _ = intern("test_interned_count_grows_once_unique");
        assert_eq!(interned_count(), before + 1);
    }

    #[test]
    fn test_interned_as_map_key() {
        let mut map = FxHashMap::default();
        map.insert(intern("x"), 1);
        map.insert(intern("y"), 2);
        assert_eq!(map.get(&intern("x")), Some(&1));
        assert_eq!(map.get(&intern("y")), Some(&2));
        assert_eq!(map.get(&intern("z")), None);
    }

    #[test]
    fn test_display_and_compare_with_str() {
        let name = intern("attr");
        assert_eq!(name.to_string(), "attr");
        assert!(name == *"attr");
        assert_eq!(format!("{:?}", name), "\"attr\"");
    }

    #[test]
    fn test_intern_across_threads() {
        use std::thread;

        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| intern("shared_across_threads")))
            .collect();
        let names: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for name in &names {
            assert_eq!(name, &names[0]);
        }
    }
}
