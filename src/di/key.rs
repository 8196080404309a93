use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A type-erased, shareable value stored in the graph.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Identity under which a node is registered and resolved.
///
/// A key is the produced type plus an optional name qualifier, so two
/// constructors may produce the same type as long as they are named apart.
///
/// # Example
/// ```
/// use keystone::di::Key;
///
/// struct Pool;
///
/// let primary = Key::named::<Pool>("primary");
/// assert_ne!(primary, Key::of::<Pool>());
/// assert_eq!(primary.name(), Some("primary"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    type_id: TypeId,
    type_name: &'static str,
    name: Option<Arc<str>>,
}

impl Key {
    /// Key for the unqualified type `T`
    pub fn of<T: 'static + ?Sized>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            name: None,
        }
    }

    /// Key for `T` qualified by `name`
    pub fn named<T: 'static + ?Sized>(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::of::<T>()
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether this key identifies values of type `T`, ignoring the qualifier
    pub fn is<T: 'static + ?Sized>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}[name=\"{}\"]", self.type_name, name),
            None => f.write_str(self.type_name),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Database;

    #[test]
    fn test_named_keys_are_distinct() {
        assert_eq!(Key::of::<Database>(), Key::of::<Database>());
        assert_ne!(Key::of::<Database>(), Key::named::<Database>("ro"));
        assert_ne!(Key::named::<Database>("ro"), Key::named::<Database>("rw"));
        assert!(Key::named::<Database>("ro").is::<Database>());
    }

    #[test]
    fn test_display_includes_qualifier() {
        let key = Key::named::<Database>("primary");
        assert!(key.to_string().ends_with("Database[name=\"primary\"]"));
        assert!(!Key::of::<Database>().to_string().contains("name="));
    }
}
