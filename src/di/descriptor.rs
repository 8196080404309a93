use crate::di::{Instance, Key};
use crate::error::{Error, Result};
use std::sync::Arc;

/// One declared input of a constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub field: &'static str,
    pub key: Key,
    pub optional: bool,
}

impl Param {
    /// Required input of type `T`
    pub fn of<T: 'static + Send + Sync>(field: &'static str) -> Self {
        Self {
            field,
            key: Key::of::<T>(),
            optional: false,
        }
    }

    /// Required input of type `T` registered under `name`
    pub fn named<T: 'static + Send + Sync>(field: &'static str, name: &str) -> Self {
        Self {
            field,
            key: Key::named::<T>(name),
            optional: false,
        }
    }

    /// Mark this input as optional; it resolves to `None` when nothing is
    /// registered for its key.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Ordered input descriptor for a constructor or an invoked function.
///
/// Declares what a constructor needs up front instead of discovering it from
/// the constructor's signature.
///
/// # Example
/// ```
/// use keystone::di::{In, Param};
///
/// struct Config;
/// struct Metrics;
///
/// let inputs = In::new()
///     .param(Param::of::<Config>("config"))
///     .param(Param::of::<Metrics>("metrics").optional());
/// assert_eq!(inputs.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct In {
    params: Vec<Param>,
}

impl In {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Shorthand for a required, unqualified input
    pub fn with<T: 'static + Send + Sync>(self, field: &'static str) -> Self {
        self.param(Param::of::<T>(field))
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<Param> for In {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Resolved inputs handed to a constructor, in declared order.
pub struct Args {
    owner: Key,
    params: Vec<Param>,
    values: Vec<Option<Instance>>,
}

impl Args {
    pub(crate) fn new(owner: Key, params: Vec<Param>, values: Vec<Option<Instance>>) -> Self {
        debug_assert_eq!(params.len(), values.len());
        Self {
            owner,
            params,
            values,
        }
    }

    /// The key of the node these arguments were resolved for
    pub fn owner(&self) -> &Key {
        &self.owner
    }

    /// Fetch a required input by field name
    ///
    /// # Errors
    /// Fails if no input was declared under `field`, if the input was optional
    /// and absent, or if it holds a different type.
    pub fn get<T: 'static + Send + Sync>(&self, field: &str) -> Result<Arc<T>> {
        self.optional::<T>(field)?
            .ok_or_else(|| Error::MissingDependency {
                key: self.key_of(field).unwrap_or_else(Key::of::<T>),
                required_by: Some(self.owner.clone()),
            })
    }

    /// Fetch an optional input by field name, `None` if it was not registered
    pub fn optional<T: 'static + Send + Sync>(&self, field: &str) -> Result<Option<Arc<T>>> {
        let index = self
            .params
            .iter()
            .position(|p| p.field == field)
            .ok_or_else(|| Error::UnknownField {
                owner: self.owner.clone(),
                field: field.to_string(),
            })?;

        match &self.values[index] {
            Some(instance) => downcast::<T>(instance.clone()).map(Some),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn key_of(&self, field: &str) -> Option<Key> {
        self.params
            .iter()
            .find(|p| p.field == field)
            .map(|p| p.key.clone())
    }
}

pub(crate) fn downcast<T: 'static + Send + Sync>(instance: Instance) -> Result<Arc<T>> {
    instance.downcast::<T>().map_err(|_| Error::DowncastFailed {
        type_name: std::any::type_name::<T>().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner;
    struct Config {
        port: u16,
    }
    struct Metrics;

    fn args() -> Args {
        let inputs = In::new()
            .with::<Config>("config")
            .param(Param::of::<Metrics>("metrics").optional());
        Args::new(
            Key::of::<Owner>(),
            inputs.params().to_vec(),
            vec![Some(Arc::new(Config { port: 8080 }) as Instance), None],
        )
    }

    #[test]
    fn test_get_by_field() {
        let args = args();
        assert_eq!(args.get::<Config>("config").unwrap().port, 8080);
        assert!(args.optional::<Metrics>("metrics").unwrap().is_none());
    }

    #[test]
    fn test_absent_optional_is_error_when_required() {
        let err = args().get::<Metrics>("metrics").err().unwrap();
        assert!(matches!(err, Error::MissingDependency { .. }));
    }

    #[test]
    fn test_wrong_type_fails_downcast() {
        let err = args().get::<Metrics>("config").err().unwrap();
        assert!(matches!(err, Error::DowncastFailed { .. }));
    }

    #[test]
    fn test_unknown_field_is_named() {
        let err = args().get::<Config>("cfg").err().unwrap();
        assert!(matches!(&err, Error::UnknownField { field, .. } if field == "cfg"));
        assert!(err.to_string().contains("no input named \"cfg\""));
    }
}
