use crate::di::{Args, In, Instance, Key};
use std::fmt;
use std::sync::{Arc, Mutex, TryLockError};

/// Type-erased constructor stored in a node.
pub(crate) type ConstructorFn = Arc<dyn Fn(&Args) -> anyhow::Result<Instance> + Send + Sync>;

/// A registered value or constructor.
pub(crate) struct Node {
    pub(crate) key: Key,
    pub(crate) kind: NodeKind,
}

pub(crate) enum NodeKind {
    Value(Instance),
    Constructor {
        inputs: In,
        constructor: ConstructorFn,
        /// Held for the whole construction so concurrent first resolutions
        /// wait on a single in-flight call.
        cache: Mutex<Option<Instance>>,
    },
}

impl Node {
    pub(crate) fn value(key: Key, instance: Instance) -> Self {
        Self {
            key,
            kind: NodeKind::Value(instance),
        }
    }

    pub(crate) fn constructor(key: Key, inputs: In, constructor: ConstructorFn) -> Self {
        Self {
            key,
            kind: NodeKind::Constructor {
                inputs,
                constructor,
                cache: Mutex::new(None),
            },
        }
    }

    /// Declared inputs; values have none.
    pub(crate) fn inputs(&self) -> Option<&In> {
        match &self.kind {
            NodeKind::Value(_) => None,
            NodeKind::Constructor { inputs, .. } => Some(inputs),
        }
    }

    /// The already available value, if any. Never blocks on an in-flight
    /// construction.
    pub(crate) fn cached(&self) -> Option<Instance> {
        match &self.kind {
            NodeKind::Value(instance) => Some(instance.clone()),
            NodeKind::Constructor { cache, .. } => match cache.try_lock() {
                Ok(guard) => guard.clone(),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().clone(),
                Err(TryLockError::WouldBlock) => None,
            },
        }
    }

    pub(crate) fn is_cached(&self) -> bool {
        match &self.kind {
            NodeKind::Value(_) => true,
            NodeKind::Constructor { cache, .. } => cache
                .try_lock()
                .map(|guard| guard.is_some())
                .unwrap_or(false),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Value(_) => write!(f, "(value) {}", self.key),
            NodeKind::Constructor { inputs, .. } => {
                let deps: Vec<String> = inputs.iter().map(|p| p.key.to_string()).collect();
                write!(
                    f,
                    "(constructor) {}, deps: [{}], cached: {}",
                    self.key,
                    deps.join(", "),
                    self.is_cached()
                )
            }
        }
    }
}
