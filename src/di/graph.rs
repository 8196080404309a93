use crate::di::descriptor::downcast;
use crate::di::node::{ConstructorFn, Node, NodeKind};
use crate::di::{Args, In, Injectable, Instance, Key};
use crate::error::{Error, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError};

/// Marker type used to key the arguments of an invoked function.
struct Invocation;

/// Registry of values and constructors, resolved lazily and cached per key.
///
/// Every key maps to exactly one node. A constructor runs at most once for
/// the lifetime of the graph; every later resolution of its key, direct or
/// as somebody's dependency, gets the same instance back.
///
/// # Example
/// ```
/// use keystone::di::{Graph, In};
///
/// struct Config { url: String }
/// struct Database { url: String }
///
/// let graph = Graph::new();
/// graph.register_value(Config { url: "postgres://localhost".into() }).unwrap();
/// graph
///     .register_constructor(In::new().with::<Config>("config"), |args| {
///         let config = args.get::<Config>("config")?;
///         Ok(Database { url: config.url.clone() })
///     })
///     .unwrap();
///
/// let db = graph.resolve::<Database>().unwrap();
/// assert_eq!(db.url, "postgres://localhost");
/// ```
pub struct Graph {
    nodes: DashMap<Key, Arc<Node>>,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    /// Register an already constructed value under its own type
    pub fn register_value<T: 'static + Send + Sync>(&self, value: T) -> Result<()> {
        self.insert(Node::value(Key::of::<T>(), Arc::new(value)))
    }

    /// Register an already constructed value under `name`
    pub fn register_named_value<T: 'static + Send + Sync>(
        &self,
        name: &str,
        value: T,
    ) -> Result<()> {
        self.insert(Node::value(Key::named::<T>(name), Arc::new(value)))
    }

    /// Register a value that is already shared elsewhere.
    ///
    /// Resolving `T` hands out clones of this exact `Arc`.
    pub fn register_shared<T: 'static + Send + Sync>(&self, value: Arc<T>) -> Result<()> {
        self.insert(Node::value(Key::of::<T>(), value))
    }

    /// Register a constructor for `T` with its declared inputs
    ///
    /// The constructor is not called here; it runs on the first resolution
    /// that needs `T`.
    pub fn register_constructor<T, F>(&self, inputs: In, constructor: F) -> Result<()>
    where
        T: 'static + Send + Sync,
        F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(Node::constructor(
            Key::of::<T>(),
            inputs,
            erase(constructor),
        ))
    }

    /// Register a constructor for `T` under `name`
    pub fn register_named_constructor<T, F>(
        &self,
        name: &str,
        inputs: In,
        constructor: F,
    ) -> Result<()>
    where
        T: 'static + Send + Sync,
        F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.insert(Node::constructor(
            Key::named::<T>(name),
            inputs,
            erase(constructor),
        ))
    }

    /// Register a type that describes its own inputs and constructor
    pub fn register<T: Injectable>(&self) -> Result<()> {
        self.register_constructor(T::inputs(), T::construct)
    }

    /// Resolve the unqualified `T`
    pub fn resolve<T: 'static + Send + Sync>(&self) -> Result<Arc<T>> {
        downcast(self.resolve_key(&Key::of::<T>())?)
    }

    /// Resolve `T` registered under `name`
    pub fn resolve_named<T: 'static + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        downcast(self.resolve_key(&Key::named::<T>(name))?)
    }

    /// Resolve a key into its type-erased value, constructing dependencies
    /// first.
    ///
    /// # Errors
    /// - [`Error::MissingDependency`] if `key` or anything it transitively
    ///   requires is not registered. Nothing is constructed in that case.
    /// - [`Error::CircularDependency`] if the dependencies loop back.
    /// - [`Error::Constructor`] if a constructor fails. Failures are not
    ///   cached, a later resolution calls the constructor again.
    pub fn resolve_key(&self, key: &Key) -> Result<Instance> {
        let node = self.node(key).ok_or_else(|| Error::MissingDependency {
            key: key.clone(),
            required_by: None,
        })?;

        if let Some(instance) = node.cached() {
            return Ok(instance);
        }

        self.verify(&node)?;
        self.build(&node, &mut Vec::new())
    }

    /// Resolve `inputs` and call `function` with them.
    ///
    /// This is how a composition root pulls its top-level components out of
    /// the graph. `name` only shows up in errors and logs.
    pub fn invoke<R, F>(&self, name: &str, inputs: &In, function: F) -> Result<R>
    where
        F: FnOnce(&Args) -> anyhow::Result<R>,
    {
        let owner = Key::named::<Invocation>(name);
        let mut values = Vec::with_capacity(inputs.len());

        for param in inputs.iter() {
            match self.node(&param.key) {
                Some(node) => {
                    self.verify(&node)?;
                    values.push(Some(self.build(&node, &mut vec![owner.clone()])?));
                }
                None if param.optional => values.push(None),
                None => {
                    return Err(Error::MissingDependency {
                        key: param.key.clone(),
                        required_by: Some(owner),
                    });
                }
            }
        }

        tracing::info!(function = name, "invoke");
        let args = Args::new(owner, inputs.params().to_vec(), values);
        function(&args).map_err(|source| {
            tracing::error!(function = name, error = %source, "invoke failed");
            Error::InvokeFailed {
                function: name.to_string(),
                source,
            }
        })
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn contains_type<T: 'static>(&self) -> bool {
        self.contains(&Key::of::<T>())
    }

    /// Whether `key` already has a value that resolution would hand out
    /// without calling a constructor
    pub fn is_cached(&self, key: &Key) -> bool {
        self.node(key).is_some_and(|node| node.is_cached())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&self, node: Node) -> Result<()> {
        match self.nodes.entry(node.key.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateRegistration { key: node.key }),
            Entry::Vacant(slot) => {
                tracing::debug!(key = %node.key, "providing");
                slot.insert(Arc::new(node));
                Ok(())
            }
        }
    }

    fn node(&self, key: &Key) -> Option<Arc<Node>> {
        self.nodes.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Walk everything `root` transitively needs and fail before any
    /// constructor runs if a required key is missing or the inputs loop.
    fn verify(&self, root: &Node) -> Result<()> {
        let mut path = Vec::new();
        let mut done = HashSet::new();
        self.visit(root, &mut path, &mut done)
    }

    fn visit(&self, node: &Node, path: &mut Vec<Key>, done: &mut HashSet<Key>) -> Result<()> {
        if done.contains(&node.key) || node.is_cached() {
            return Ok(());
        }
        let Some(inputs) = node.inputs() else {
            return Ok(());
        };

        for param in inputs.iter() {
            if !param.optional && !self.contains(&param.key) {
                return Err(Error::MissingDependency {
                    key: param.key.clone(),
                    required_by: Some(node.key.clone()),
                });
            }
        }

        path.push(node.key.clone());
        for param in inputs.iter() {
            if let Some(start) = path.iter().position(|k| *k == param.key) {
                return Err(circular(&path[start..], &param.key));
            }
            if let Some(dependency) = self.node(&param.key) {
                self.visit(&dependency, path, done)?;
            }
        }
        path.pop();

        done.insert(node.key.clone());
        Ok(())
    }

    fn build(&self, node: &Node, path: &mut Vec<Key>) -> Result<Instance> {
        let (inputs, constructor, cache) = match &node.kind {
            NodeKind::Value(instance) => return Ok(instance.clone()),
            NodeKind::Constructor {
                inputs,
                constructor,
                cache,
            } => (inputs, constructor, cache),
        };

        if let Some(start) = path.iter().position(|k| *k == node.key) {
            return Err(circular(&path[start..], &node.key));
        }

        let mut slot = cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(instance) = slot.as_ref() {
            return Ok(instance.clone());
        }

        path.push(node.key.clone());
        let mut values = Vec::with_capacity(inputs.len());
        for param in inputs.iter() {
            match self.node(&param.key) {
                Some(dependency) => values.push(Some(self.build(&dependency, path)?)),
                None if param.optional => values.push(None),
                None => {
                    return Err(Error::MissingDependency {
                        key: param.key.clone(),
                        required_by: Some(node.key.clone()),
                    });
                }
            }
        }
        path.pop();

        tracing::debug!(key = %node.key, "constructing");
        let args = Args::new(node.key.clone(), inputs.params().to_vec(), values);
        let instance = constructor(&args).map_err(|source| {
            tracing::error!(key = %node.key, error = %source, "constructor failed");
            Error::Constructor {
                key: node.key.clone(),
                source,
            }
        })?;

        *slot = Some(instance.clone());
        Ok(instance)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nodes: Vec<String> = self
            .nodes
            .iter()
            .map(|entry| format!("{:?}", entry.value()))
            .collect();
        f.debug_struct("Graph").field("nodes", &nodes).finish()
    }
}

fn erase<T, F>(constructor: F) -> ConstructorFn
where
    T: 'static + Send + Sync,
    F: Fn(&Args) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Arc::new(move |args: &Args| constructor(args).map(|value| Arc::new(value) as Instance))
}

fn circular(cycle: &[Key], back_to: &Key) -> Error {
    let mut names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
    names.push(back_to.to_string());
    Error::CircularDependency {
        cycle: names.join(" -> "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Connection {
        id: usize,
    }

    struct Users {
        conn: Arc<Connection>,
    }

    struct Orders {
        conn: Arc<Connection>,
    }

    struct Api {
        users: Arc<Users>,
        orders: Arc<Orders>,
    }

    fn counted_graph(calls: Arc<AtomicUsize>) -> Graph {
        let graph = Graph::new();
        graph
            .register_constructor(In::new(), move |_| {
                let id = calls.fetch_add(1, Ordering::SeqCst);
                Ok(Connection { id })
            })
            .unwrap();
        graph
            .register_constructor(In::new().with::<Connection>("conn"), |args| {
                Ok(Users {
                    conn: args.get("conn")?,
                })
            })
            .unwrap();
        graph
            .register_constructor(In::new().with::<Connection>("conn"), |args| {
                Ok(Orders {
                    conn: args.get("conn")?,
                })
            })
            .unwrap();
        graph
            .register_constructor(
                In::new().with::<Users>("users").with::<Orders>("orders"),
                |args| {
                    Ok(Api {
                        users: args.get("users")?,
                        orders: args.get("orders")?,
                    })
                },
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_shared_dependency_constructed_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = counted_graph(Arc::clone(&calls));

        let api = graph.resolve::<Api>().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&api.users.conn, &api.orders.conn));
        assert_eq!(api.users.conn.id, 0);

        let again = graph.resolve::<Api>().unwrap();
        assert!(Arc::ptr_eq(&api, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_register_and_resolve_value() {
        let graph = Graph::new();
        graph.register_value(Connection { id: 42 }).unwrap();
        assert_eq!(graph.resolve::<Connection>().unwrap().id, 42);
        assert!(graph.is_cached(&Key::of::<Connection>()));
    }

    #[test]
    fn test_shared_value_is_same_arc() {
        let graph = Graph::new();
        let conn = Arc::new(Connection { id: 7 });
        graph.register_shared(Arc::clone(&conn)).unwrap();
        assert!(Arc::ptr_eq(&conn, &graph.resolve::<Connection>().unwrap()));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let graph = Graph::new();
        graph.register_value(Connection { id: 1 }).unwrap();
        let err = graph
            .register_constructor(In::new(), |_| Ok(Connection { id: 2 }))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { .. }));
        assert_eq!(graph.resolve::<Connection>().unwrap().id, 1);
    }

    #[test]
    fn test_missing_root() {
        let graph = Graph::new();
        let err = graph.resolve::<Connection>().err().unwrap();
        assert!(matches!(
            err,
            Error::MissingDependency {
                required_by: None,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_dependency_names_both_sides() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = Graph::new();
        let counter = Arc::clone(&calls);
        graph
            .register_constructor(In::new().with::<Connection>("conn"), move |args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Users {
                    conn: args.get("conn")?,
                })
            })
            .unwrap();

        let err = graph.resolve::<Users>().err().unwrap();
        match &err {
            Error::MissingDependency { key, required_by } => {
                assert_eq!(*key, Key::of::<Connection>());
                assert_eq!(required_by.as_ref(), Some(&Key::of::<Users>()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_deep_missing_dependency_constructs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = Graph::new();
        let counter = Arc::clone(&calls);
        graph
            .register_constructor(In::new().with::<Connection>("conn"), move |args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Users {
                    conn: args.get("conn")?,
                })
            })
            .unwrap();
        let counter = Arc::clone(&calls);
        graph
            .register_constructor(In::new().with::<Users>("users"), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Orders {
                    conn: Arc::new(Connection { id: 0 }),
                })
            })
            .unwrap();

        let err = graph.resolve::<Orders>().err().unwrap();
        assert!(err.to_string().contains("Connection is not registered"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unrelated_broken_node_does_not_block_resolution() {
        let graph = Graph::new();
        graph.register_value(Connection { id: 3 }).unwrap();
        graph
            .register_constructor(In::new().with::<Api>("api"), |_| {
                Ok(Orders {
                    conn: Arc::new(Connection { id: 0 }),
                })
            })
            .unwrap();
        graph
            .register_constructor(In::new().with::<Connection>("conn"), |args| {
                Ok(Users {
                    conn: args.get("conn")?,
                })
            })
            .unwrap();

        assert_eq!(graph.resolve::<Users>().unwrap().conn.id, 3);
        assert!(graph.resolve::<Orders>().is_err());
    }

    #[test]
    fn test_constructor_failure_is_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let graph = Graph::new();
        let counter = Arc::clone(&attempts);
        graph
            .register_constructor(In::new(), move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("connection refused");
                }
                Ok(Connection { id: 9 })
            })
            .unwrap();

        let err = graph.resolve::<Connection>().err().unwrap();
        assert!(matches!(err, Error::Constructor { .. }));
        assert!(!graph.is_cached(&Key::of::<Connection>()));
        let report = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(report.matches("connection refused").count(), 1);

        assert_eq!(graph.resolve::<Connection>().unwrap().id, 9);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dependency_failure_surfaces_verbatim() {
        let graph = Graph::new();
        graph
            .register_constructor::<Connection, _>(In::new(), |_| {
                anyhow::bail!("dns lookup failed")
            })
            .unwrap();
        graph
            .register_constructor(In::new().with::<Connection>("conn"), |args| {
                Ok(Users {
                    conn: args.get("conn")?,
                })
            })
            .unwrap();

        match graph.resolve::<Users>().err().unwrap() {
            Error::Constructor { key, source } => {
                assert_eq!(key, Key::of::<Connection>());
                assert_eq!(source.to_string(), "dns lookup failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_circular_dependency_detected() {
        let graph = Graph::new();
        graph
            .register_constructor(In::new().with::<Orders>("orders"), |_| {
                Ok(Users {
                    conn: Arc::new(Connection { id: 0 }),
                })
            })
            .unwrap();
        graph
            .register_constructor(In::new().with::<Users>("users"), |_| {
                Ok(Orders {
                    conn: Arc::new(Connection { id: 0 }),
                })
            })
            .unwrap();

        let err = graph.resolve::<Users>().err().unwrap();
        assert!(matches!(err, Error::CircularDependency { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_optional_and_named_inputs() {
        let graph = Graph::new();
        graph
            .register_named_value("primary", Connection { id: 1 })
            .unwrap();
        graph
            .register_named_value("replica", Connection { id: 2 })
            .unwrap();

        let inputs = In::new()
            .param(crate::di::Param::named::<Connection>("conn", "replica"))
            .param(crate::di::Param::of::<Orders>("orders").optional());
        graph
            .register_constructor(inputs, |args| {
                assert!(args.optional::<Orders>("orders")?.is_none());
                Ok(Users {
                    conn: args.get("conn")?,
                })
            })
            .unwrap();

        assert_eq!(graph.resolve::<Users>().unwrap().conn.id, 2);
        assert_eq!(graph.resolve_named::<Connection>("primary").unwrap().id, 1);
        assert!(graph.resolve::<Connection>().is_err());
    }

    #[test]
    fn test_concurrent_first_resolution_constructs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = Graph::new();
        let counter = Arc::clone(&calls);
        graph
            .register_constructor(In::new(), move |_| {
                std::thread::sleep(Duration::from_millis(50));
                Ok(Connection {
                    id: counter.fetch_add(1, Ordering::SeqCst),
                })
            })
            .unwrap();

        let resolved: Vec<Arc<Connection>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| graph.resolve::<Connection>().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resolved.iter().all(|c| Arc::ptr_eq(c, &resolved[0])));
    }

    #[test]
    fn test_invoke_resolves_inputs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = counted_graph(Arc::clone(&calls));

        let ids = graph
            .invoke("wire", &In::new().with::<Api>("api"), |args| {
                let api = args.get::<Api>("api")?;
                Ok((api.users.conn.id, api.orders.conn.id))
            })
            .unwrap();
        assert_eq!(ids, (0, 0));

        let err = graph
            .invoke("broken", &In::new(), |_| -> anyhow::Result<()> {
                anyhow::bail!("nope")
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvokeFailed { .. }));
    }

    #[test]
    fn test_invoke_reports_missing_input() {
        let graph = Graph::new();
        let err = graph
            .invoke("wire", &In::new().with::<Api>("api"), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, Error::MissingDependency { .. }));
    }
}
