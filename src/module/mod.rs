use crate::di::Graph;
use crate::error::Result;

/// Trait for groups of registrations that belong together
///
/// A module registers the values and constructors of one feature so the
/// composition root can pull the whole feature in with a single call.
///
/// # Example
/// ```
/// use keystone::di::{Graph, In};
/// use keystone::Module;
///
/// struct PoolSize(usize);
/// struct Pool { size: usize }
///
/// struct StorageModule;
///
/// impl Module for StorageModule {
///     fn register(graph: &Graph) -> keystone::Result<()> {
///         graph.register_value(PoolSize(8))?;
///         graph.register_constructor(In::new().with::<PoolSize>("size"), |args| {
///             Ok(Pool { size: args.get::<PoolSize>("size")?.0 })
///         })
///     }
/// }
///
/// let graph = Graph::new();
/// StorageModule::register(&graph).unwrap();
/// assert_eq!(graph.resolve::<Pool>().unwrap().size, 8);
/// ```
pub trait Module {
    /// Register all values and constructors of this module
    fn register(graph: &Graph) -> Result<()>;
}
