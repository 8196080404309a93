use crate::di::{Args, In};

/// Trait for types that know how to build themselves from the graph
///
/// Implementors declare their inputs once and can then be registered with
/// [`Graph::register`](crate::di::Graph::register) without repeating the
/// wiring at every call site.
///
/// # Example
/// ```
/// use keystone::di::{Args, Graph, In, Injectable};
/// use std::sync::Arc;
///
/// struct Config { greeting: String }
///
/// struct Greeter { config: Arc<Config> }
///
/// impl Injectable for Greeter {
///     fn inputs() -> In {
///         In::new().with::<Config>("config")
///     }
///
///     fn construct(args: &Args) -> anyhow::Result<Self> {
///         Ok(Greeter { config: args.get("config")? })
///     }
/// }
///
/// let graph = Graph::new();
/// graph.register_value(Config { greeting: "hello".into() }).unwrap();
/// graph.register::<Greeter>().unwrap();
/// assert_eq!(graph.resolve::<Greeter>().unwrap().config.greeting, "hello");
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Inputs this type needs, in the order `construct` expects them
    fn inputs() -> In;

    /// Build an instance from its resolved inputs
    ///
    /// # Errors
    /// Any error returned here is surfaced to the resolving caller as a
    /// constructor failure and is not cached.
    fn construct(args: &Args) -> anyhow::Result<Self>;
}
