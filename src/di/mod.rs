mod descriptor;
mod graph;
mod injectable;
mod key;
mod node;

pub use descriptor::{Args, In, Param};
pub use graph::Graph;
pub use injectable::Injectable;
pub use key::{Instance, Key};
