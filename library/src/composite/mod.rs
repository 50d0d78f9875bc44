//! Composite nodes: dataflows wrapped as actors, and their serializable
//! factories.

mod factory;
mod io;
mod node;

pub use factory::{CompositeNodeFactory, ElementSpec, Endpoint, LinkSpec};
pub use io::IoBoundary;
pub use node::{CompositeNode, CompositeNodeInput, CompositeNodeOutput};
