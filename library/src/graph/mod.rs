pub mod dataflow;
pub mod store;

pub use dataflow::{Connection, Dataflow, GraphId};
pub use store::{Edge, EdgeId, FanIn, GraphStore, PortDirection, PortId, VertexId};
