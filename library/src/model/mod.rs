pub mod interface;
pub mod metadata;
pub mod value;

pub use interface::{Interface, PortDescriptor};
pub use metadata::Metadata;
pub use value::{SubDataflow, TokenOrigin, Value};
