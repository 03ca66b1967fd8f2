pub mod protocols;
pub mod resolver;

pub use protocols::{CatalogError, ProtocolCatalog, ProtocolStore, category_label};
pub use resolver::NameResolver;
