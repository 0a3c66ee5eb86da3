//! Data-source drivers: capability traits, connection-id parsing, and an
//! explicit registry mapping data-source type tags to driver factories.
//!
//! The registry replaces runtime class-path style lookup with a closed,
//! startup-built registration set, so the supported data sources are
//! statically enumerable and capability checks are typed `Option` lookups
//! rather than casts.

pub mod builtin;
pub mod capability;
pub mod connect;
pub mod error;
pub mod registry;

pub use capability::{DriverSet, DsDriver, DsReader, DsWriter, StreamReader, StreamWriter};
pub use error::DriverError;
pub use registry::DriverRegistry;
