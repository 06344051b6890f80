//! XML bodies of the Azure Blob Storage API.

pub mod deserialize;

pub use deserialize::*;
