pub mod assembler;
pub mod block_billing;
pub mod catalog;
pub mod config;
pub mod error;
pub mod expenses;
pub mod fees;
pub mod ledes;
pub mod mandatory;
pub mod models;
pub mod names;
pub mod store;
pub mod summary;

pub use assembler::{assemble_invoice, generate_batch, Catalogs, InvoiceRequest};
pub use config::Config;
pub use error::{CatalogError, GenerationError, LedesError};
pub use ledes::{parse_ledes, to_ledes, LedesRecord};
pub use models::*;
pub use store::{EntityKind, EntityStore, JsonEntityStore};
pub use summary::generate_summary;
