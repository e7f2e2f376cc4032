pub mod layout;
pub mod quote;

use crate::error::ExtractError;
use crate::table::{FieldSchema, Record};

pub use layout::QuoteLayout;
pub use quote::QuoteExtractor;

/// Turns a fetched page body into a complete record, or fails for the
/// whole ticker. Implementations must never return a partial record.
pub trait PageExtractor: Send + Sync {
    fn extract(&self, id: &str, body: &str, schema: &FieldSchema) -> Result<Record, ExtractError>;
}
