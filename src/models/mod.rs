pub mod cache;
pub mod collection;
pub mod query;
pub mod record;

pub use cache::ResponseCache;
pub use collection::Collection;
pub use query::Query;
pub use record::{Fields, Record};
