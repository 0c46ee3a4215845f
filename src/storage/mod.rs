//! Durable side effects of a run.
//!
//! - [`records`]: the queryable record store (news records, watermark)
//! - [`objects`]: the object store that serves article images

pub mod objects;
pub mod records;

pub use objects::{ObjectStore, S3ObjectStore, Visibility};
pub use records::{RecordStore, SqliteRecordStore};
