//!  Storage is organized through [record_storage::ActivityStoreImpl].
//!  The basic idea is:
//!   - There is a directory with all the records.
//!   - Records are stored in JSON lines files, one file per UTC day.
//!   - Records are only ever appended. Retention deletes old day files and rewrites the file
//!     of the day the cutoff falls into.

pub mod entities;
pub mod record_storage;
