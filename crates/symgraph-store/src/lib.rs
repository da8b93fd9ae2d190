//! Ordered, persistent key–value tables.
//!
//! Each [`Table`] is an ordered map image held in memory behind a read-write
//! lock, backed by a bincode snapshot on disk. Writes are batched through a
//! [`WriteScope`]: they stay invisible to readers until the scope flushes,
//! at which point the whole batch is applied in one critical section and the
//! snapshot is persisted atomically (write-to-temp + rename). Iteration goes
//! through [`Cursor`]s, which address entries by key and re-resolve their
//! position on every step, so they stay valid across interleaved flushes.
//!
//! Key ordering is the natural `Ord` of the decoded key type. The encoded
//! composite keys used by callers (`SourceKey`, `Location`) are constructed
//! so their `Ord` matches the byte-wise ordering of their encoded form.

mod error;
mod table;
mod util;

pub use error::StoreError;
pub use table::{Cursor, Table, WriteScope};
pub use util::{atomic_write, BINCODE_PAYLOAD_LIMIT_BYTES};

/// Version stamp written into every table snapshot. Bump on any change to
/// the persisted encoding of keys or values.
pub const DATABASE_VERSION: u32 = 1;
