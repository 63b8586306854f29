pub mod consts;
pub mod entry;
pub mod hash;
pub mod schema;
pub mod snapshot;
pub mod tally;
pub mod utils;
pub mod verify;

pub use consts::*;
pub use entry::{ChainLink, LedgerEntry, LedgerView};
pub use hash::{canonical_ballot, compute_hash, format_timestamp, BallotData};
pub use schema::{BallotSchema, Position, SchemaError};
pub use snapshot::{Snapshot, SnapshotAudit};
pub use tally::{project, TallyRow};
pub use verify::{verify_chain, ChainFault, ChainReport};
