pub mod executor;
pub mod ledger;
pub mod plan;
pub mod tombstone;

pub use executor::{DeletionExecutor, DeletionRequest, FileRemover, FsRemover};
pub use ledger::{read_ledger, LedgerRow, LedgerWriter, Status};
pub use plan::{execute_plan, read_plan, PlanRow};
pub use tombstone::{sidecar_path, TombstoneRecord};
