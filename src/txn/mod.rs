pub mod log;
pub mod mvcc;
pub mod transaction;

pub use log::TxnLogEntry;
pub use transaction::{Access, Transaction, TransactionStatus, TrxKit};
