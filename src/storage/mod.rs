pub mod history;
pub mod schema;

pub use history::{HISTORY_CAPACITY, HistoryRecord, HistoryStore};
