pub mod insights;
pub mod models;
pub mod parse;
pub mod store;

pub use insights::visible_insights;
pub use store::{LoadOutcome, LoadTicket, MatchStore, StoreStatus};
