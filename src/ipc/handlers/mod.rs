pub mod actions;
pub mod columns;
pub mod core;
pub mod forms;
pub mod imports;
pub mod listing;
pub mod performance;
pub mod records;
pub mod registrations;
pub mod schema;
pub mod storage;
pub mod subscriptions;
