pub mod clock;
pub mod config;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod scheduler;
pub mod store;
pub mod telegram;
pub mod wal;
pub mod workflow;
