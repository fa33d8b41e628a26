pub mod accounts;
pub mod api;
pub mod config;
pub mod connectivity;
pub mod events;
pub mod humanize;
pub mod notifications;
pub mod observability;
pub mod operation;
pub mod preferences;
pub mod records;
pub mod registry;
pub mod scheduler;
pub mod storage;
pub mod worker;
