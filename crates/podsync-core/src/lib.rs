pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod storage;
pub mod sync;
pub mod token_store;
