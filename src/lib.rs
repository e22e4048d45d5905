pub mod access;
pub mod catalog;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod models;
pub mod schema;
pub mod session;
pub mod state;
pub mod storage;
