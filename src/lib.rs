pub mod backend;
pub mod chat;
pub mod common;
pub mod config;
pub mod error;
pub mod storage;
