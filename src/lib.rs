//! Multi-role task lists (teacher, student, admin) kept in a local
//! key-value store.

pub mod announcements;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod tasks;
pub mod transcript;
pub mod users;
pub mod view;
