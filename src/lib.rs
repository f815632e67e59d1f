pub mod aggregate;
pub mod app;
pub mod bundle;
pub mod cache;
pub mod combine;
pub mod config;
pub mod domain;
pub mod error;
pub mod extract;
pub mod fasst;
pub mod fs_util;
pub mod metadata;
pub mod output;
pub mod summary;
pub mod table;
pub mod tree;
