pub mod backend;
pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod service;
