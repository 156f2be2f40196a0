pub mod backend;
pub mod config;
pub mod gallery;
pub mod image_store;
