//! Persistence layer: JSON files for the channel directory and members.

pub mod json_file;

pub use json_file::JsonFile;
