//! Checks on the configured database location

use std::fs;
use std::path::{Component, Path};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DbPathError {
    #[error("database path is empty")]
    Empty,
    #[error("database path contains control characters")]
    ControlCharacters,
    #[error("parent directory traversal is not allowed in database path")]
    ParentTraversal,
    #[error("database path must end in a file name")]
    NoFileName,
    #[error("database path is a symlink")]
    Symlink,
    #[error("database path points to a directory")]
    Directory,
}

/// `:memory:` always passes. Anything else must name a regular file (existing
/// or not) without `..` components.
pub fn validate_db_path(db_path: &str) -> Result<(), DbPathError> {
    if db_path == ":memory:" {
        return Ok(());
    }
    if db_path.is_empty() {
        return Err(DbPathError::Empty);
    }
    if db_path.chars().any(char::is_control) {
        return Err(DbPathError::ControlCharacters);
    }

    let path = Path::new(db_path);
    if path.components().any(|c| c == Component::ParentDir) {
        return Err(DbPathError::ParentTraversal);
    }
    if path.file_name().is_none() {
        return Err(DbPathError::NoFileName);
    }

    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => Err(DbPathError::Symlink),
        Ok(meta) if meta.is_dir() => Err(DbPathError::Directory),
        _ => Ok(()),
    }
}
