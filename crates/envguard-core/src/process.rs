//! Process lookup utilities

use std::path::PathBuf;

/// Locate a program on PATH (or accept an explicit path to an existing file)
pub fn find_program(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}
