//! Build script for riberry-daemon
//!
//! Validates the embedded riberry.toml at compile time so a broken default
//! never ships.

use std::fs;
use std::path::Path;

const SECTIONS: &[&str] = &["display", "battery", "scheduler", "network", "bridge"];

fn main() {
    println!("cargo:rerun-if-changed=riberry.toml");
    println!("cargo:rerun-if-changed=build.rs");

    let path = Path::new("riberry.toml");
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => panic!("riberry.toml cannot be read: {e}"),
    };

    let config: toml::Table = match toml::from_str(&content) {
        Ok(table) => table,
        Err(e) => panic!("riberry.toml is not valid TOML:\n{e}"),
    };

    let unknown: Vec<_> = config
        .keys()
        .filter(|key| !SECTIONS.contains(&key.as_str()))
        .collect();
    if !unknown.is_empty() {
        panic!("riberry.toml has unknown sections: {unknown:?}");
    }
    for (name, section) in &config {
        if !section.is_table() {
            panic!("[{name}] in riberry.toml must be a table");
        }
    }
}
