//! Project initialization for breeders-room
//!
//! `breeders-room init` creates the data directory, the database and a
//! default config.toml

use crate::config::DEFAULT_CONFIG_TOML;
use crate::db::{Database, CURRENT_SCHEMA};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project data directory
pub const DATA_DIR: &str = ".breeders-room";

/// Initialize breeders-room in `root`. Returns the database path.
///
/// Safe to re-run: existing files are left alone and the schema is created
/// only where missing.
pub fn init_project(root: &Path) -> Result<PathBuf, String> {
    println!("\n{}", "Initializing Breeder's Room...".cyan().bold());
    println!("   Directory: {}\n", root.display());

    // 1. Data directory
    let data_dir = root.join(DATA_DIR);
    create_dir_if_missing(&data_dir)?;

    // 2. Database with schema
    let db_path = data_dir.join("breeders-room.db");
    let existed = db_path.exists();
    Database::open_at(&db_path).map_err(|e| format!("Could not create database: {}", e))?;
    if existed {
        println!("   {} {}/breeders-room.db (schema {})", "Checked".green(), DATA_DIR, CURRENT_SCHEMA);
    } else {
        println!("   {} {}/breeders-room.db", "Creating".green(), DATA_DIR);
    }

    // 3. Config
    let config_path = data_dir.join("config.toml");
    write_file_if_missing(&config_path, DEFAULT_CONFIG_TOML, &format!("{}/config.toml", DATA_DIR))?;

    // 4. Keep the database out of version control
    add_to_gitignore(root)?;

    println!("\n{}", "Breeder's Room initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Run {} to start the API server", "breeders-room serve".cyan());
    println!("  2. Register a pet: {}", "breeders-room add-pet \"Gecko-1\" --owner <you> --sex male".cyan());
    println!("  3. Set {} to choose who approves parent requests", "[lineage] approver".cyan());
    println!();

    Ok(db_path)
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
        println!("   {} {}", "Creating".green(), path.display());
    }
    Ok(())
}

fn write_file_if_missing(path: &Path, content: &str, display_name: &str) -> Result<(), String> {
    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), display_name);
    } else {
        fs::write(path, content).map_err(|e| format!("Could not write {}: {}", display_name, e))?;
        println!("   {} {}", "Creating".green(), display_name);
    }
    Ok(())
}

fn add_to_gitignore(root: &Path) -> Result<(), String> {
    let gitignore_path = root.join(".gitignore");
    let entry = format!("{}/", DATA_DIR);

    if gitignore_path.exists() {
        let existing = fs::read_to_string(&gitignore_path).map_err(|e| format!("Could not read .gitignore: {}", e))?;

        if existing.lines().any(|line| line.trim() == entry || line.trim() == DATA_DIR) {
            return Ok(());
        }

        let new_content = format!("{}\n\n# Breeder's Room database (local)\n{}\n", existing.trim_end(), entry);
        fs::write(&gitignore_path, new_content).map_err(|e| format!("Could not update .gitignore: {}", e))?;
        println!("   {} .gitignore (added {})", "Updated".green(), entry);
    } else {
        let content = format!("# Breeder's Room database (local)\n{}\n", entry);
        fs::write(&gitignore_path, content).map_err(|e| format!("Could not create .gitignore: {}", e))?;
        println!("   {} .gitignore", "Creating".green());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout() {
        let dir = TempDir::new().unwrap();
        let db_path = init_project(dir.path()).unwrap();

        assert!(db_path.exists());
        let config = fs::read_to_string(dir.path().join(DATA_DIR).join("config.toml")).unwrap();
        assert!(config.contains("approver = \"counterpart\""));
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.contains(".breeders-room/"));
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        init_project(dir.path()).unwrap();

        let config_path = dir.path().join(DATA_DIR).join("config.toml");
        fs::write(&config_path, "[server]\nport = 9000\n").unwrap();
        init_project(dir.path()).unwrap();

        assert_eq!(fs::read_to_string(&config_path).unwrap(), "[server]\nport = 9000\n");
        let gitignore = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".breeders-room/").count(), 1);
        assert!(gitignore.starts_with("target/"));
    }
}
