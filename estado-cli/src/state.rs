use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `ESTADO_HOME`, or `~/.estado`
pub fn estado_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("ESTADO_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".estado"))
}

pub fn ensure_estado_home() -> Result<PathBuf> {
    let dir = estado_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}
