use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".dca-wallet";
const CONFIG_FILE: &str = "config.env";

pub fn load_env() {
    // Local .env wins; dotenv never overwrites a variable that is already set.
    let _ = dotenv::dotenv();

    if let Ok(home) = std::env::var("HOME") {
        let _ = dotenv::from_path(Path::new(&home).join(CONFIG_DIR).join(CONFIG_FILE));
    }
}

pub fn load_env_from_paths(local_env: &Path, default_config: &Path) {
    let _ = dotenv::from_path(local_env);
    let _ = dotenv::from_path(default_config);
}

pub fn config_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => Path::new(&home).join(CONFIG_DIR),
        Err(_) => PathBuf::from(CONFIG_DIR),
    }
}

/// Reads a boolean flag, accepting `1/0`, `true/false`, `yes/no` in any case.
pub fn env_flag(var: &str) -> Option<bool> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
