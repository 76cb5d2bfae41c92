use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try ~/.config/hopper/config.yml first, fall back to /etc/hopper
    let config_path = if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/hopper/config.yml");
        match user_config.parent() {
            Some(parent) if fs::create_dir_all(parent).is_ok() => Some(user_config),
            _ => {
                eprintln!("Warning: could not create ~/.config/hopper");
                eprintln!("Falling back to /etc/hopper/config.yml");
                None
            }
        }
    } else {
        None
    };

    let config_path = match config_path {
        Some(path) => path,
        None => {
            let system_config = PathBuf::from("/etc/hopper/config.yml");
            if let Some(parent) = system_config.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
            }
            system_config
        }
    };

    if config_path.exists() {
        return Err(format!(
            "Config file already exists at {}. Remove it first or use --stdout to print instead.",
            config_path.display()
        )
        .into());
    }

    fs::write(&config_path, config_content)
        .map_err(|e| format!("Failed to write {}: {}", config_path.display(), e))?;

    println!("Wrote starter config to {}", config_path.display());
    println!("Edit it, then start the pipeline with: hopper run");

    Ok(())
}
