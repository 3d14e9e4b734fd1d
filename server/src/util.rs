use {
    anyhow::Result,
    std::path::PathBuf,
};

const CONFIG_FILE_NAME: &str = "sealpost-server.json5";

#[cfg(target_os = "linux")]
fn default_config_dir() -> Result<PathBuf> {
    Ok("/etc".into())
}

// Windows: %APPDATA% (%USERPROFILE%\AppData\Roaming);
// macOS: $HOME/Library/Application Support
#[cfg(not(target_os = "linux"))]
fn default_config_dir() -> Result<PathBuf> {
    dirs::config_dir().ok_or_else(|| anyhow::anyhow!("failed to get config dir"))
}

#[inline]
pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join(CONFIG_FILE_NAME))
}
