use std::path::PathBuf;

const WIGO_SUBDIR: &str = "wigo";
const SOCKET_FILE: &str = "socket.sock";
const HISTORY_FILE: &str = "notification-history.jsonl";
const DND_FILE: &str = "dnd";
const WIDGET_STATE_FILE: &str = "wigo_widget_state";
const CONFIG_FILE: &str = "config.toml";
const FALLBACK_HOME: &str = "/tmp";

pub const ENV_SOCKET: &str = "WIGO_SOCKET";
pub const ENV_CONFIG: &str = "WIGO_CONFIG";
pub const ENV_DATA_DIR: &str = "WIGO_DATA_DIR";
pub const ENV_RUNTIME_DIR: &str = "XDG_RUNTIME_DIR";
pub const ENV_HOME: &str = "HOME";
pub const ENV_HYPRLAND_SIGNATURE: &str = "HYPRLAND_INSTANCE_SIGNATURE";

/// Non-empty environment variable, or `None`.
pub fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Runtime directory ($XDG_RUNTIME_DIR/wigo, or $TMPDIR/wigo)
pub fn runtime_dir() -> PathBuf {
    let base = env_opt(ENV_RUNTIME_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    let dir = base.join(WIGO_SUBDIR);
    tracing::trace!(dir = %dir.display(), "Resolved runtime directory");
    dir
}

/// Control socket path ($WIGO_SOCKET or $XDG_RUNTIME_DIR/wigo/socket.sock)
pub fn socket_path() -> PathBuf {
    let path = env_opt(ENV_SOCKET)
        .map(PathBuf::from)
        .unwrap_or_else(|| runtime_dir().join(SOCKET_FILE));
    tracing::trace!(path = %path.display(), "Control socket path");
    path
}

/// Image cache for decoded notification pixel buffers
pub fn image_cache_dir() -> PathBuf {
    runtime_dir().join("images")
}

/// Data directory ($WIGO_DATA_DIR or $HOME/.local/share/wigo)
pub fn data_dir() -> PathBuf {
    let dir = env_opt(ENV_DATA_DIR).map(PathBuf::from).unwrap_or_else(|| {
        env_opt(ENV_HOME)
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from(FALLBACK_HOME))
            .join(".local")
            .join("share")
            .join(WIGO_SUBDIR)
    });
    tracing::trace!(dir = %dir.display(), "Resolved data directory");
    dir
}

pub fn history_path() -> PathBuf {
    data_dir().join(HISTORY_FILE)
}

pub fn dnd_path() -> PathBuf {
    data_dir().join(DND_FILE)
}

/// Config file ($WIGO_CONFIG or ~/.config/wigo/config.toml)
pub fn config_path() -> PathBuf {
    let path = env_opt(ENV_CONFIG).map(PathBuf::from).unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join(WIGO_SUBDIR)
            .join(CONFIG_FILE)
    });
    tracing::trace!(path = %path.display(), "Config path");
    path
}

/// File whose non-empty content means "some widget is open"
pub fn widget_state_path() -> PathBuf {
    std::env::temp_dir().join(WIGO_SUBDIR).join(WIDGET_STATE_FILE)
}

/// Hyprland control socket, if running under Hyprland
pub fn hyprland_socket_path() -> Option<PathBuf> {
    let signature = env_opt(ENV_HYPRLAND_SIGNATURE)?;
    let runtime = env_opt(ENV_RUNTIME_DIR)?;
    Some(
        PathBuf::from(runtime)
            .join("hypr")
            .join(signature)
            .join(".socket.sock"),
    )
}
