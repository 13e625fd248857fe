//! Path helpers for XDG directories, data files and icon themes.

use crate::platform::Enumeration;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "keikai";

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_default()
}

fn xdg_data_home() -> PathBuf {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home().join(".local/share"))
}

fn xdg_data_dirs() -> Vec<PathBuf> {
    std::env::var("XDG_DATA_DIRS")
        .unwrap_or_else(|_| "/usr/local/share:/usr/share".to_string())
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Per-user application directories (data home and user flatpak exports).
pub fn get_user_application_directories() -> Vec<PathBuf> {
    vec![
        xdg_data_home().join("applications"),
        home().join(".local/share/flatpak/exports/share/applications"),
    ]
}

/// System-wide application directories.
pub fn get_system_application_directories() -> Vec<PathBuf> {
    let mut dirs: Vec<_> = xdg_data_dirs()
        .into_iter()
        .map(|dir| dir.join("applications"))
        .collect();

    dirs.push(PathBuf::from("/var/lib/flatpak/exports/share/applications"));
    dirs.push(PathBuf::from("/var/lib/snapd/desktop/applications"));
    dirs
}

/// All .desktop directories for `mode`, highest precedence first.
pub fn get_application_directories(mode: Enumeration) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if mode == Enumeration::ProfileAware {
        dirs.extend(get_user_application_directories());
    }
    dirs.extend(get_system_application_directories());
    dirs
}

/// Base icon directories (XDG + Flatpak + Snap).
pub fn get_icon_base_directories(mode: Enumeration) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if mode == Enumeration::ProfileAware {
        dirs.push(xdg_data_home().join("icons"));
        dirs.push(home().join(".icons"));
    }

    for data_dir in xdg_data_dirs() {
        dirs.push(data_dir.join("icons"));
        dirs.push(data_dir.join("pixmaps"));
    }

    dirs.push(PathBuf::from("/usr/share/pixmaps"));
    dirs.push(PathBuf::from("/var/lib/flatpak/exports/share/icons"));
    if mode == Enumeration::ProfileAware {
        dirs.push(home().join(".local/share/flatpak/exports/share/icons"));
    }
    dirs.push(PathBuf::from("/var/lib/snapd/desktop/icons"));

    dirs
}

/// Launch metadata file.
/// Typically ~/.local/share/keikai/launch_metadata.json
pub fn get_metadata_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| home().join(".local/share"))
        .join(APP_DIR)
        .join("launch_metadata.json")
}

/// Icon lookup cache.
/// Typically ~/.cache/keikai/icon_cache.json
pub fn get_icon_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| home().join(".cache"))
        .join(APP_DIR)
        .join("icon_cache.json")
}

/// Launcher settings file.
/// Typically ~/.config/keikai/settings.json
pub fn get_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| home().join(".config"))
        .join(APP_DIR)
        .join("settings.json")
}

/// Parsed `index.theme` content.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedIconTheme {
    pub directories: Vec<String>,
    pub inherits: Vec<String>,
}

pub fn parse_icon_theme_str(content: &str) -> ParsedIconTheme {
    let mut parsed = ParsedIconTheme::default();
    let mut in_theme = false;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_theme = line.eq_ignore_ascii_case("[Icon Theme]");
            continue;
        }
        if !in_theme {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let list = || {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };
        match key.trim() {
            "Directories" => parsed.directories = list(),
            "Inherits" => parsed.inherits = list(),
            _ => {}
        }
    }

    parsed
}

pub fn parse_icon_theme_index(theme_root: &Path) -> Option<ParsedIconTheme> {
    let content = fs::read_to_string(theme_root.join("index.theme")).ok()?;
    Some(parse_icon_theme_str(&content))
}

/// Ordered list of icon themes to search, inherited themes included.
pub fn get_icon_theme_order(base_dirs: &[PathBuf]) -> Vec<String> {
    let mut themes = Vec::new();

    if let Ok(theme) = std::env::var("KEIKAI_ICON_THEME") {
        themes.push(theme);
    }
    themes.push("Adwaita".to_string());
    themes.push("hicolor".to_string());

    resolve_theme_inheritance(themes, base_dirs)
}

fn resolve_theme_inheritance(start: Vec<String>, base_dirs: &[PathBuf]) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from(start);

    while let Some(theme) = queue.pop_front() {
        if !visited.insert(theme.clone()) {
            continue;
        }

        for base in base_dirs {
            if let Some(parsed) = parse_icon_theme_index(&base.join(&theme)) {
                queue.extend(parsed.inherits.into_iter().filter(|p| !visited.contains(p)));
                // First theme instance wins.
                break;
            }
        }
        result.push(theme);
    }

    result
}
