//! Desktop entry parsing.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A `[Desktop Action X]` group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesktopAction {
    /// The `X` in the group header.
    pub id: String,
    pub name: String,
    pub exec: String,
    pub icon_name: Option<String>,
}

/// Parsed from .desktop files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesktopApp {
    /// File stem, e.g. "org.gnome.Maps".
    pub id: String,
    pub name: String,
    pub exec: String,
    pub icon_name: Option<String>,
    pub no_display: bool,
    pub hidden: bool,
    pub actions: Vec<DesktopAction>,
    pub desktop_file_path: PathBuf,
}

impl DesktopApp {
    /// Whether a launcher should list this entry.
    pub fn is_visible(&self) -> bool {
        !self.no_display && !self.hidden
    }
}

/// Parse a .desktop file into a DesktopApp struct.
pub fn parse_desktop_file(path: &Path) -> Option<DesktopApp> {
    let content = fs::read_to_string(path).ok()?;
    let id = path.file_stem()?.to_string_lossy().to_string();
    parse_desktop_str(&id, path, &content)
}

/// Parse desktop entry `content`. Only `Type=Application` entries with a
/// name and an Exec line are accepted.
pub fn parse_desktop_str(id: &str, path: &Path, content: &str) -> Option<DesktopApp> {
    let mut groups: Vec<(String, HashMap<String, String>)> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            groups.push((line[1..line.len() - 1].to_string(), HashMap::new()));
            continue;
        }

        if let (Some((_, entries)), Some((key, value))) = (groups.last_mut(), line.split_once('='))
        {
            // Localized keys (Name[de]) are ignored.
            entries
                .entry(key.trim().to_string())
                .or_insert_with(|| value.trim().to_string());
        }
    }

    let (_, main) = groups.iter().find(|(name, _)| name == "Desktop Entry")?;

    if main.get("Type").map(String::as_str) != Some("Application") {
        return None;
    }

    let flag = |key: &str| main.get(key).is_some_and(|v| v == "true");

    let actions = main
        .get("Actions")
        .map(|list| {
            list.split(';')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .filter_map(|action_id| {
                    let header = format!("Desktop Action {action_id}");
                    let (_, group) = groups.iter().find(|(name, _)| *name == header)?;
                    Some(DesktopAction {
                        id: action_id.to_string(),
                        name: group.get("Name")?.clone(),
                        exec: group.get("Exec")?.clone(),
                        icon_name: group.get("Icon").cloned(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(DesktopApp {
        id: id.to_string(),
        name: main.get("Name")?.clone(),
        exec: main.get("Exec")?.clone(),
        icon_name: main.get("Icon").filter(|s| !s.is_empty()).cloned(),
        no_display: flag("NoDisplay"),
        hidden: flag("Hidden"),
        actions,
        desktop_file_path: path.to_path_buf(),
    })
}

/// Remove Exec field codes. `%%` becomes a literal `%`.
pub fn strip_field_codes(exec: &str) -> String {
    let mut out = String::with_capacity(exec.len());
    let mut chars = exec.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            // Any other field code (%f %U %i %c %k ...) expands to nothing here.
            Some(_) | None => {}
        }
    }

    out
}

/// Split an Exec line into program and arguments, honouring double quotes
/// and backslash escapes inside them.
pub fn split_exec(exec: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;
    let mut chars = exec.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending || !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => current.push(c),
        }
    }

    if pending || !current.is_empty() {
        args.push(current);
    }

    args
}
