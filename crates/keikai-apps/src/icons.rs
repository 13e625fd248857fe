//! Icon theme indexing, decoding and scaling.

use crate::error::IconError;
use crate::paths::{get_icon_base_directories, get_icon_theme_order, parse_icon_theme_index};
use crate::platform::Enumeration;
use image::DynamicImage;
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Raster formats the `image` crate can decode.
const DECODABLE: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// Handles icon lookups across multiple themes and directories.
pub struct IconTheme {
    mode: Enumeration,
    /// Icon name (lowercase, no ext) -> path.
    index: RwLock<HashMap<String, PathBuf>>,
}

impl IconTheme {
    pub fn new(mode: Enumeration) -> Self {
        Self {
            mode,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild the index from every search directory.
    /// Directories earlier in theme order win.
    pub fn build_index(&self) {
        let search_dirs = self.search_directories();
        debug!("Scanning {} icon directories...", search_dirs.len());
        *self.index.write() = index_directories(&search_dirs);
    }

    /// Number of indexed icon names.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Resolve an icon name (or absolute path) to a file.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.starts_with('/') {
            let path = PathBuf::from(name);
            return path.exists().then_some(path);
        }

        let index = self.index.read();
        let name_lower = name.to_lowercase();

        if let Some(path) = index.get(&name_lower) {
            return Some(path.clone());
        }

        // e.g. "Some App" or "some_app" -> "some-app"
        [name_lower.replace(' ', "-"), name_lower.replace('_', "-")]
            .iter()
            .find_map(|variant| index.get(variant).cloned())
    }

    fn search_directories(&self) -> Vec<PathBuf> {
        let icon_dirs = get_icon_base_directories(self.mode);
        let mut result = Vec::new();

        for theme in get_icon_theme_order(&icon_dirs) {
            for base_dir in &icon_dirs {
                let theme_root = base_dir.join(&theme);
                if !theme_root.exists() {
                    continue;
                }

                match parse_icon_theme_index(&theme_root) {
                    Some(parsed) if !parsed.directories.is_empty() => {
                        result.extend(parsed.directories.iter().map(|d| theme_root.join(d)));
                    }
                    _ => result.push(theme_root),
                }
            }
        }

        // Base directories (pixmaps, icons root) are searched last.
        result.extend(icon_dirs);
        result
    }
}

fn index_directories(dirs: &[PathBuf]) -> HashMap<String, PathBuf> {
    let mut index = HashMap::new();

    for dir in dirs.iter().filter(|d| d.exists()) {
        let walker = walkdir::WalkDir::new(dir).follow_links(true).max_depth(10);

        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            let decodable = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| DECODABLE.contains(&ext.to_lowercase().as_str()));
            if !decodable {
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                index
                    .entry(stem.to_lowercase())
                    .or_insert_with(|| path.to_path_buf());
            }
        }
    }

    index
}

/// Decode an image file.
pub fn decode_icon(path: &Path) -> Result<DynamicImage, IconError> {
    if !path.exists() {
        return Err(IconError::MissingResource(path.display().to_string()));
    }

    image::open(path).map_err(|source| match source {
        image::ImageError::IoError(e) => IconError::Io(e),
        source => IconError::Decode {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Shrink to fit within `max` x `max`, keeping the aspect ratio.
/// Images already small enough are returned untouched. `max == 0` disables
/// scaling.
pub fn scale_to_fit(image: DynamicImage, max: u32) -> DynamicImage {
    if max == 0 || (image.width() <= max && image.height() <= max) {
        return image;
    }
    image.thumbnail(max, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn index_prefers_earlier_directories() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("first");
        let second = root.path().join("second/apps");
        fs::create_dir_all(&first).unwrap();
        fs::create_dir_all(&second).unwrap();
        fs::write(first.join("Firefox.png"), b"").unwrap();
        fs::write(second.join("firefox.png"), b"").unwrap();
        fs::write(second.join("notes.txt"), b"").unwrap();
        fs::write(second.join("vector.svg"), b"").unwrap();

        let index = index_directories(&[first.clone(), root.path().join("second")]);

        assert_eq!(index.get("firefox"), Some(&first.join("Firefox.png")));
        assert!(!index.contains_key("notes"));
        assert!(!index.contains_key("vector"));
    }

    #[test]
    fn decode_reports_missing_file() {
        let err = decode_icon(Path::new("/nonexistent/icon.png")).unwrap_err();
        assert!(matches!(err, IconError::MissingResource(_)));
    }

    #[test]
    fn decode_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"definitely not a png").unwrap();

        assert!(matches!(
            decode_icon(&path),
            Err(IconError::Decode { .. })
        ));
    }

    #[test]
    fn decode_round_trips_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("icon.png");
        DynamicImage::new_rgba8(3, 5).save(&path).unwrap();

        let image = decode_icon(&path).unwrap();
        assert_eq!((image.width(), image.height()), (3, 5));
    }

    #[test]
    fn scale_only_shrinks() {
        let tall = scale_to_fit(DynamicImage::new_rgba8(50, 200), 48);
        assert_eq!((tall.width(), tall.height()), (12, 48));

        let small = scale_to_fit(DynamicImage::new_rgba8(10, 10), 48);
        assert_eq!((small.width(), small.height()), (10, 10));

        let unscaled = scale_to_fit(DynamicImage::new_rgba8(100, 100), 0);
        assert_eq!(unscaled.width(), 100);
    }
}
