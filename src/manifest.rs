use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::font::FontEntry;

/// A JSON file naming the font faces to load for a generation run. Paths are
/// resolved relative to the directory the manifest lives in, so a manifest can
/// travel with its font files.
///
/// ```json
/// {
///     "fonts": [
///         { "name": "Roboto", "path": "fonts/Roboto-Regular.ttf", "fallback": true },
///         { "name": "RobotoBold", "path": "fonts/Roboto-Bold.ttf" }
///     ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontManifest {
    pub fonts: Vec<FontSource>,
}

/// One font file declared in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSource {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub fallback: bool,
}

impl FontManifest {
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ManifestError::Unparseable {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads every declared font file into memory. Relative paths are joined
    /// onto `manifest_dir`, absolute paths are used as written.
    pub fn read_entries(&self, manifest_dir: &Path) -> Result<Vec<FontEntry>, ManifestError> {
        self.fonts
            .iter()
            .map(|source| {
                let path = if Path::new(&source.path).is_absolute() {
                    Path::new(&source.path).to_path_buf()
                } else {
                    manifest_dir.join(&source.path)
                };
                let data = fs::read(&path)
                    .map_err(|source| ManifestError::FontUnreadable { path, source })?;
                Ok(FontEntry::new(&source.name, data, source.fallback))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_fallback_flag_defaults_to_false() {
        let manifest: FontManifest = serde_json::from_str(
            r#"{ "fonts": [{ "name": "Roboto", "path": "Roboto-Regular.ttf" }] }"#,
        )
        .unwrap();
        assert_eq!(manifest.fonts.len(), 1);
        assert!(!manifest.fonts[0].fallback);
    }

    #[test]
    fn relative_paths_are_joined_onto_the_manifest_directory() {
        let dir = std::env::temp_dir().join(format!("platen-manifest-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("face.ttf"), b"not really a font").unwrap();
        let manifest: FontManifest = serde_json::from_str(
            r#"{ "fonts": [{ "name": "Face", "path": "face.ttf", "fallback": true }] }"#,
        )
        .unwrap();

        let entries = manifest.read_entries(&dir).unwrap();
        assert_eq!(entries[0].name, "Face");
        assert_eq!(entries[0].data, b"not really a font");
        assert!(entries[0].fallback);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_font_files_name_their_path() {
        let manifest: FontManifest = serde_json::from_str(
            r#"{ "fonts": [{ "name": "Ghost", "path": "ghost.ttf" }] }"#,
        )
        .unwrap();
        let error = manifest
            .read_entries(Path::new("/nonexistent-platen-dir"))
            .unwrap_err();
        assert!(matches!(
            error,
            ManifestError::FontUnreadable { ref path, .. } if path.ends_with("ghost.ttf")
        ));
    }
}
