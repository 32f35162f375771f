//! Destination path planning for downloads.
//!
//! Only the caller-chosen subfolder and the catalog filename shape the path;
//! no per-model-type layout is applied.

use std::path::{Component, Path, PathBuf};

use civdl_core::download::{DownloadError, DownloadResult};

/// Suffix of the file a direct transfer streams into.
const PARTIAL_SUFFIX: &str = ".downloading";

/// Suffix of aria2's resume control file.
const CONTROL_SUFFIX: &str = ".aria2";

/// Replace characters that are invalid in file names on common platforms.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// A planned download destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDestination {
    /// Directory the file lands in.
    pub dir: PathBuf,
    /// Sanitized file name.
    pub filename: String,
}

impl DownloadDestination {
    /// Plan the destination under `model_dir`.
    ///
    /// `subfolder` is relative; leading separators are ignored and `..` is
    /// rejected so requests cannot escape the model directory.
    pub fn plan(
        model_dir: &Path,
        subfolder: Option<&str>,
        filename: &str,
    ) -> DownloadResult<Self> {
        let filename = sanitize_filename(filename);
        if filename.is_empty() || filename == "." || filename == ".." {
            return Err(DownloadError::validation("file name is empty after sanitizing"));
        }

        let mut dir = model_dir.to_path_buf();
        if let Some(sub) = subfolder {
            for segment in sub.split(['/', '\\']) {
                let segment = segment.trim();
                if segment.is_empty() || segment == "." {
                    continue;
                }
                if segment == ".." {
                    return Err(DownloadError::validation(format!(
                        "subfolder '{sub}' must stay inside the model directory"
                    )));
                }
                let segment = sanitize_filename(segment);
                if !matches!(Path::new(&segment).components().next(), Some(Component::Normal(_))) {
                    return Err(DownloadError::validation(format!(
                        "invalid subfolder segment '{segment}'"
                    )));
                }
                dir.push(segment);
            }
        }

        Ok(Self { dir, filename })
    }

    /// Ensure the destination directory exists, creating it if necessary.
    pub async fn ensure_dir(&self) -> DownloadResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::io("create_dir", e.to_string()))
    }

    /// Where the finished artifact lives.
    pub fn final_path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    /// Where a direct transfer writes before the final rename.
    pub fn partial_path(&self) -> PathBuf {
        self.dir.join(format!("{}{PARTIAL_SUFFIX}", self.filename))
    }

    /// aria2's control file next to the output.
    pub fn control_path(&self) -> PathBuf {
        self.dir.join(format!("{}{CONTROL_SUFFIX}", self.filename))
    }

    /// Size of an already-present, non-empty final file.
    pub async fn existing_len(&self) -> Option<u64> {
        tokio::fs::metadata(self.final_path())
            .await
            .ok()
            .filter(|m| m.is_file() && m.len() > 0)
            .map(|m| m.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(
            sanitize_filename(" my:model<v2>?.safetensors "),
            "my_model_v2__.safetensors"
        );
        assert_eq!(sanitize_filename("a/b\\c|d*e\"f"), "a_b_c_d_e_f");
    }

    #[test]
    fn plan_without_subfolder() {
        let dest =
            DownloadDestination::plan(Path::new("/models"), None, "model.safetensors").unwrap();
        assert_eq!(dest.final_path(), PathBuf::from("/models/model.safetensors"));
        assert_eq!(
            dest.partial_path(),
            PathBuf::from("/models/model.safetensors.downloading")
        );
        assert_eq!(
            dest.control_path(),
            PathBuf::from("/models/model.safetensors.aria2")
        );
    }

    #[test]
    fn plan_with_nested_subfolder() {
        let dest = DownloadDestination::plan(
            Path::new("/models"),
            Some("/loras\\styles/"),
            "anime.safetensors",
        )
        .unwrap();
        assert_eq!(dest.dir, PathBuf::from("/models/loras/styles"));
    }

    #[test]
    fn plan_rejects_parent_traversal() {
        let err = DownloadDestination::plan(Path::new("/models"), Some("../etc"), "x.bin")
            .unwrap_err();
        assert!(matches!(err, DownloadError::Validation { .. }));
    }

    #[test]
    fn plan_rejects_empty_filename() {
        assert!(DownloadDestination::plan(Path::new("/models"), None, "   ").is_err());
    }

    #[tokio::test]
    async fn existing_len_ignores_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = DownloadDestination::plan(dir.path(), None, "model.bin").unwrap();
        assert_eq!(dest.existing_len().await, None);

        std::fs::write(dest.final_path(), b"").unwrap();
        assert_eq!(dest.existing_len().await, None);

        std::fs::write(dest.final_path(), b"weights").unwrap();
        assert_eq!(dest.existing_len().await, Some(7));
    }

    #[tokio::test]
    async fn ensure_dir_creates_nested_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        let dest = DownloadDestination::plan(dir.path(), Some("loras/anime"), "a.safetensors").unwrap();

        dest.ensure_dir().await.unwrap();
        dest.ensure_dir().await.unwrap();

        assert!(dir.path().join("loras").join("anime").is_dir());
    }
}
