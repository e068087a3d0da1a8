// ArtifactResolver - finds the real file after post-processing
//
// The engine reports the filename it prepared before merge/transcode. The
// extension on disk may differ (webm -> mkv after merge, webm -> mp3 after
// audio extraction), so try known extensions in priority order.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::models::ArtifactCandidate;

/// Probe order: audio outputs, then containers
pub const DEFAULT_EXTENSIONS: [&str; 7] = ["mp3", "m4a", "opus", "ogg", "mkv", "mp4", "webm"];

#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    extensions: Vec<String>,
}

impl ArtifactResolver {
    pub fn new() -> Self {
        Self::with_extensions(DEFAULT_EXTENSIONS)
    }

    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(Into::into)
                .map(|e: String| e.trim_start_matches('.').to_string())
                .collect(),
        }
    }

    /// Probe plan for `expected_path`
    pub fn candidate(&self, expected_path: &Path) -> ArtifactCandidate {
        ArtifactCandidate {
            expected_path: expected_path.to_path_buf(),
            base_name_without_ext: expected_path.with_extension(""),
            candidate_extensions: self.extensions.clone(),
        }
    }

    /// Locate the artifact. `None` when nothing plausible exists on disk.
    pub fn resolve(&self, expected_path: &Path) -> Option<PathBuf> {
        Self::first_existing(&self.candidate(expected_path))
    }

    /// First existing path of the candidate, expected path first
    pub fn first_existing(candidate: &ArtifactCandidate) -> Option<PathBuf> {
        if candidate.expected_path.exists() {
            return Some(candidate.expected_path.clone());
        }

        candidate
            .candidate_extensions
            .iter()
            .map(|ext| with_appended_extension(&candidate.base_name_without_ext, ext))
            .find(|path| path.exists())
    }
}

impl Default for ArtifactResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// `base` + `.` + `ext`, keeping any dots already in `base`
fn with_appended_extension(base: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_expected_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("x.webm");
        fs::write(&expected, b"data").unwrap();
        fs::write(dir.path().join("x.mp3"), b"data").unwrap();

        let resolver = ArtifactResolver::new();
        assert_eq!(resolver.resolve(&expected), Some(expected));
    }

    #[test]
    fn test_finds_changed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("x.webm");
        fs::write(dir.path().join("x.mkv"), b"data").unwrap();

        let resolver = ArtifactResolver::with_extensions(["mp3", "mkv"]);
        assert_eq!(resolver.resolve(&expected), Some(dir.path().join("x.mkv")));
    }

    #[test]
    fn test_extension_order_matters() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("x.webm");
        fs::write(dir.path().join("x.mkv"), b"data").unwrap();
        fs::write(dir.path().join("x.mp3"), b"data").unwrap();

        let resolver = ArtifactResolver::new();
        assert_eq!(resolver.resolve(&expected), Some(dir.path().join("x.mp3")));

        let resolver = ArtifactResolver::with_extensions([".mkv", ".mp3"]);
        assert_eq!(resolver.resolve(&expected), Some(dir.path().join("x.mkv")));
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ArtifactResolver::with_extensions(["mp3", "mkv"]);
        assert_eq!(resolver.resolve(&dir.path().join("x.webm")), None);
    }

    #[test]
    fn test_dotted_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let expected = dir.path().join("clip.part1.webm");
        fs::write(dir.path().join("clip.part1.mp4"), b"data").unwrap();

        let candidate = ArtifactResolver::new().candidate(&expected);
        assert_eq!(candidate.base_name_without_ext, dir.path().join("clip.part1"));
        assert_eq!(
            ArtifactResolver::first_existing(&candidate),
            Some(dir.path().join("clip.part1.mp4"))
        );
    }
}
