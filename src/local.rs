use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::MediaKind;
use crate::naming::{self, DownloadTarget};
use crate::natsort;

pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a"];

/// A downloaded file or directory, recomputed from disk on every listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Path relative to the kind's subroot
    pub relative_path: PathBuf,
    pub encoded_filename: String,
    pub display_name: String,
    pub is_dir: bool,
}

/// Read-mostly view of the download root.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_root(&self, kind: MediaKind) -> PathBuf {
        self.root.join(kind.subroot())
    }

    /// Absolute destination for a download
    pub fn target_path(&self, kind: MediaKind, target: &DownloadTarget, extension: &str) -> PathBuf {
        self.kind_root(kind).join(target.relative_path(extension))
    }

    /// True when `path` lies under the download root without any `.` or `..`
    /// component
    pub fn contains(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root).is_ok_and(|rest| {
            rest.components()
                .all(|c| matches!(c, std::path::Component::Normal(_)))
        })
    }

    /// Find a stored file whose name without extension is exactly
    /// `candidate`, in `relative_dir`, with one of the kind's extensions.
    pub fn exists(&self, kind: MediaKind, candidate: &str, relative_dir: &Path) -> Option<PathBuf> {
        let dir = self.kind_root(kind).join(relative_dir);
        let found = accepted_extensions(kind)
            .iter()
            .map(|ext| dir.join(format!("{}.{}", candidate, ext)))
            .find(|path| path.is_file());

        debug!(candidate, found = found.is_some(), "local lookup");
        found
    }

    /// List the entries stored under `relative_dir`. A directory that was
    /// never created lists as empty.
    pub fn list(&self, kind: MediaKind, relative_dir: &Path) -> io::Result<Vec<LocalEntry>> {
        let dir = self.kind_root(kind).join(relative_dir);
        let read_dir = match std::fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let depth = relative_dir.components().count();
        let files_level = depth >= leaf_depth(kind);

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type()?;
            let relative_path = relative_dir.join(&name);

            if files_level {
                if !file_type.is_file() || !has_accepted_extension(kind, &name) {
                    continue;
                }
                let display_name = naming::decode(kind, &relative_path).display();
                entries.push(LocalEntry {
                    relative_path,
                    encoded_filename: name,
                    display_name,
                    is_dir: false,
                });
            } else if file_type.is_dir() {
                entries.push(LocalEntry {
                    relative_path,
                    display_name: naming::decode_component(&name),
                    encoded_filename: name,
                    is_dir: true,
                });
            }
        }

        if kind == MediaKind::Movie || depth == 0 {
            entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        } else {
            natsort::sort_naturally(&mut entries, |e| e.display_name.as_str());
        }

        Ok(entries)
    }
}

pub fn accepted_extensions(kind: MediaKind) -> &'static [&'static str] {
    if kind.is_audio() {
        AUDIO_EXTENSIONS
    } else {
        VIDEO_EXTENSIONS
    }
}

fn has_accepted_extension(kind: MediaKind, name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| accepted_extensions(kind).contains(&ext.as_str()))
}

/// Directory depth below the kind subroot where media files live
fn leaf_depth(kind: MediaKind) -> usize {
    match kind {
        MediaKind::Movie => 0,
        MediaKind::Show | MediaKind::Music => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::File::create(path).unwrap();
    }

    #[test]
    fn test_exists_exact_match() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "shows/Show/Season 1/Show - S01E03 - Fun Times.mkv");

        let store = LocalStore::new(dir.path());
        let season = Path::new("Show/Season 1");

        let found = store.exists(MediaKind::Show, "Show - S01E03 - Fun Times", season);
        assert_eq!(
            found,
            Some(dir.path().join("shows/Show/Season 1/Show - S01E03 - Fun Times.mkv"))
        );
    }

    #[test]
    fn test_exists_rejects_whitespace_difference() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "shows/Show/Season 1/Show - S01E03 - Fun  Times.mkv");

        let store = LocalStore::new(dir.path());
        let found = store.exists(
            MediaKind::Show,
            "Show - S01E03 - Fun Times",
            Path::new("Show/Season 1"),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_exists_ignores_other_kind_extensions() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "movies/Alien (1979).mp3");
        touch(dir.path(), "music/A/B/A - B - 01 - Song.flac");

        let store = LocalStore::new(dir.path());
        assert_eq!(store.exists(MediaKind::Movie, "Alien (1979)", Path::new("")), None);
        assert!(
            store
                .exists(MediaKind::Music, "A - B - 01 - Song", Path::new("A/B"))
                .is_some()
        );
    }

    #[test]
    fn test_list_episodes_naturally_ordered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "shows/Show/Season 1/Show - S01E10 - Ten.mkv");
        touch(dir.path(), "shows/Show/Season 1/Show - S01E02 - Two.mp4");
        touch(dir.path(), "shows/Show/Season 1/Show - S01E01 - One.avi");
        touch(dir.path(), "shows/Show/Season 1/notes.txt");

        let store = LocalStore::new(dir.path());
        let entries = store.list(MediaKind::Show, Path::new("Show/Season 1")).unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["S01E01 - One", "S01E02 - Two", "S01E10 - Ten"]);
        assert!(entries.iter().all(|e| !e.is_dir));
    }

    #[test]
    fn test_list_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "shows/Zed/Season 10/Zed - S10E01 - A.mkv");
        touch(dir.path(), "shows/Zed/Season 2/Zed - S02E01 - A.mkv");
        touch(dir.path(), "shows/A\u{2215}B Show/Season 1/x.mkv");

        let store = LocalStore::new(dir.path());

        let shows = store.list(MediaKind::Show, Path::new("")).unwrap();
        let names: Vec<&str> = shows.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["A/B Show", "Zed"]);
        assert!(shows[0].is_dir);

        let seasons = store.list(MediaKind::Show, Path::new("Zed")).unwrap();
        let names: Vec<&str> = seasons.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["Season 2", "Season 10"]);
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.list(MediaKind::Music, Path::new("")).unwrap().is_empty());
    }

    #[test]
    fn test_contains_rejects_parent_components() {
        let store = LocalStore::new("/data/downloads");
        assert!(store.contains(Path::new("/data/downloads/music/A/B/x.mp3")));
        assert!(!store.contains(Path::new("/data/downloads/music/../../x.mp3")));
        assert!(!store.contains(Path::new("/data/other/x.mp3")));
    }

    #[test]
    fn test_target_path() {
        let store = LocalStore::new("/data");
        let target = DownloadTarget {
            directory: PathBuf::from("Artist/Album"),
            filename: "Artist - Album - 01 - Song".to_string(),
        };
        assert_eq!(
            store.target_path(MediaKind::Music, &target, "flac"),
            PathBuf::from("/data/music/Artist/Album/Artist - Album - 01 - Song.flac")
        );
    }
}
