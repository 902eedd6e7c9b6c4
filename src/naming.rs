//! Mapping between remote catalog items and their on-disk names.
//!
//! Local files carry no server id, so a download is recognised purely by the
//! name derived here. The same item and metadata always produce the same
//! [`DownloadTarget`].
//!
//! Layout under each kind's subroot:
//!
//! - movies: `{title} ({year}).{ext}`
//! - shows: `{show}/{season}/{show} - S01E02 - {title}.{ext}`
//! - music: `{artist}/{album}/{artist} - {album} - 03 - {title}.{ext}`

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::{CatalogItem, MediaKind};

/// Stands in for `/` inside a single name component
pub const SLASH_PLACEHOLDER: char = '\u{2215}';

pub const VIDEO_FALLBACK_EXTENSION: &str = "mkv";
pub const AUDIO_FALLBACK_EXTENSION: &str = "mp3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Directory relative to the kind's subroot (empty for movies)
    pub directory: PathBuf,
    /// File name without extension
    pub filename: String,
}

impl DownloadTarget {
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.filename, extension)
    }

    pub fn relative_path(&self, extension: &str) -> PathBuf {
        self.directory.join(self.file_name(extension))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedName {
    /// Numbering such as `S01E03` or `07`, when the kind has one
    pub label: Option<String>,
    pub title: String,
}

impl DecodedName {
    pub fn display(&self) -> String {
        match &self.label {
            Some(label) => format!("{} - {}", label, self.title),
            None => self.title.clone(),
        }
    }
}

/// Component used when a field is empty or only dots
pub const UNKNOWN_COMPONENT: &str = "Unknown";

/// Make one metadata field safe to use as a single path component. Leading
/// dots are dropped so the result is never `.`, `..` or a hidden file.
pub fn encode_component(field: &str) -> String {
    let encoded: String = field
        .chars()
        .filter(|c| *c != '"')
        .map(|c| match c {
            '/' => SLASH_PLACEHOLDER,
            ':' => '-',
            c => c,
        })
        .collect();

    let encoded = encoded.trim().trim_start_matches('.').trim_start();
    if encoded.is_empty() {
        UNKNOWN_COMPONENT.to_string()
    } else {
        encoded.to_string()
    }
}

/// Reverse of [`encode_component`] as far as it can be reversed.
pub fn decode_component(component: &str) -> String {
    component.replace(SLASH_PLACEHOLDER, "/")
}

/// Derive the download target for a leaf item.
///
/// `ancestors` holds the display titles above the item: `[show, season]` for
/// episodes, `[artist, album]` for tracks, nothing for movies.
pub fn encode(kind: MediaKind, item: &CatalogItem, ancestors: &[String]) -> DownloadTarget {
    let title = encode_component(&item.title);
    let first = encode_component(ancestors.first().map(String::as_str).unwrap_or(""));
    let second = encode_component(ancestors.get(1).map(String::as_str).unwrap_or(""));

    match kind {
        MediaKind::Movie => {
            let filename = match item.year {
                Some(year) => format!("{} ({})", title, year),
                None => title,
            };
            DownloadTarget {
                directory: PathBuf::new(),
                filename,
            }
        }
        MediaKind::Show => {
            let season = item
                .parent_index
                .or_else(|| ancestors.get(1).and_then(|s| first_number(s)))
                .unwrap_or(0);
            let episode = item.index.unwrap_or(0);
            DownloadTarget {
                directory: PathBuf::from(&first).join(&second),
                filename: format!("{} - S{:02}E{:02} - {}", first, season, episode, title),
            }
        }
        MediaKind::Music => {
            let track = item.index.unwrap_or(0);
            DownloadTarget {
                directory: PathBuf::from(&first).join(&second),
                filename: format!("{} - {} - {:02} - {}", first, second, track, title),
            }
        }
    }
}

/// Recover the display title from a stored file's path relative to the kind
/// subroot.
pub fn decode(kind: MediaKind, relative: &Path) -> DecodedName {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let parents: Vec<String> = relative
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();

    match kind {
        MediaKind::Movie => DecodedName {
            label: None,
            title: decode_component(&stem),
        },
        MediaKind::Show => {
            let rest = parents
                .first()
                .and_then(|show| stem.strip_prefix(&format!("{} - ", show)))
                .unwrap_or(&stem);
            split_numbered(rest, episode_pattern())
        }
        MediaKind::Music => {
            let rest = match (parents.first(), parents.get(1)) {
                (Some(artist), Some(album)) => stem
                    .strip_prefix(&format!("{} - {} - ", artist, album))
                    .unwrap_or(&stem),
                _ => &stem,
            };
            split_numbered(rest, track_pattern())
        }
    }
}

/// Extension for a download, taken from the locator's path with any query
/// string removed.
pub fn extension_for(kind: MediaKind, locator: &str) -> String {
    let path = match url::Url::parse(locator) {
        Ok(url) => url.path().to_string(),
        Err(_) => locator.split(['?', '#']).next().unwrap_or("").to_string(),
    };

    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => fallback_extension(kind).to_string(),
    }
}

pub fn fallback_extension(kind: MediaKind) -> &'static str {
    if kind.is_audio() {
        AUDIO_FALLBACK_EXTENSION
    } else {
        VIDEO_FALLBACK_EXTENSION
    }
}

fn split_numbered(rest: &str, pattern: &Regex) -> DecodedName {
    match pattern.captures(rest) {
        Some(caps) => DecodedName {
            label: Some(caps[1].to_string()),
            title: decode_component(&caps[2]),
        },
        None => DecodedName {
            label: None,
            title: decode_component(rest),
        },
    }
}

fn episode_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:.*? - )?(S\d{2,}E\d{2,}) - (.*)$").expect("valid regex"))
}

fn track_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:.*? - )?(\d{2,}) - (.*)$").expect("valid regex"))
}

fn first_number(s: &str) -> Option<u32> {
    let digits: String = s
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
