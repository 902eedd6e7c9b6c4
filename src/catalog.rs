use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::natsort;

/// Items requested per page when walking a library section.
pub const PAGE_SIZE: usize = 50;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("xml parse error: {0}")]
    XmlError(#[from] quick_xml::Error),
    #[error("server rejected the access token")]
    Unauthorized,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("file error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Show,
    Music,
}

impl MediaKind {
    /// Section `type` attribute used by the server for this kind
    pub fn section_type(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Music => "artist",
        }
    }

    pub fn from_section_type(value: &str) -> Option<Self> {
        match value {
            "movie" => Some(MediaKind::Movie),
            "show" => Some(MediaKind::Show),
            "artist" => Some(MediaKind::Music),
            _ => None,
        }
    }

    /// Subdirectory of the download root holding this kind
    pub fn subroot(self) -> &'static str {
        match self {
            MediaKind::Movie => "movies",
            MediaKind::Show => "shows",
            MediaKind::Music => "music",
        }
    }

    pub fn is_audio(self) -> bool {
        matches!(self, MediaKind::Music)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "TV show",
            MediaKind::Music => "music",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySection {
    pub key: String,
    pub title: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Movie, episode or track
    Leaf,
    /// Show, season, artist or album
    Container,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub title: String,
    pub year: Option<u32>,
    /// Server ratingKey
    pub id: String,
    pub kind: ItemKind,
    /// Season, episode or track number
    pub index: Option<u32>,
    /// Season number of an episode
    pub parent_index: Option<u32>,
}

impl CatalogItem {
    /// "Title (1999)" when the year is known
    pub fn title_with_year(&self) -> String {
        match self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }
}

/// Result of a listing call. `Empty` is kept apart from request failures,
/// which come back as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<T> {
    Items(Vec<T>),
    Empty,
}

impl<T> Listing<T> {
    pub fn from_vec(items: Vec<T>) -> Self {
        if items.is_empty() {
            Listing::Empty
        } else {
            Listing::Items(items)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Listing::Empty)
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Items(items) => items,
            Listing::Empty => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub offset: usize,
    pub page_size: usize,
    /// `None` when the server did not report `totalSize`
    pub total_size: Option<usize>,
}

impl PageCursor {
    pub fn new(total_size: Option<usize>) -> Self {
        Self {
            offset: 0,
            page_size: PAGE_SIZE,
            total_size,
        }
    }

    /// True once the current page reaches the end of the collection. With
    /// an unknown total only an empty page ends the walk.
    pub fn is_last(&self) -> bool {
        self.total_size
            .is_some_and(|total| self.offset + self.page_size >= total)
    }

    pub fn advance(&mut self) {
        self.offset += self.page_size;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub fetched: usize,
    pub total: Option<usize>,
}

impl FetchProgress {
    pub fn percent(&self) -> Option<u8> {
        let total = self.total?;
        if total == 0 {
            return Some(100);
        }
        Some(((self.fetched.min(total) * 100) / total) as u8)
    }
}

impl fmt::Display for FetchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.percent(), self.total) {
            (Some(percent), Some(total)) => {
                write!(f, "{:>3}% ({}/{})", percent, self.fetched, total)
            }
            _ => write!(f, "{} items", self.fetched),
        }
    }
}

/// Where a leaf item can be streamed or downloaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackLocator {
    /// Full URL including the access token
    pub url: String,
    /// Server path of the media part, safe to log
    pub part_key: String,
}

/// Remote catalog capability consumed by the navigation engine.
#[allow(async_fn_in_trait)]
pub trait Catalog {
    async fn list_sections(&self) -> Result<Vec<LibrarySection>, CatalogError>;

    async fn list_items(
        &self,
        section: &LibrarySection,
        progress: &mut dyn FnMut(FetchProgress),
    ) -> Result<Listing<CatalogItem>, CatalogError>;

    async fn list_children(&self, item_id: &str) -> Result<Listing<CatalogItem>, CatalogError>;

    async fn list_seasons(&self, show_id: &str) -> Result<Listing<CatalogItem>, CatalogError>;

    async fn resolve_locator(&self, item_id: &str) -> Result<PlaybackLocator, CatalogError>;

    /// Stream the locator body into `dest`, returning the bytes written
    async fn fetch_to_file(
        &self,
        locator: &PlaybackLocator,
        dest: &Path,
    ) -> Result<u64, CatalogError>;
}

pub struct PlexClient {
    client: Client,
    base_url: String,
    token: String,
}

impl PlexClient {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    /// Server version from the unauthenticated identity endpoint
    pub async fn identity(&self) -> Result<String, CatalogError> {
        let container = self.get_container("/identity").await?;
        Ok(container.attr("version").to_string())
    }

    async fn get_container(&self, path: &str) -> Result<Container, CatalogError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.token)
            .header("Accept", "application/xml")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CatalogError::Unauthorized);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(CatalogError::InvalidResponse(format!("status: {}", status)));
        }

        let xml = response.text().await?;
        parse_container(&xml)
    }

    async fn fetch_page(
        &self,
        section_key: &str,
        offset: usize,
        size: usize,
    ) -> Result<Container, CatalogError> {
        let path = format!(
            "/library/sections/{}/all?X-Plex-Container-Start={}&X-Plex-Container-Size={}",
            urlencoding::encode(section_key),
            offset,
            size
        );
        self.get_container(&path).await
    }

    async fn children(&self, item_id: &str) -> Result<Container, CatalogError> {
        let path = format!(
            "/library/metadata/{}/children",
            urlencoding::encode(item_id)
        );
        self.get_container(&path).await
    }
}

impl Catalog for PlexClient {
    async fn list_sections(&self) -> Result<Vec<LibrarySection>, CatalogError> {
        let container = self.get_container("/library/sections").await?;

        let sections: Vec<LibrarySection> = container
            .nodes
            .iter()
            .filter_map(LibrarySection::from_node)
            .collect();

        debug!(count = sections.len(), "listed library sections");
        Ok(sections)
    }

    async fn list_items(
        &self,
        section: &LibrarySection,
        progress: &mut dyn FnMut(FetchProgress),
    ) -> Result<Listing<CatalogItem>, CatalogError> {
        // A one-item request tells us how much there is to walk
        let head = self.fetch_page(&section.key, 0, 1).await?;
        let total = head.total_size();
        if total == Some(0) {
            debug!(section = %section.title, "section is empty");
            return Ok(Listing::Empty);
        }
        if total.is_none() {
            debug!(section = %section.title, "no totalSize reported, paging until empty");
        }

        // Not pre-sized: the reported total is only a hint
        let mut cursor = PageCursor::new(total);
        let mut items = Vec::new();

        loop {
            let page = self
                .fetch_page(&section.key, cursor.offset, cursor.page_size)
                .await?;
            let before = items.len();
            items.extend(page.nodes.iter().filter_map(CatalogItem::from_node));

            if items.len() == before {
                if total.is_some() {
                    warn!(
                        section = %section.title,
                        offset = cursor.offset,
                        total = ?total,
                        "server returned an empty page before the reported total"
                    );
                }
                break;
            }

            progress(FetchProgress {
                fetched: items.len(),
                total,
            });

            if total.is_some_and(|total| items.len() >= total) || cursor.is_last() {
                break;
            }
            cursor.advance();
        }

        info!(section = %section.title, count = items.len(), "fetched section items");
        Ok(Listing::from_vec(items))
    }

    async fn list_children(&self, item_id: &str) -> Result<Listing<CatalogItem>, CatalogError> {
        let container = self.children(item_id).await?;
        let items = container
            .nodes
            .iter()
            .filter_map(CatalogItem::from_node)
            .collect();
        Ok(Listing::from_vec(items))
    }

    async fn list_seasons(&self, show_id: &str) -> Result<Listing<CatalogItem>, CatalogError> {
        let container = self.children(show_id).await?;
        let mut seasons: Vec<CatalogItem> = container
            .nodes
            .iter()
            .filter(|node| !node.is_all_leaves())
            .filter_map(CatalogItem::from_node)
            .collect();

        natsort::sort_naturally(&mut seasons, |s| s.title.as_str());
        Ok(Listing::from_vec(seasons))
    }

    async fn resolve_locator(&self, item_id: &str) -> Result<PlaybackLocator, CatalogError> {
        let path = format!("/library/metadata/{}", urlencoding::encode(item_id));
        let container = self.get_container(&path).await?;

        let part_key = container
            .nodes
            .iter()
            .find(|node| node.element == Element::Part)
            .map(|node| node.attr("key"))
            .filter(|key| !key.is_empty())
            .ok_or_else(|| CatalogError::NotFound(format!("no playable part for item {}", item_id)))?;

        let url = format!(
            "{}{}?X-Plex-Token={}",
            self.base_url,
            part_key,
            urlencoding::encode(&self.token)
        );

        Ok(PlaybackLocator {
            url,
            part_key: part_key.to_string(),
        })
    }

    async fn fetch_to_file(
        &self,
        locator: &PlaybackLocator,
        dest: &Path,
    ) -> Result<u64, CatalogError> {
        info!(part = %locator.part_key, dest = %dest.display(), "starting download");

        let mut response = self
            .client
            .get(&locator.url)
            .header("X-Plex-Token", &self.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CatalogError::Unauthorized);
        }
        if !status.is_success() {
            return Err(CatalogError::InvalidResponse(format!("status: {}", status)));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(bytes = written, "download finished");
        Ok(written)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Directory,
    Video,
    Track,
    Part,
}

impl Element {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Directory" => Some(Element::Directory),
            b"Video" => Some(Element::Video),
            b"Track" => Some(Element::Track),
            b"Part" => Some(Element::Part),
            _ => None,
        }
    }
}

/// One element of interest with its attributes
#[derive(Debug, Clone)]
struct Node {
    element: Element,
    attrs: HashMap<String, String>,
}

impl Node {
    /// Missing attributes read as empty strings
    fn attr(&self, name: &str) -> &str {
        self.attrs.get(name).map(String::as_str).unwrap_or("")
    }

    fn number(&self, name: &str) -> Option<u32> {
        self.attr(name).parse().ok()
    }

    /// The synthetic "All episodes" directory in a show's children
    fn is_all_leaves(&self) -> bool {
        self.element == Element::Directory
            && (self.attr("ratingKey").is_empty() || self.attr("key").ends_with("/allLeaves"))
    }
}

#[derive(Debug, Default)]
struct Container {
    attrs: HashMap<String, String>,
    nodes: Vec<Node>,
}

impl Container {
    fn attr(&self, name: &str) -> &str {
        self.attrs.get(name).map(String::as_str).unwrap_or("")
    }

    /// The collection size behind a paged response. `size` only counts the
    /// current page, so it is no substitute.
    fn total_size(&self) -> Option<usize> {
        self.attr("totalSize").parse().ok()
    }
}

impl LibrarySection {
    fn from_node(node: &Node) -> Option<Self> {
        if node.element != Element::Directory {
            return None;
        }
        let kind = MediaKind::from_section_type(node.attr("type"))?;
        Some(Self {
            key: node.attr("key").to_string(),
            title: node.attr("title").to_string(),
            kind,
        })
    }
}

impl CatalogItem {
    fn from_node(node: &Node) -> Option<Self> {
        let kind = match node.element {
            Element::Video | Element::Track => ItemKind::Leaf,
            Element::Directory => ItemKind::Container,
            Element::Part => return None,
        };
        Some(Self {
            title: node.attr("title").to_string(),
            year: node.number("year"),
            id: node.attr("ratingKey").to_string(),
            kind,
            index: node.number("index"),
            parent_index: node.number("parentIndex"),
        })
    }
}

/// Only `&amp;` is decoded; other entities pass through untouched.
fn decode_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace("&amp;", "&")
}

fn collect_attrs(e: &BytesStart<'_>) -> HashMap<String, String> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            (key, decode_text(&attr.value))
        })
        .collect()
}

fn parse_container(xml: &str) -> Result<Container, CatalogError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut container: Option<Container> = None;
    let mut nodes = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let name = e.name();
                if name.as_ref() == b"MediaContainer" {
                    container = Some(Container {
                        attrs: collect_attrs(e),
                        nodes: Vec::new(),
                    });
                } else if let Some(element) = Element::from_name(name.as_ref()) {
                    nodes.push(Node {
                        element,
                        attrs: collect_attrs(e),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CatalogError::XmlError(e)),
            _ => {}
        }
    }

    let mut container = container
        .ok_or_else(|| CatalogError::InvalidResponse("missing MediaContainer".to_string()))?;
    container.nodes = nodes;
    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_skips_unsupported_types() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<MediaContainer size="3">
  <Directory key="1" type="movie" title="Movies"/>
  <Directory key="2" type="photo" title="Photos"/>
  <Directory key="3" type="artist" title="Music &amp; Audio">
    <Location id="3" path="/data/music"/>
  </Directory>
</MediaContainer>"#;

        let container = parse_container(xml).unwrap();
        let sections: Vec<LibrarySection> = container
            .nodes
            .iter()
            .filter_map(LibrarySection::from_node)
            .collect();

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].kind, MediaKind::Movie);
        assert_eq!(sections[1].title, "Music & Audio");
        assert_eq!(sections[1].kind, MediaKind::Music);
    }

    #[test]
    fn test_parse_items_with_missing_attributes() {
        let xml = r#"<MediaContainer size="2" totalSize="120" offset="0">
  <Video ratingKey="10" type="movie" title="The Matrix" year="1999">
    <Media><Part key="/library/parts/1/file.mkv"/></Media>
  </Video>
  <Video ratingKey="11" type="movie"/>
</MediaContainer>"#;

        let container = parse_container(xml).unwrap();
        assert_eq!(container.total_size(), Some(120));

        let items: Vec<CatalogItem> = container
            .nodes
            .iter()
            .filter_map(CatalogItem::from_node)
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title_with_year(), "The Matrix (1999)");
        assert_eq!(items[0].kind, ItemKind::Leaf);
        assert_eq!(items[1].title, "");
        assert_eq!(items[1].year, None);
    }

    #[test]
    fn test_only_amp_entity_is_decoded() {
        assert_eq!(decode_text(b"Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_text(b"Rock &apos;n&apos; Roll"), "Rock &apos;n&apos; Roll");
    }

    #[test]
    fn test_all_leaves_directory_detected() {
        let xml = r#"<MediaContainer size="2">
  <Directory key="/library/metadata/5/allLeaves" title="All episodes"/>
  <Directory ratingKey="6" key="/library/metadata/6/children" type="season" title="Season 1" index="1"/>
</MediaContainer>"#;

        let container = parse_container(xml).unwrap();
        assert!(container.nodes[0].is_all_leaves());
        assert!(!container.nodes[1].is_all_leaves());
    }

    #[test]
    fn test_missing_container_is_invalid() {
        let result = parse_container("<html></html>");
        assert!(matches!(result, Err(CatalogError::InvalidResponse(_))));
    }

    #[test]
    fn test_page_cursor() {
        let mut cursor = PageCursor::new(Some(120));
        assert_eq!(cursor.offset, 0);
        assert!(!cursor.is_last());
        cursor.advance();
        assert_eq!(cursor.offset, 50);
        assert!(!cursor.is_last());
        cursor.advance();
        assert_eq!(cursor.offset % cursor.page_size, 0);
        assert!(cursor.is_last());
    }

    #[test]
    fn test_fetch_progress() {
        let progress = FetchProgress {
            fetched: 50,
            total: Some(200),
        };
        assert_eq!(progress.percent(), Some(25));
        assert_eq!(progress.to_string(), " 25% (50/200)");
        assert_eq!(
            FetchProgress {
                fetched: 0,
                total: Some(0)
            }
            .percent(),
            Some(100)
        );

        let unknown = FetchProgress {
            fetched: 150,
            total: None,
        };
        assert_eq!(unknown.percent(), None);
        assert_eq!(unknown.to_string(), "150 items");
    }

    #[test]
    fn test_page_cursor_unknown_total() {
        let mut cursor = PageCursor::new(None);
        for _ in 0..1000 {
            assert!(!cursor.is_last());
            cursor.advance();
        }
    }

    #[test]
    fn test_total_size_ignores_page_size() {
        let container = parse_container(r#"<MediaContainer size="1"/>"#).unwrap();
        assert_eq!(container.total_size(), None);
    }

    #[test]
    fn test_listing_from_vec() {
        assert!(Listing::<u32>::from_vec(Vec::new()).is_empty());
        assert_eq!(Listing::from_vec(vec![1]).into_vec(), vec![1]);
    }
}
