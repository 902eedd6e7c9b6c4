//! In-memory stand-ins for the catalog, picker and player.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;

use crate::catalog::{
    Catalog, CatalogError, CatalogItem, FetchProgress, ItemKind, LibrarySection, Listing,
    MediaKind, PlaybackLocator,
};
use crate::picker::{Picker, PickerError, Selection};
use crate::player::{Player, PlayerError};

#[derive(Default)]
pub struct FakeCatalog {
    pub sections: Vec<LibrarySection>,
    /// Keyed by section key
    pub items: HashMap<String, Listing<CatalogItem>>,
    /// Keyed by parent item id
    pub children: HashMap<String, Listing<CatalogItem>>,
    /// Keyed by show id
    pub seasons: HashMap<String, Listing<CatalogItem>>,
    pub locators: HashMap<String, PlaybackLocator>,
    /// Body written by `fetch_to_file`; `None` makes the transfer fail midway
    pub payload: Option<Vec<u8>>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeCatalog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

fn lookup(
    map: &HashMap<String, Listing<CatalogItem>>,
    id: &str,
) -> Result<Listing<CatalogItem>, CatalogError> {
    map.get(id)
        .cloned()
        .ok_or_else(|| CatalogError::NotFound(id.to_string()))
}

impl Catalog for FakeCatalog {
    async fn list_sections(&self) -> Result<Vec<LibrarySection>, CatalogError> {
        self.record("sections".to_string());
        Ok(self.sections.clone())
    }

    async fn list_items(
        &self,
        section: &LibrarySection,
        progress: &mut dyn FnMut(FetchProgress),
    ) -> Result<Listing<CatalogItem>, CatalogError> {
        self.record(format!("items:{}", section.key));
        let listing = lookup(&self.items, &section.key)?;
        if let Listing::Items(items) = &listing {
            progress(FetchProgress {
                fetched: items.len(),
                total: Some(items.len()),
            });
        }
        Ok(listing)
    }

    async fn list_children(&self, item_id: &str) -> Result<Listing<CatalogItem>, CatalogError> {
        self.record(format!("children:{}", item_id));
        lookup(&self.children, item_id)
    }

    async fn list_seasons(&self, show_id: &str) -> Result<Listing<CatalogItem>, CatalogError> {
        self.record(format!("seasons:{}", show_id));
        lookup(&self.seasons, show_id)
    }

    async fn resolve_locator(&self, item_id: &str) -> Result<PlaybackLocator, CatalogError> {
        self.record(format!("locator:{}", item_id));
        self.locators
            .get(item_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(item_id.to_string()))
    }

    async fn fetch_to_file(
        &self,
        locator: &PlaybackLocator,
        dest: &Path,
    ) -> Result<u64, CatalogError> {
        self.record(format!("fetch:{}", locator.part_key));
        match &self.payload {
            Some(body) => {
                tokio::fs::write(dest, body).await?;
                Ok(body.len() as u64)
            }
            None => {
                tokio::fs::write(dest, b"partial").await?;
                Err(CatalogError::IoError(std::io::Error::other(
                    "connection reset",
                )))
            }
        }
    }
}

/// Replays scripted selections; once the script runs out every prompt is
/// cancelled, so any browse loop unwinds and ends.
#[derive(Default)]
pub struct FakePicker {
    pub script: VecDeque<Selection<usize>>,
    pub prompts: Vec<(String, Vec<String>)>,
}

impl FakePicker {
    pub fn new(script: Vec<Selection<usize>>) -> Self {
        Self {
            script: script.into(),
            prompts: Vec::new(),
        }
    }

    /// Entries shown at each prompt, in order
    pub fn shown(&self) -> Vec<Vec<String>> {
        self.prompts.iter().map(|(_, entries)| entries.clone()).collect()
    }
}

impl Picker for FakePicker {
    async fn pick(&mut self, header: &str, entries: &[String]) -> Result<Selection<usize>, PickerError> {
        self.prompts.push((header.to_string(), entries.to_vec()));
        Ok(self.script.pop_front().unwrap_or(Selection::Cancelled))
    }
}

#[derive(Default)]
pub struct FakePlayer {
    pub played: Vec<(String, String)>,
    pub fail: bool,
}

impl Player for FakePlayer {
    async fn play(&mut self, locator: &str, title: &str) -> Result<(), PlayerError> {
        self.played.push((locator.to_string(), title.to_string()));
        if self.fail {
            Err(PlayerError::Exited(2))
        } else {
            Ok(())
        }
    }
}

pub fn section(key: &str, title: &str, kind: MediaKind) -> LibrarySection {
    LibrarySection {
        key: key.to_string(),
        title: title.to_string(),
        kind,
    }
}

pub fn container(id: &str, title: &str, index: Option<u32>) -> CatalogItem {
    CatalogItem {
        title: title.to_string(),
        year: None,
        id: id.to_string(),
        kind: ItemKind::Container,
        index,
        parent_index: None,
    }
}

pub fn leaf(id: &str, title: &str, index: Option<u32>, parent_index: Option<u32>) -> CatalogItem {
    CatalogItem {
        title: title.to_string(),
        year: None,
        id: id.to_string(),
        kind: ItemKind::Leaf,
        index,
        parent_index,
    }
}

pub fn locator(part_key: &str) -> PlaybackLocator {
    PlaybackLocator {
        url: format!("http://plex.test{}?X-Plex-Token=t", part_key),
        part_key: part_key.to_string(),
    }
}
