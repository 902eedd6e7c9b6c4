//! Stack-based browse engine.
//!
//! Every level re-fetches its choices from the catalog. A pick pushes a
//! [`NavigationFrame`]; a cancelled pick pops one, so the stack doubles as the
//! breadcrumb shown in the picker header. Picking a leaf runs the action menu
//! and leaves the user on the same level.

use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::actions::{ActionDispatcher, Leaf};
use crate::catalog::{Catalog, CatalogError, CatalogItem, FetchProgress, LibrarySection, Listing, MediaKind};
use crate::local::{LocalEntry, LocalStore};
use crate::picker::{self, Picker, PickerError, Selection};
use crate::player::Player;

/// Placeholder shown in place of an empty listing
pub const NO_RESULTS: &str = "-- no results --";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Library,
    Movie,
    Show,
    Season,
    Episode,
    Artist,
    Album,
    Track,
}

impl Level {
    pub fn levels(kind: MediaKind) -> &'static [Level] {
        match kind {
            MediaKind::Movie => &[Level::Library, Level::Movie],
            MediaKind::Show => &[Level::Library, Level::Show, Level::Season, Level::Episode],
            MediaKind::Music => &[Level::Library, Level::Artist, Level::Album, Level::Track],
        }
    }

    /// Picking at a leaf level opens the action menu
    pub fn is_leaf(self) -> bool {
        matches!(self, Level::Movie | Level::Episode | Level::Track)
    }
}

/// Something the user can pick at a level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Section(LibrarySection),
    Item(CatalogItem),
}

impl Choice {
    pub fn id(&self) -> &str {
        match self {
            Choice::Section(section) => &section.key,
            Choice::Item(item) => &item.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Choice::Section(section) => &section.title,
            Choice::Item(item) => &item.title,
        }
    }

    fn label(&self, level: Level) -> String {
        let item = match self {
            Choice::Section(section) => return section.title.clone(),
            Choice::Item(item) => item,
        };

        match (level, item.index) {
            (Level::Episode, Some(index)) => format!("E{:02} - {}", index, item.title),
            (Level::Track, Some(index)) => format!("{:02} - {}", index, item.title),
            (Level::Movie | Level::Show | Level::Album, _) => item.title_with_year(),
            _ => item.title.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigationFrame {
    pub level: Level,
    /// Id of the choice this level's list was fetched under
    pub parent_id: Option<String>,
    pub choices: Vec<Choice>,
    pub selected: usize,
    /// Display names from the root down to this frame's selection
    pub context: Vec<String>,
    /// Picked without prompting because it was the only option
    pub auto_selected: bool,
}

impl NavigationFrame {
    pub fn chosen(&self) -> &Choice {
        &self.choices[self.selected]
    }
}

/// Pop one level. An auto-selected frame is popped along with it, since
/// re-rendering it would just select it again. Returns false once the stack
/// is exhausted and the browse should end.
fn unwind(stack: &mut Vec<NavigationFrame>) -> bool {
    while let Some(frame) = stack.pop() {
        if !frame.auto_selected {
            return true;
        }
        debug!(level = ?frame.level, "unwinding past auto-selected level");
    }
    false
}

fn breadcrumb(kind: MediaKind, stack: &[NavigationFrame]) -> String {
    match stack.last() {
        Some(frame) => frame.context.join(" > "),
        None => format!("{} libraries", kind),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuEntry {
    Remote(MediaKind),
    Local(MediaKind),
}

const MAIN_MENU: &[(&str, MenuEntry)] = &[
    ("Movies", MenuEntry::Remote(MediaKind::Movie)),
    ("TV Shows", MenuEntry::Remote(MediaKind::Show)),
    ("Music", MenuEntry::Remote(MediaKind::Music)),
    ("Downloaded movies", MenuEntry::Local(MediaKind::Movie)),
    ("Downloaded TV shows", MenuEntry::Local(MediaKind::Show)),
    ("Downloaded music", MenuEntry::Local(MediaKind::Music)),
];

pub struct Navigator<C, P, M> {
    catalog: C,
    store: LocalStore,
    picker: P,
    player: M,
    cleanup_partial: bool,
}

impl<C, P, M> Navigator<C, P, M>
where
    C: Catalog,
    P: Picker,
    M: Player,
{
    pub fn new(catalog: C, store: LocalStore, picker: P, player: M, cleanup_partial: bool) -> Self {
        Self {
            catalog,
            store,
            picker,
            player,
            cleanup_partial,
        }
    }

    /// Top-level menu. Returns when the user cancels it.
    pub async fn run(&mut self) -> Result<(), PickerError> {
        let labels: Vec<String> = MAIN_MENU.iter().map(|(label, _)| label.to_string()).collect();

        loop {
            let entry = match self.picker.pick("plexbrowse", &labels).await? {
                Selection::Chosen(i) => match MAIN_MENU.get(i) {
                    Some((_, entry)) => *entry,
                    None => continue,
                },
                Selection::Cancelled => return Ok(()),
            };

            match entry {
                MenuEntry::Remote(kind) => self.browse(kind).await?,
                MenuEntry::Local(kind) => self.browse_local(kind).await?,
            }
        }
    }

    /// Walk the remote catalog for one media kind until the user backs out
    /// of the root level.
    pub async fn browse(&mut self, kind: MediaKind) -> Result<(), PickerError> {
        let levels = Level::levels(kind);
        let mut stack: Vec<NavigationFrame> = Vec::new();
        info!(kind = %kind, "browsing remote catalog");

        loop {
            let level = levels[stack.len()];
            let header = breadcrumb(kind, &stack);

            let choices = match self.fetch(kind, level, stack.last()).await {
                Ok(Listing::Items(choices)) => choices,
                Ok(Listing::Empty) if level == Level::Library => {
                    picker::notify(&format!("No {} libraries on this server", kind));
                    return Ok(());
                }
                Ok(Listing::Empty) => {
                    debug!(level = ?level, "empty listing");
                    self.picker.pick(&header, &[NO_RESULTS.to_string()]).await?;
                    if !unwind(&mut stack) {
                        return Ok(());
                    }
                    continue;
                }
                Err(e) => {
                    error!(error = %e, level = ?level, "listing failed");
                    picker::notify(&format!("Could not load {}: {}", header, e));
                    if !unwind(&mut stack) {
                        return Ok(());
                    }
                    continue;
                }
            };

            let parent_id = stack.last().map(|f| f.chosen().id().to_string());
            let mut context = stack.last().map(|f| f.context.clone()).unwrap_or_default();

            if level == Level::Library && choices.len() == 1 {
                debug!(library = %choices[0].title(), "only one library, selecting it");
                context.push(choices[0].title().to_string());
                stack.push(NavigationFrame {
                    level,
                    parent_id,
                    choices,
                    selected: 0,
                    context,
                    auto_selected: true,
                });
                continue;
            }

            let labels: Vec<String> = choices.iter().map(|c| c.label(level)).collect();
            let selected = match self.picker.pick(&header, &labels).await? {
                Selection::Chosen(i) if i < choices.len() => i,
                Selection::Chosen(_) => continue,
                Selection::Cancelled => {
                    if !unwind(&mut stack) {
                        return Ok(());
                    }
                    continue;
                }
            };

            if level.is_leaf() {
                self.dispatch(kind, &stack, &choices[selected]).await?;
                continue;
            }

            context.push(choices[selected].title().to_string());
            stack.push(NavigationFrame {
                level,
                parent_id,
                choices,
                selected,
                context,
                auto_selected: false,
            });
        }
    }

    async fn fetch(
        &self,
        kind: MediaKind,
        level: Level,
        parent: Option<&NavigationFrame>,
    ) -> Result<Listing<Choice>, CatalogError> {
        let parent = parent.map(NavigationFrame::chosen);

        let listing = match (level, parent) {
            (Level::Library, _) => {
                let sections = self
                    .catalog
                    .list_sections()
                    .await?
                    .into_iter()
                    .filter(|s| s.kind == kind)
                    .map(Choice::Section)
                    .collect();
                return Ok(Listing::from_vec(sections));
            }
            (Level::Movie | Level::Show | Level::Artist, Some(Choice::Section(section))) => {
                let listing = self
                    .catalog
                    .list_items(section, &mut |p| print_progress(&section.title, p))
                    .await;
                finish_progress();
                listing?
            }
            (Level::Season, Some(parent)) => self.catalog.list_seasons(parent.id()).await?,
            (Level::Episode | Level::Album | Level::Track, Some(parent)) => {
                self.catalog.list_children(parent.id()).await?
            }
            (level, _) => {
                return Err(CatalogError::InvalidResponse(format!(
                    "no parent selection for {:?}",
                    level
                )));
            }
        };

        Ok(Listing::from_vec(
            listing.into_vec().into_iter().map(Choice::Item).collect(),
        ))
    }

    async fn dispatch(
        &mut self,
        kind: MediaKind,
        stack: &[NavigationFrame],
        choice: &Choice,
    ) -> Result<(), PickerError> {
        let Choice::Item(item) = choice else {
            return Ok(());
        };

        // Titles between the library and the leaf name the download
        let ancestors: Vec<String> = stack
            .iter()
            .filter(|f| f.level != Level::Library)
            .map(|f| f.chosen().title().to_string())
            .collect();

        let leaf = Leaf {
            kind,
            item,
            ancestors: &ancestors,
        };

        let outcome = ActionDispatcher::new(
            &self.catalog,
            &self.store,
            &mut self.picker,
            &mut self.player,
            self.cleanup_partial,
        )
        .dispatch(&leaf)
        .await?;

        debug!(outcome = ?outcome, "action finished");
        Ok(())
    }

    /// Browse what has already been downloaded and play it without the
    /// server.
    pub async fn browse_local(&mut self, kind: MediaKind) -> Result<(), PickerError> {
        let mut stack: Vec<LocalEntry> = Vec::new();
        info!(kind = %kind, root = %self.store.root().display(), "browsing downloads");

        loop {
            let relative = stack
                .last()
                .map(|e| e.relative_path.clone())
                .unwrap_or_default();
            let header = local_breadcrumb(kind, &stack);

            let entries = match self.store.list(kind, &relative) {
                Ok(entries) => entries,
                Err(e) => {
                    error!(error = %e, "failed to list downloads");
                    picker::notify(&format!("Could not read {}: {}", header, e));
                    if stack.pop().is_none() {
                        return Ok(());
                    }
                    continue;
                }
            };

            if entries.is_empty() {
                self.picker.pick(&header, &[NO_RESULTS.to_string()]).await?;
                if stack.pop().is_none() {
                    return Ok(());
                }
                continue;
            }

            let labels: Vec<String> = entries.iter().map(|e| e.display_name.clone()).collect();
            let entry = match self.picker.pick(&header, &labels).await? {
                Selection::Chosen(i) => match entries.into_iter().nth(i) {
                    Some(entry) => entry,
                    None => continue,
                },
                Selection::Cancelled => {
                    if stack.pop().is_none() {
                        return Ok(());
                    }
                    continue;
                }
            };

            if entry.is_dir {
                stack.push(entry);
                continue;
            }

            let path: PathBuf = self.store.kind_root(kind).join(&entry.relative_path);
            if let Err(e) = self.player.play(&path.to_string_lossy(), &entry.display_name).await {
                error!(error = %e, "local playback failed");
                picker::notify(&format!("Playback failed: {}", e));
            }
        }
    }
}

fn local_breadcrumb(kind: MediaKind, stack: &[LocalEntry]) -> String {
    let mut parts = vec![format!("Downloaded {}", kind)];
    parts.extend(stack.iter().map(|e| e.display_name.clone()));
    parts.join(" > ")
}

fn print_progress(title: &str, progress: FetchProgress) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\rLoading {} {}", title, progress);
    let _ = stderr.flush();
}

fn finish_progress() {
    eprintln!();
}
