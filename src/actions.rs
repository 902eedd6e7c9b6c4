use std::ffi::OsString;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::catalog::{Catalog, CatalogError, CatalogItem, MediaKind};
use crate::local::LocalStore;
use crate::naming::{self, DownloadTarget};
use crate::picker::{self, Picker, PickerError, Selection};
use crate::player::{Player, PlayerError};

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("{0}")]
    CatalogError(#[from] CatalogError),
    #[error("{0}")]
    PlayerError(#[from] PlayerError),
    #[error("file error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("refusing to write outside the download root: {0}")]
    OutsideRoot(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    PlayLocal,
    PlayRemote,
    Download,
}

impl MediaAction {
    pub fn label(self) -> &'static str {
        match self {
            MediaAction::PlayLocal => "Play local copy",
            MediaAction::PlayRemote => "Stream from server",
            MediaAction::Download => "Download",
        }
    }
}

/// Actions offered for a leaf; local playback only when a copy exists
pub fn available_actions(has_local: bool) -> Vec<MediaAction> {
    let mut actions = Vec::with_capacity(3);
    if has_local {
        actions.push(MediaAction::PlayLocal);
    }
    actions.push(MediaAction::PlayRemote);
    actions.push(MediaAction::Download);
    actions
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Cancelled,
    Played,
    Downloaded(PathBuf),
    Failed(String),
}

/// A playable item plus the titles above it in the browse stack
#[derive(Debug, Clone, Copy)]
pub struct Leaf<'a> {
    pub kind: MediaKind,
    pub item: &'a CatalogItem,
    /// `[show, season]` or `[artist, album]`
    pub ancestors: &'a [String],
}

pub struct ActionDispatcher<'a, C, P, M> {
    catalog: &'a C,
    store: &'a LocalStore,
    picker: &'a mut P,
    player: &'a mut M,
    cleanup_partial: bool,
}

impl<'a, C, P, M> ActionDispatcher<'a, C, P, M>
where
    C: Catalog,
    P: Picker,
    M: Player,
{
    pub fn new(
        catalog: &'a C,
        store: &'a LocalStore,
        picker: &'a mut P,
        player: &'a mut M,
        cleanup_partial: bool,
    ) -> Self {
        Self {
            catalog,
            store,
            picker,
            player,
            cleanup_partial,
        }
    }

    /// Offer the action menu for `leaf` and run the chosen action. Failures
    /// are reported to the user and come back as `Failed`; only a broken
    /// picker is an error.
    pub async fn dispatch(&mut self, leaf: &Leaf<'_>) -> Result<ActionOutcome, PickerError> {
        let target = naming::encode(leaf.kind, leaf.item, leaf.ancestors);
        let local = self
            .store
            .exists(leaf.kind, &target.filename, &target.directory);

        let actions = available_actions(local.is_some());
        let labels: Vec<String> = actions.iter().map(|a| a.label().to_string()).collect();

        let action = match self.picker.pick(&target.filename, &labels).await? {
            Selection::Chosen(i) => match actions.get(i) {
                Some(action) => *action,
                None => return Ok(ActionOutcome::Cancelled),
            },
            Selection::Cancelled => return Ok(ActionOutcome::Cancelled),
        };

        debug!(action = ?action, item = %leaf.item.id, "dispatching action");

        let title = naming::decode_component(&target.filename);
        let result = match (action, local) {
            (MediaAction::PlayLocal, Some(path)) => self.play_local(&path, &title).await,
            (MediaAction::PlayLocal, None) => return Ok(ActionOutcome::Cancelled),
            (MediaAction::PlayRemote, _) => self.play_remote(leaf, &title).await,
            (MediaAction::Download, _) => {
                if !self.confirm_download(&target).await? {
                    return Ok(ActionOutcome::Cancelled);
                }
                self.download(leaf, &target).await
            }
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, item = %leaf.item.id, "action failed");
                picker::notify(&format!("{} failed: {}", action.label(), e));
                Ok(ActionOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn confirm_download(&mut self, target: &DownloadTarget) -> Result<bool, PickerError> {
        let header = format!("Download \"{}\"?", target.filename);
        let answers = ["Yes".to_string(), "No".to_string()];
        Ok(self.picker.pick(&header, &answers).await? == Selection::Chosen(0))
    }

    async fn play_local(&mut self, path: &Path, title: &str) -> Result<ActionOutcome, ActionError> {
        info!(path = %path.display(), "playing local copy");
        self.player.play(&path.to_string_lossy(), title).await?;
        Ok(ActionOutcome::Played)
    }

    async fn play_remote(&mut self, leaf: &Leaf<'_>, title: &str) -> Result<ActionOutcome, ActionError> {
        let locator = self.catalog.resolve_locator(&leaf.item.id).await?;
        info!(part = %locator.part_key, "streaming from server");
        self.player.play(&locator.url, title).await?;
        Ok(ActionOutcome::Played)
    }

    async fn download(&mut self, leaf: &Leaf<'_>, target: &DownloadTarget) -> Result<ActionOutcome, ActionError> {
        let locator = self.catalog.resolve_locator(&leaf.item.id).await?;
        let extension = naming::extension_for(leaf.kind, &locator.url);
        let dest = self.store.target_path(leaf.kind, target, &extension);
        if !self.store.contains(&dest) {
            return Err(ActionError::OutsideRoot(dest));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(&dest);
        picker::notify(&format!("Downloading {} ...", target.file_name(&extension)));

        match self.catalog.fetch_to_file(&locator, &partial).await {
            Ok(bytes) => {
                tokio::fs::rename(&partial, &dest).await?;
                info!(dest = %dest.display(), bytes, "download saved");
                picker::notify(&format!("Saved to {}", dest.display()));
                Ok(ActionOutcome::Downloaded(dest))
            }
            Err(e) => {
                if self.cleanup_partial {
                    if let Err(rm) = tokio::fs::remove_file(&partial).await {
                        debug!(error = %rm, "no partial file to remove");
                    }
                }
                Err(e.into())
            }
        }
    }
}

/// `movie.mkv` -> `movie.mkv.part`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}
