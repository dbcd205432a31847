//! Editing session
//!
//! Wires the initial load, the [`TocManager`] and the autosave worker
//! together. All changes go through [`Editor::mutate`], which hands every
//! new revision of the document to the autosave worker.

use crate::autosave::{AutoSaveError, AutoSaveHandle, AutoSaveTiming, PendingSave, SavingStatus};
use crate::manager::TocManager;
use crate::notify::{Notification, Notifier};
use crate::store::{load_or_default, ContentStore, LoadOrigin};
use std::sync::Arc;

/// A loaded document plus whatever keeps it saved
pub struct Editor {
    manager: TocManager,
    store: Arc<dyn ContentStore>,
    autosave: Option<AutoSaveHandle>,
    origin: LoadOrigin,
    saved_revision: u64,
}

impl Editor {
    /// Load the document and start the session
    ///
    /// With `timing`, changes are saved in the background after the quiet
    /// period; without it nothing is written until [`save_now`](Self::save_now)
    /// or [`close`](Self::close).
    pub fn open(
        store: Arc<dyn ContentStore>,
        notifier: Arc<dyn Notifier>,
        timing: Option<AutoSaveTiming>,
    ) -> std::io::Result<Self> {
        let initial = load_or_default(store.as_ref(), notifier.as_ref());
        let manager = TocManager::new(initial.toc, Arc::clone(&notifier));

        let autosave = match timing {
            Some(timing) => Some(AutoSaveHandle::spawn(
                Arc::clone(&store),
                notifier,
                timing,
                manager.revision(),
            )?),
            None => None,
        };

        Ok(Self {
            saved_revision: manager.revision(),
            manager,
            store,
            autosave,
            origin: initial.origin,
        })
    }

    /// Where the document came from
    pub fn origin(&self) -> &LoadOrigin {
        &self.origin
    }

    /// Read access to the document and view state
    pub fn manager(&self) -> &TocManager {
        &self.manager
    }

    /// Apply changes through the manager
    pub fn mutate<R>(&mut self, f: impl FnOnce(&mut TocManager) -> R) -> R {
        let before = self.manager.revision();
        let result = f(&mut self.manager);

        let revision = self.manager.revision();
        if revision != before {
            if let Some(autosave) = &self.autosave {
                autosave.track(revision, self.manager.toc().clone());
            }
        }
        result
    }

    /// Whether the document changed since the last save
    pub fn is_dirty(&self) -> bool {
        self.manager.revision() > self.last_saved_revision()
    }

    /// Revision of the last save, including ones made in the background
    fn last_saved_revision(&self) -> u64 {
        let background = self
            .autosave
            .as_ref()
            .map_or(0, AutoSaveHandle::last_saved_revision);
        self.saved_revision.max(background)
    }

    /// Save status; always idle without autosave
    pub fn saving_status(&self) -> SavingStatus {
        self.autosave
            .as_ref()
            .map(AutoSaveHandle::status)
            .unwrap_or_default()
    }

    /// Write the current document now if it has unsaved changes
    ///
    /// Returns `Ok(false)` when there was nothing to write.
    pub fn save_now(&mut self) -> Result<bool, AutoSaveError> {
        let revision = self.manager.revision();

        let written = match &self.autosave {
            Some(autosave) => autosave.flush(Some(PendingSave {
                revision,
                toc: self.manager.toc().clone(),
            }))?,
            None if revision > self.saved_revision => {
                if let Err(e) = self.store.save(self.manager.toc()) {
                    self.manager.notifier().notify(Notification::error(
                        "Save failed",
                        format!("Your changes could not be saved: {}", e),
                    ));
                    return Err(e.into());
                }
                log::info!("Saved revision {} to {}", revision, self.store.describe());
                true
            }
            None => false,
        };

        self.saved_revision = self.saved_revision.max(revision);
        Ok(written)
    }

    /// Flush pending changes and stop the autosave worker
    pub fn close(mut self) -> Result<bool, AutoSaveError> {
        let result = self.save_now();
        self.autosave.take();
        result
    }
}
