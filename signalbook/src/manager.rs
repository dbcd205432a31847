//! Table-of-contents manager
//!
//! [`TocManager`] is the single owner of the content tree. Every change to
//! chapters, sections or blocks goes through one of its operations, which
//! update the tree and then re-derive the active-section snapshot so the
//! view never drifts from the tree.
//!
//! Operations that target an unknown chapter, section or block leave the
//! tree untouched. They report that through their return value (`false` or
//! `None`) and a debug log line, never through an error.

use crate::content_model::{
    flatten_toc, placeholder_block, Chapter, ContentBlock, Section, TableOfContents,
};
use crate::notify::{Notification, Notifier};
use crate::section_id::next_child_id;
use crate::tree::{find_in_toc, find_in_toc_mut, update_in_toc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Direction for reordering a block within its section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    /// Swap with the previous block
    Up,
    /// Swap with the next block
    Down,
}

impl FromStr for MoveDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown direction '{}', expected up or down", other)),
        }
    }
}

impl fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Direction for stepping through sections in reading order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Previous section
    Prev,
    /// Next section
    Next,
}

/// Owner of the content tree, the active section and the block selection
pub struct TocManager {
    toc: TableOfContents,
    active: Option<Section>,
    selected_block: Option<String>,
    revision: u64,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for TocManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TocManager")
            .field("chapters", &self.toc.len())
            .field("active", &self.active.as_ref().map(|s| s.id.as_str()))
            .field("selected_block", &self.selected_block)
            .field("revision", &self.revision)
            .finish()
    }
}

impl TocManager {
    /// Take ownership of a document; the first section becomes active
    pub fn new(toc: TableOfContents, notifier: Arc<dyn Notifier>) -> Self {
        let active = first_section(&toc).cloned();
        Self {
            toc,
            active,
            selected_block: None,
            revision: 0,
            notifier,
        }
    }

    /// The whole document
    pub fn toc(&self) -> &TableOfContents {
        &self.toc
    }

    /// Snapshot of the section being viewed
    pub fn active_section(&self) -> Option<&Section> {
        self.active.as_ref()
    }

    /// Id of the selected block in the active section
    pub fn selected_block(&self) -> Option<&str> {
        self.selected_block.as_deref()
    }

    /// Counter bumped by every change to the tree
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Look up a section anywhere in the document
    pub fn section(&self, section_id: &str) -> Option<&Section> {
        find_in_toc(&self.toc, section_id)
    }

    /// Look up a chapter by identifier
    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.toc.iter().find(|chapter| chapter.chapter == chapter_id)
    }

    /// Notifier used for operation feedback
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    // ------------------------------------------------------------------
    // View state
    // ------------------------------------------------------------------

    /// Make the section with `section_id` active
    pub fn set_active_section(&mut self, section_id: &str) -> bool {
        match find_in_toc(&self.toc, section_id) {
            Some(section) => {
                self.active = Some(section.clone());
                self.selected_block = None;
                true
            }
            None => {
                log::debug!("set_active_section: no section {}", section_id);
                false
            }
        }
    }

    /// Step to the previous or next section in reading order
    pub fn navigate(&mut self, direction: Navigation) -> bool {
        let Some(active_id) = self.active.as_ref().map(|s| s.id.clone()) else {
            return false;
        };

        let flat = flatten_toc(&self.toc);
        let Some(index) = flat.iter().position(|s| s.id == active_id) else {
            return false;
        };

        let target = match direction {
            Navigation::Prev if index > 0 => flat[index - 1].id.clone(),
            Navigation::Next if index + 1 < flat.len() => flat[index + 1].id.clone(),
            _ => return false,
        };

        self.set_active_section(&target)
    }

    /// Select a block of the active section
    pub fn select_block(&mut self, block_id: &str) -> bool {
        let exists = self
            .active
            .as_ref()
            .is_some_and(|section| section.block(block_id).is_some());
        if exists {
            self.selected_block = Some(block_id.to_string());
        }
        exists
    }

    /// Drop the block selection
    pub fn clear_selection(&mut self) {
        self.selected_block = None;
    }

    // ------------------------------------------------------------------
    // Whole-document operations
    // ------------------------------------------------------------------

    /// Replace the whole document
    ///
    /// The active section keeps its id when it still exists, otherwise the
    /// first section becomes active.
    pub fn replace_toc(&mut self, toc: TableOfContents) {
        self.toc = toc;
        self.commit();
    }

    /// Replace the document from JSON text
    ///
    /// Malformed input leaves the document unchanged and is reported to the
    /// user.
    pub fn import_json(&mut self, text: &str) -> Result<(), serde_json::Error> {
        match serde_json::from_str::<TableOfContents>(text) {
            Ok(toc) => {
                let chapters = toc.len();
                self.replace_toc(toc);
                self.notifier.notify(Notification::info(
                    "Content imported",
                    format!("Loaded {} chapters from file.", chapters),
                ));
                Ok(())
            }
            Err(e) => {
                self.notifier.notify(Notification::error(
                    "Import failed",
                    format!("The file is not a valid content document: {}", e),
                ));
                Err(e)
            }
        }
    }

    /// The document as pretty-printed JSON
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.toc)
    }

    // ------------------------------------------------------------------
    // Block operations
    // ------------------------------------------------------------------

    /// Append a new block to a section
    ///
    /// Returns the new block so the caller can select it, or `None` when the
    /// section does not exist.
    pub fn add_block(&mut self, section_id: &str, html: &str) -> Option<ContentBlock> {
        let block = update_in_toc(&mut self.toc, section_id, |section| {
            let block = ContentBlock::new(fresh_block_id(section), html);
            section.content.push(block.clone());
            block
        });

        match block {
            Some(block) => {
                self.commit();
                self.notifier.notify(Notification::info(
                    "Content added",
                    format!("The HTML block was added to section {}.", section_id),
                ));
                Some(block)
            }
            None => {
                log::debug!("add_block: no section {}", section_id);
                None
            }
        }
    }

    /// Replace the HTML of a block, keeping its id and position
    pub fn edit_block(&mut self, section_id: &str, block_id: &str, html: &str) -> bool {
        let changed = update_in_toc(&mut self.toc, section_id, |section| {
            match section.content.iter_mut().find(|block| block.id == block_id) {
                Some(block) if block.html != html => {
                    block.html = html.to_string();
                    true
                }
                _ => false,
            }
        })
        .unwrap_or(false);

        if changed {
            self.commit();
            self.notifier.notify(Notification::info(
                "Content updated",
                "The HTML block was updated.",
            ));
        } else {
            log::debug!("edit_block: nothing to change for {}/{}", section_id, block_id);
        }
        changed
    }

    /// Remove a block from a section
    pub fn delete_block(&mut self, section_id: &str, block_id: &str) -> bool {
        let removed = update_in_toc(&mut self.toc, section_id, |section| {
            let before = section.content.len();
            section.content.retain(|block| block.id != block_id);
            section.content.len() != before
        })
        .unwrap_or(false);

        if removed {
            if self.selected_block.as_deref() == Some(block_id) {
                self.selected_block = None;
            }
            self.commit();
            self.notifier.notify(Notification::info(
                "Content deleted",
                "The HTML block was deleted.",
            ));
        } else {
            log::debug!("delete_block: no block {}/{}", section_id, block_id);
        }
        removed
    }

    /// Swap a block with its neighbour
    ///
    /// Moving the first block up or the last block down changes nothing.
    pub fn move_block(
        &mut self,
        section_id: &str,
        block_id: &str,
        direction: MoveDirection,
    ) -> bool {
        let moved = update_in_toc(&mut self.toc, section_id, |section| {
            let Some(index) = section.block_index(block_id) else {
                return false;
            };
            let neighbour = match direction {
                MoveDirection::Up if index > 0 => index - 1,
                MoveDirection::Down if index + 1 < section.content.len() => index + 1,
                _ => return false,
            };
            section.content.swap(index, neighbour);
            true
        })
        .unwrap_or(false);

        if moved {
            self.commit();
            self.notifier.notify(Notification::info(
                "Content reordered",
                format!("The HTML block was moved {}.", direction),
            ));
        }
        moved
    }

    // ------------------------------------------------------------------
    // Section operations
    // ------------------------------------------------------------------

    /// Create a section under a chapter or another section
    ///
    /// `parent_id` is tried as a chapter identifier first, then as a
    /// section id. The new section is numbered after its highest-numbered
    /// sibling, seeded with a placeholder block and made active.
    pub fn add_section(&mut self, parent_id: &str, title: &str) -> Option<Section> {
        let chapter_index = self
            .toc
            .iter()
            .position(|chapter| chapter.chapter == parent_id);

        let created = if let Some(index) = chapter_index {
            let chapter = &mut self.toc[index];
            let id = next_child_id(
                &chapter.chapter,
                chapter.sections.iter().map(|s| s.id.as_str()),
            );
            let section = new_section(id, title);
            chapter.sections.push(section.clone());
            Some(section)
        } else {
            find_in_toc_mut(&mut self.toc, parent_id).map(|parent| {
                let siblings = parent.children_mut();
                let id = next_child_id(parent_id, siblings.iter().map(|s| s.id.as_str()));
                let section = new_section(id, title);
                siblings.push(section.clone());
                section
            })
        };

        let Some(section) = created else {
            log::debug!("add_section: no chapter or section {}", parent_id);
            return None;
        };

        self.commit();
        self.active = Some(section.clone());
        self.selected_block = None;
        self.notifier.notify(Notification::info(
            "Section added",
            format!("Added section {} \"{}\".", section.id, title),
        ));
        Some(section)
    }

    /// Change a chapter's title
    pub fn rename_chapter(&mut self, chapter_id: &str, new_title: &str) -> bool {
        let Some(chapter) = self.toc.iter_mut().find(|c| c.chapter == chapter_id) else {
            log::debug!("rename_chapter: no chapter {}", chapter_id);
            return false;
        };

        chapter.title = new_title.to_string();
        self.commit();
        self.notifier.notify(Notification::info(
            "Chapter renamed",
            format!("Chapter {} is now called \"{}\".", chapter_id, new_title),
        ));
        true
    }

    /// Change a section's title
    pub fn rename_section(&mut self, section_id: &str, new_title: &str) -> bool {
        let renamed = update_in_toc(&mut self.toc, section_id, |section| {
            section.title = new_title.to_string();
        })
        .is_some();

        if renamed {
            self.commit();
            self.notifier.notify(Notification::info(
                "Section renamed",
                format!("Section {} is now called \"{}\".", section_id, new_title),
            ));
        } else {
            log::debug!("rename_section: no section {}", section_id);
        }
        renamed
    }

    /// Record a tree change and bring the active snapshot back in line
    fn commit(&mut self) {
        self.revision += 1;
        self.resync_active();
    }

    fn resync_active(&mut self) {
        let Some(active_id) = self.active.as_ref().map(|s| s.id.clone()) else {
            self.active = first_section(&self.toc).cloned();
            return;
        };

        match find_in_toc(&self.toc, &active_id) {
            Some(node) => {
                if self.active.as_ref() != Some(node) {
                    self.active = Some(node.clone());
                }
                let selection_gone = self
                    .selected_block
                    .as_deref()
                    .is_some_and(|block_id| node.block(block_id).is_none());
                if selection_gone {
                    self.selected_block = None;
                }
            }
            None => {
                self.active = first_section(&self.toc).cloned();
                self.selected_block = None;
            }
        }
    }
}

fn first_section(toc: &[Chapter]) -> Option<&Section> {
    toc.iter().find_map(|chapter| chapter.sections.first())
}

fn new_section(id: String, title: &str) -> Section {
    let content = vec![placeholder_block(title, &id)];
    Section {
        id,
        title: title.to_string(),
        content,
        subsections: Some(Vec::new()),
    }
}

/// Random block id not already used in the section
fn fresh_block_id(section: &Section) -> String {
    loop {
        let id = Uuid::new_v4().to_string();
        if section.block(&id).is_none() {
            return id;
        }
    }
}
