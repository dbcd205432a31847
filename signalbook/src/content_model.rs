//! Content tree for the textbook
//!
//! The whole document is an ordered list of chapters. Each chapter owns an
//! ordered list of sections, sections own their content blocks ("slides")
//! and, optionally, nested subsections of unbounded depth.
//!
//! The serde mapping is the persisted JSON format:
//!
//! ```json
//! [{ "chapter": "1", "title": "...", "sections": [
//!     { "id": "1.1", "title": "...", "content": [{ "id": "...", "html": "..." }],
//!       "subsections": [ ... ] } ] }]
//! ```
//!
//! `subsections` is optional on disk. A section loaded without the key is
//! written back without it, so load followed by save reproduces the input.

use serde::{Deserialize, Serialize};

/// The whole document: chapters in reading order
pub type TableOfContents = Vec<Chapter>;

/// One HTML fragment shown within a section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Unique block identifier
    pub id: String,
    /// Raw HTML of the slide
    pub html: String,
}

impl ContentBlock {
    /// Create a block from an id and its HTML
    pub fn new(id: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            html: html.into(),
        }
    }
}

/// A navigable unit with its own blocks and optional subsections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Dotted hierarchical id (e.g., "1.6.2")
    pub id: String,
    /// Section title
    pub title: String,
    /// Content blocks in display order
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Nested sections, absent when the section never had any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsections: Option<Vec<Section>>,
}

impl Section {
    /// Create a section without a subsection list
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content,
            subsections: None,
        }
    }

    /// Subsections, empty when the list is absent
    pub fn children(&self) -> &[Section] {
        self.subsections.as_deref().unwrap_or(&[])
    }

    /// Mutable subsection list, created on first use
    pub fn children_mut(&mut self) -> &mut Vec<Section> {
        self.subsections.get_or_insert_with(Vec::new)
    }

    /// Position of a block in the content list
    pub fn block_index(&self, block_id: &str) -> Option<usize> {
        self.content.iter().position(|block| block.id == block_id)
    }

    /// Look up a block by id
    pub fn block(&self, block_id: &str) -> Option<&ContentBlock> {
        self.content.iter().find(|block| block.id == block_id)
    }

    /// Count blocks in this section and all subsections
    pub fn block_count(&self) -> usize {
        let own = self.content.len();
        let nested: usize = self.children().iter().map(Section::block_count).sum();
        own + nested
    }

    /// Flatten the section hierarchy into a pre-order list
    pub fn flatten(&self) -> Vec<&Section> {
        let mut result = vec![self];
        for subsection in self.children() {
            result.extend(subsection.flatten());
        }
        result
    }
}

/// Top-level container of sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter identifier (e.g., "1")
    pub chapter: String,
    /// Chapter title
    pub title: String,
    /// Top-level sections of the chapter
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Chapter {
    /// Create a chapter
    pub fn new(chapter: impl Into<String>, title: impl Into<String>, sections: Vec<Section>) -> Self {
        Self {
            chapter: chapter.into(),
            title: title.into(),
            sections,
        }
    }

    /// All sections of the chapter in pre-order
    pub fn flatten(&self) -> Vec<&Section> {
        self.sections.iter().flat_map(Section::flatten).collect()
    }
}

/// All sections of the document in pre-order (chapter by chapter)
pub fn flatten_toc(toc: &[Chapter]) -> Vec<&Section> {
    toc.iter().flat_map(Chapter::flatten).collect()
}

/// Stand-in block seeded into newly created sections
pub fn placeholder_block(title: &str, section_id: &str) -> ContentBlock {
    ContentBlock {
        id: format!("placeholder-{}", section_id),
        html: format!(
            "<div class='space-y-4'>\n  \
             <h2 class='text-3xl font-bold text-primary border-b-2 border-border pb-2'>{id} {title}</h2>\n  \
             <p class='text-lg'>El contenido para esta sección aún no está disponible.</p>\n  \
             <p>Este es un marcador de posición para la sección sobre <strong>{title}</strong>.</p>\n\
             </div>",
            id = section_id,
            title = title
        ),
    }
}
