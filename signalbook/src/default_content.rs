//! Built-in textbook used when no backup exists
//!
//! The outline is compiled into the binary. Every section receives a
//! placeholder slide unless the outline supplies a slide for it.

use crate::content_model::{placeholder_block, Chapter, ContentBlock, Section, TableOfContents};
use crate::section_id::parent_of;
use crate::tree::find_section_mut;
use serde::Deserialize;
use std::collections::HashMap;

/// Embedded outline of the default document
const DEFAULT_OUTLINE: &str = include_str!("content/default_outline.toml");

/// Outline file schema
#[derive(Debug, Deserialize)]
struct Outline {
    chapters: Vec<OutlineChapter>,
    #[serde(default)]
    slides: Vec<OutlineSlide>,
}

#[derive(Debug, Deserialize)]
struct OutlineChapter {
    chapter: String,
    title: String,
    /// (id, title) pairs in reading order
    sections: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct OutlineSlide {
    section: String,
    id: String,
    html: String,
}

/// The default document
///
/// Never fails: a broken embedded outline yields an empty document and an
/// error in the log.
pub fn default_toc() -> TableOfContents {
    parse_outline(DEFAULT_OUTLINE).unwrap_or_else(|e| {
        log::error!("Embedded default outline is invalid: {}", e);
        Vec::new()
    })
}

/// Build a document from outline TOML
pub fn parse_outline(text: &str) -> Result<TableOfContents, toml::de::Error> {
    let outline: Outline = toml::from_str(text)?;

    let mut slides: HashMap<String, Vec<ContentBlock>> = HashMap::new();
    for slide in outline.slides {
        slides
            .entry(slide.section)
            .or_default()
            .push(ContentBlock::new(slide.id, slide.html.trim()));
    }

    let toc = outline
        .chapters
        .into_iter()
        .map(|chapter| build_chapter(chapter, &mut slides))
        .collect();

    Ok(toc)
}

fn build_chapter(
    outline: OutlineChapter,
    slides: &mut HashMap<String, Vec<ContentBlock>>,
) -> Chapter {
    let mut chapter = Chapter::new(outline.chapter, outline.title, Vec::new());

    for (id, title) in outline.sections {
        let content = slides
            .remove(&id)
            .unwrap_or_else(|| vec![placeholder_block(&title, &id)]);
        let section = Section::new(id, title, content);
        attach_section(&mut chapter, section);
    }

    chapter
}

/// Place a section under its parent, derived from the dotted id
fn attach_section(chapter: &mut Chapter, section: Section) {
    let parent_id = parent_of(&section.id).unwrap_or("");

    if parent_id == chapter.chapter {
        chapter.sections.push(section);
        return;
    }

    match find_section_mut(&mut chapter.sections, parent_id) {
        Some(parent) => parent.children_mut().push(section),
        None => {
            log::warn!(
                "Section {} has no parent in chapter {}; attaching at top level",
                section.id,
                chapter.chapter
            );
            chapter.sections.push(section);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_model::flatten_toc;
    use crate::tree::find_in_toc;

    #[test]
    fn test_default_outline_parses() {
        let toc = parse_outline(DEFAULT_OUTLINE).unwrap();
        assert_eq!(toc.len(), 11);
        assert_eq!(toc[0].chapter, "1");
        assert_eq!(toc[0].title, "SEÑALES Y SISTEMAS");
        assert_eq!(toc[0].sections[0].id, "1.0");
    }

    #[test]
    fn test_default_nesting_follows_ids() {
        let toc = default_toc();
        let s11 = find_in_toc(&toc, "1.1").unwrap();
        let child_ids: Vec<&str> = s11.children().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(child_ids, vec!["1.1.1", "1.1.2"]);

        // leaves carry no subsection list at all
        assert!(find_in_toc(&toc, "1.1.1").unwrap().subsections.is_none());

        for section in flatten_toc(&toc) {
            for child in section.children() {
                assert_eq!(parent_of(&child.id), Some(section.id.as_str()));
            }
        }
    }

    #[test]
    fn test_default_slides() {
        let toc = default_toc();
        let intro = find_in_toc(&toc, "1.0").unwrap();
        assert_eq!(intro.content.len(), 1);
        assert_eq!(intro.content[0].id, "initial-1.0");
        assert!(intro.content[0].html.contains("$$x(t) = A \\cos(\\omega_0 t + \\phi)$$"));

        let placeholder = find_in_toc(&toc, "1.2.2").unwrap();
        assert_eq!(placeholder.content[0].id, "placeholder-1.2.2");
    }

    #[test]
    fn test_orphan_section_is_kept() {
        let text = r#"
[[chapters]]
chapter = "4"
title = "Fourier"
sections = [["4.1", "Uno"], ["4.9.1", "Huérfana"]]
"#;
        let toc = parse_outline(text).unwrap();
        let ids: Vec<&str> = toc[0].sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["4.1", "4.9.1"]);
    }
}
