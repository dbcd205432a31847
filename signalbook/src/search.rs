//! Sidebar search over the table of contents

use crate::content_model::{Chapter, Section, TableOfContents};

/// Filter the document down to what matches `term`
///
/// Matching is a case-insensitive substring test on titles and ids. A
/// section survives when it matches or when any of its descendants does; a
/// chapter survives when its own title or identifier matches or when any of
/// its sections survive. An empty (or blank) term returns the whole tree.
pub fn filter_toc(toc: &[Chapter], term: &str) -> TableOfContents {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return toc.to_vec();
    }

    toc.iter()
        .filter_map(|chapter| {
            let sections = filter_sections(&chapter.sections, &needle);
            let chapter_matches = matches(&chapter.title, &chapter.chapter, &needle);
            (chapter_matches || !sections.is_empty()).then(|| Chapter {
                sections,
                ..chapter.clone()
            })
        })
        .collect()
}

/// Filter a section list with an already lowercased needle
fn filter_sections(sections: &[Section], needle: &str) -> Vec<Section> {
    sections
        .iter()
        .filter_map(|section| {
            let children = section
                .subsections
                .as_deref()
                .map(|subsections| filter_sections(subsections, needle));
            let has_kept_children = children.as_ref().is_some_and(|c| !c.is_empty());

            (matches(&section.title, &section.id, needle) || has_kept_children).then(|| Section {
                subsections: children,
                ..section.clone()
            })
        })
        .collect()
}

fn matches(title: &str, id: &str, needle: &str) -> bool {
    title.to_lowercase().contains(needle) || id.to_lowercase().contains(needle)
}
