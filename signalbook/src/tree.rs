//! Recursive lookup and update over the section hierarchy
//!
//! All functions here are total: an id that does not exist anywhere in the
//! tree is simply not found, and updates targeting it leave the tree as it
//! was.

use crate::content_model::{Chapter, Section};

/// Depth-first search for the first section whose id equals `target_id`
pub fn find_section<'a>(sections: &'a [Section], target_id: &str) -> Option<&'a Section> {
    for section in sections {
        if section.id == target_id {
            return Some(section);
        }
        if let Some(found) = find_section(section.children(), target_id) {
            return Some(found);
        }
    }
    None
}

/// Mutable variant of [`find_section`]
pub fn find_section_mut<'a>(
    sections: &'a mut [Section],
    target_id: &str,
) -> Option<&'a mut Section> {
    for section in sections.iter_mut() {
        if section.id == target_id {
            return Some(section);
        }
        if let Some(children) = section.subsections.as_mut() {
            if let Some(found) = find_section_mut(children, target_id) {
                return Some(found);
            }
        }
    }
    None
}

/// Search every chapter's section tree
pub fn find_in_toc<'a>(toc: &'a [Chapter], target_id: &str) -> Option<&'a Section> {
    toc.iter()
        .find_map(|chapter| find_section(&chapter.sections, target_id))
}

/// Mutable variant of [`find_in_toc`]
pub fn find_in_toc_mut<'a>(toc: &'a mut [Chapter], target_id: &str) -> Option<&'a mut Section> {
    toc.iter_mut()
        .find_map(|chapter| find_section_mut(&mut chapter.sections, target_id))
}

/// Produce a new section list where the node matching `target_id` is replaced
/// by `update_fn(node)`
///
/// The input is left untouched. `update_fn` must keep the section id; the
/// replacement is discarded (and a warning logged) if it does not. When no
/// node matches, the result equals the input.
pub fn update_section_recursively<F>(
    sections: &[Section],
    target_id: &str,
    update_fn: F,
) -> Vec<Section>
where
    F: FnOnce(&Section) -> Section,
{
    let mut updated = sections.to_vec();
    update_section_in_place(&mut updated, target_id, |section| {
        let replacement = update_fn(section);
        if replacement.id == section.id {
            *section = replacement;
        } else {
            log::warn!(
                "Ignoring update of section {} that changed its id to {}",
                section.id,
                replacement.id
            );
        }
    });
    updated
}

/// Apply `update_fn` to the section matching `target_id`, in place
///
/// Returns the closure's result, or `None` when no section matches.
pub fn update_section_in_place<F, R>(
    sections: &mut [Section],
    target_id: &str,
    update_fn: F,
) -> Option<R>
where
    F: FnOnce(&mut Section) -> R,
{
    find_section_mut(sections, target_id).map(update_fn)
}

/// Apply `update_fn` to the section matching `target_id` in any chapter
pub fn update_in_toc<F, R>(toc: &mut [Chapter], target_id: &str, update_fn: F) -> Option<R>
where
    F: FnOnce(&mut Section) -> R,
{
    find_in_toc_mut(toc, target_id).map(update_fn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_model::ContentBlock;

    fn sample_tree() -> Vec<Section> {
        let mut s11 = Section::new("1.1", "Señales", vec![ContentBlock::new("a", "A")]);
        let mut s111 = Section::new("1.1.1", "Ejemplos", Vec::new());
        s111.subsections = Some(vec![Section::new("1.1.1.1", "Deep", Vec::new())]);
        s11.subsections = Some(vec![s111, Section::new("1.1.2", "Energía", Vec::new())]);
        vec![Section::new("1.0", "Introducción", Vec::new()), s11]
    }

    #[test]
    fn test_find_section_at_any_depth() {
        let tree = sample_tree();
        assert_eq!(find_section(&tree, "1.0").unwrap().title, "Introducción");
        assert_eq!(find_section(&tree, "1.1.2").unwrap().title, "Energía");
        assert_eq!(find_section(&tree, "1.1.1.1").unwrap().title, "Deep");
        assert!(find_section(&tree, "9.9").is_none());
    }

    #[test]
    fn test_update_replaces_only_target() {
        let tree = sample_tree();
        let updated = update_section_recursively(&tree, "1.1.2", |section| Section {
            title: "Potencia".to_string(),
            ..section.clone()
        });

        assert_eq!(find_section(&updated, "1.1.2").unwrap().title, "Potencia");
        assert_eq!(find_section(&tree, "1.1.2").unwrap().title, "Energía");
        assert_eq!(updated[0], tree[0]);
        assert_eq!(
            find_section(&updated, "1.1.1").unwrap(),
            find_section(&tree, "1.1.1").unwrap()
        );
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let tree = sample_tree();
        let mut called = false;
        let updated = update_section_recursively(&tree, "7.3", |section| {
            called = true;
            section.clone()
        });
        assert_eq!(updated, tree);
        assert!(!called);

        let mut tree = sample_tree();
        assert!(update_section_in_place(&mut tree, "7.3", |_| ()).is_none());
        assert_eq!(tree, sample_tree());
    }

    #[test]
    fn test_update_rejects_id_change() {
        let tree = sample_tree();
        let updated = update_section_recursively(&tree, "1.0", |section| Section {
            id: "1.9".to_string(),
            ..section.clone()
        });
        assert_eq!(updated, tree);
    }

    #[test]
    fn test_find_in_toc_searches_all_chapters() {
        let mut toc = vec![
            Chapter::new("1", "Uno", sample_tree()),
            Chapter::new("2", "Dos", vec![Section::new("2.1", "LTI", Vec::new())]),
        ];
        assert_eq!(find_in_toc(&toc, "2.1").unwrap().title, "LTI");

        let renamed = update_in_toc(&mut toc, "2.1", |section| {
            section.title = "Sistemas LTI".to_string();
        });
        assert!(renamed.is_some());
        assert_eq!(find_in_toc(&toc, "2.1").unwrap().title, "Sistemas LTI");
    }
}
