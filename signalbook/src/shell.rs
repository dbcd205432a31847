//! Interactive editing shell
//!
//! Reads one command per line and applies it to an [`Editor`]. Lines are
//! split like a POSIX shell: single or double quotes group words, so HTML
//! with attributes is best passed in single quotes:
//!
//! ```text
//! 1.1> add '<p class="lead">Una señal periódica...</p>'
//! ```

use crate::content_model::{Chapter, Section};
use crate::editor::Editor;
use crate::generation::{generate_slide, illustrate_block, ContentGenerator};
use crate::manager::{MoveDirection, Navigation};
use crate::search::filter_toc;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use std::io::{self, BufRead, Write};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "signalbook", disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

/// Commands accepted by the shell
#[derive(Subcommand, Debug)]
enum ShellCommand {
    /// Print the table of contents, optionally filtered
    #[command(alias = "ls")]
    Outline {
        /// Case-insensitive search on titles and ids
        search: Option<String>,
    },

    /// Print the active section's blocks
    Show,

    /// Make a section active
    #[command(alias = "cd")]
    Open { section_id: String },

    /// Go to the next section in reading order
    Next,

    /// Go to the previous section in reading order
    Prev,

    /// Select a block of the active section
    Select { block_id: String },

    /// Drop the block selection
    #[command(alias = "deselect")]
    Unselect,

    /// Append an HTML block to the active section
    Add {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        html: Vec<String>,
    },

    /// Replace the HTML of a block in the active section
    Edit {
        block_id: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        html: Vec<String>,
    },

    /// Delete a block from the active section
    Delete { block_id: String },

    /// Move a block of the active section up or down
    Move {
        block_id: String,
        direction: MoveDirection,
    },

    /// Add a section under a chapter or section
    AddSection {
        parent_id: String,
        #[arg(required = true, trailing_var_arg = true)]
        title: Vec<String>,
    },

    /// Rename a chapter
    RenameChapter {
        chapter_id: String,
        #[arg(required = true, trailing_var_arg = true)]
        title: Vec<String>,
    },

    /// Rename a section
    RenameSection {
        section_id: String,
        #[arg(required = true, trailing_var_arg = true)]
        title: Vec<String>,
    },

    /// Generate a slide for the active section with AI
    Generate {
        #[arg(required = true, trailing_var_arg = true)]
        topic: Vec<String>,
    },

    /// Add an AI illustration to a block of the active section
    Illustrate {
        block_id: String,
        #[arg(required = true, trailing_var_arg = true)]
        topic: Vec<String>,
    },

    /// Show the save status
    Status,

    /// Save now
    Save,

    /// Save and leave the shell
    #[command(alias = "exit")]
    Quit,
}

enum Flow {
    Continue,
    Quit,
}

/// Run the shell until `quit` or end of input
pub fn run_shell<R: BufRead, W: Write>(
    editor: &mut Editor,
    generator: Option<&dyn ContentGenerator>,
    mut input: R,
    mut out: W,
) -> io::Result<()> {
    writeln!(out, "signalbook shell, type 'help' for commands")?;

    let mut line = String::new();
    loop {
        let prompt = editor
            .manager()
            .active_section()
            .map_or_else(String::new, |s| s.id.clone());
        write!(out, "{}> ", prompt)?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }

        let words = match split_words(&line) {
            Ok(words) if words.is_empty() => continue,
            Ok(words) => words,
            Err(message) => {
                writeln!(out, "{}", message)?;
                continue;
            }
        };

        let command = match ShellLine::try_parse_from(words) {
            Ok(parsed) => parsed.command,
            Err(e) => {
                write!(out, "{}", e)?;
                continue;
            }
        };

        if let Flow::Quit = execute(editor, generator, command, &mut out)? {
            break;
        }
    }
    Ok(())
}

fn execute<W: Write>(
    editor: &mut Editor,
    generator: Option<&dyn ContentGenerator>,
    command: ShellCommand,
    out: &mut W,
) -> io::Result<Flow> {
    let active_id = editor.manager().active_section().map(|s| s.id.clone());

    match command {
        ShellCommand::Outline { search } => {
            let toc = filter_toc(editor.manager().toc(), search.as_deref().unwrap_or(""));
            write_outline(out, &toc, active_id.as_deref())?;
        }
        ShellCommand::Show => match editor.manager().active_section() {
            Some(section) => write_section(out, section, editor.manager().selected_block())?,
            None => writeln!(out, "No active section.")?,
        },
        ShellCommand::Open { section_id } => {
            if !editor.mutate(|m| m.set_active_section(&section_id)) {
                writeln!(out, "No section {}.", section_id)?;
            }
        }
        ShellCommand::Next => {
            if !editor.mutate(|m| m.navigate(Navigation::Next)) {
                writeln!(out, "Already at the last section.")?;
            }
        }
        ShellCommand::Prev => {
            if !editor.mutate(|m| m.navigate(Navigation::Prev)) {
                writeln!(out, "Already at the first section.")?;
            }
        }
        ShellCommand::Select { block_id } => {
            if !editor.mutate(|m| m.select_block(&block_id)) {
                writeln!(out, "No block {} in the active section.", block_id)?;
            }
        }
        ShellCommand::Unselect => editor.mutate(|m| m.clear_selection()),
        ShellCommand::Add { html } => {
            let Some(section_id) = active_id else {
                return no_active_section(out);
            };
            let html = html.join(" ");
            let added = editor.mutate(|m| {
                let block = m.add_block(&section_id, &html)?;
                m.select_block(&block.id);
                Some(block)
            });
            if let Some(block) = added {
                writeln!(out, "Added block {}.", block.id)?;
            }
        }
        ShellCommand::Edit { block_id, html } => {
            let Some(section_id) = active_id else {
                return no_active_section(out);
            };
            let html = html.join(" ");
            if !editor.mutate(|m| m.edit_block(&section_id, &block_id, &html)) {
                writeln!(out, "Block {} unchanged.", block_id)?;
            }
        }
        ShellCommand::Delete { block_id } => {
            let Some(section_id) = active_id else {
                return no_active_section(out);
            };
            if !editor.mutate(|m| m.delete_block(&section_id, &block_id)) {
                writeln!(out, "No block {} in section {}.", block_id, section_id)?;
            }
        }
        ShellCommand::Move {
            block_id,
            direction,
        } => {
            let Some(section_id) = active_id else {
                return no_active_section(out);
            };
            if !editor.mutate(|m| m.move_block(&section_id, &block_id, direction)) {
                writeln!(out, "Block {} not moved.", block_id)?;
            }
        }
        ShellCommand::AddSection { parent_id, title } => {
            let title = title.join(" ");
            if editor.mutate(|m| m.add_section(&parent_id, &title)).is_none() {
                writeln!(out, "No chapter or section {}.", parent_id)?;
            }
        }
        ShellCommand::RenameChapter { chapter_id, title } => {
            let title = title.join(" ");
            if !editor.mutate(|m| m.rename_chapter(&chapter_id, &title)) {
                writeln!(out, "No chapter {}.", chapter_id)?;
            }
        }
        ShellCommand::RenameSection { section_id, title } => {
            let title = title.join(" ");
            if !editor.mutate(|m| m.rename_section(&section_id, &title)) {
                writeln!(out, "No section {}.", section_id)?;
            }
        }
        ShellCommand::Generate { topic } => {
            let Some(section_id) = active_id else {
                return no_active_section(out);
            };
            let Some(generator) = generator else {
                return no_generator(out);
            };
            let topic = topic.join(" ");
            writeln!(out, "Generating...")?;
            // failures are reported through the notifier
            let _ = editor.mutate(|m| generate_slide(m, generator, &section_id, &topic));
        }
        ShellCommand::Illustrate { block_id, topic } => {
            let Some(section_id) = active_id else {
                return no_active_section(out);
            };
            let Some(generator) = generator else {
                return no_generator(out);
            };
            let topic = topic.join(" ");
            writeln!(out, "Generating image...")?;
            match editor.mutate(|m| illustrate_block(m, generator, &section_id, &block_id, &topic)) {
                Ok(false) => writeln!(out, "No block {} in section {}.", block_id, section_id)?,
                Ok(true) | Err(_) => {}
            }
        }
        ShellCommand::Status => {
            writeln!(
                out,
                "Save status: {}{}",
                editor.saving_status(),
                if editor.is_dirty() { " (unsaved changes)" } else { "" }
            )?;
        }
        ShellCommand::Save => match editor.save_now() {
            Ok(true) => writeln!(out, "Saved.")?,
            Ok(false) => writeln!(out, "Nothing to save.")?,
            Err(e) => writeln!(out, "Save failed: {}", e)?,
        },
        ShellCommand::Quit => return Ok(Flow::Quit),
    }

    Ok(Flow::Continue)
}

fn no_active_section<W: Write>(out: &mut W) -> io::Result<Flow> {
    writeln!(out, "No active section; use 'open <id>' first.")?;
    Ok(Flow::Continue)
}

fn no_generator<W: Write>(out: &mut W) -> io::Result<Flow> {
    writeln!(out, "No generator configured; set [generator] in signalbook.toml.")?;
    Ok(Flow::Continue)
}

/// Print the chapter/section tree, marking the active section
pub fn write_outline<W: Write>(
    out: &mut W,
    toc: &[Chapter],
    active_id: Option<&str>,
) -> io::Result<()> {
    for chapter in toc {
        writeln!(out, "{} {}", chapter.chapter, chapter.title)?;
        for section in &chapter.sections {
            write_outline_section(out, section, 1, active_id)?;
        }
    }
    Ok(())
}

fn write_outline_section<W: Write>(
    out: &mut W,
    section: &Section,
    depth: usize,
    active_id: Option<&str>,
) -> io::Result<()> {
    let marker = if active_id == Some(section.id.as_str()) { "*" } else { " " };
    writeln!(
        out,
        "{}{}{} {} [{}]",
        marker,
        "  ".repeat(depth),
        section.id,
        section.title,
        section.content.len()
    )?;
    for child in section.children() {
        write_outline_section(out, child, depth + 1, active_id)?;
    }
    Ok(())
}

/// Print a section's blocks in order
pub fn write_section<W: Write>(
    out: &mut W,
    section: &Section,
    selected_block: Option<&str>,
) -> io::Result<()> {
    writeln!(out, "{} {}", section.id, section.title)?;
    writeln!(
        out,
        "Blocks: {}",
        section.content.iter().map(|b| b.id.as_str()).join(", ")
    )?;
    for (index, block) in section.content.iter().enumerate() {
        let marker = if selected_block == Some(block.id.as_str()) { " (selected)" } else { "" };
        writeln!(out, "\n[{}] {}{}", index + 1, block.id, marker)?;
        for line in block.html.lines() {
            writeln!(out, "    {}", line)?;
        }
    }
    Ok(())
}

/// Split a command line into words, honouring quotes and backslashes
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_word = true;
                }
                None => return Err("Trailing backslash.".to_string()),
            },
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err("Unterminated quote.".to_string());
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}
