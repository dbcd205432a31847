//! Command-line interface definitions for signalbook

use clap::{Args, Parser, Subcommand};
use signalbook::config::CONFIG_FILE_NAME;
use signalbook::manager::MoveDirection;
use std::path::PathBuf;

/// CLI structure for the signalbook application
#[derive(Parser)]
#[command(name = "signalbook")]
#[command(version)]
#[command(about = "Editor for the Signals and Systems interactive textbook", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, value_name = "PATH", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Base URL of a persistence service to use instead of the backup file
    #[arg(long, global = true, value_name = "URL")]
    pub remote: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// HTML given inline or read from a file
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct HtmlInput {
    /// HTML text
    #[arg(long)]
    pub html: Option<String>,

    /// File containing the HTML
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
}

/// Available subcommands for signalbook
#[derive(Subcommand)]
pub enum Commands {
    /// Serve the load/save endpoints for the backup file
    Serve {
        /// Listen address (defaults to [server].bind)
        #[arg(long)]
        bind: Option<String>,

        /// Backup file (defaults to backup_path)
        #[arg(long, value_name = "PATH")]
        backup: Option<PathBuf>,
    },

    /// Print the table of contents
    Outline {
        /// Only show chapters and sections matching this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Print the blocks of a section
    Show {
        /// Section id (e.g., 1.2.1)
        section_id: String,
    },

    /// Append an HTML block to a section
    AddBlock {
        /// Section id
        section_id: String,

        #[command(flatten)]
        input: HtmlInput,
    },

    /// Replace the HTML of a block
    EditBlock {
        /// Section id
        section_id: String,

        /// Block id
        block_id: String,

        #[command(flatten)]
        input: HtmlInput,
    },

    /// Delete a block
    DeleteBlock {
        /// Section id
        section_id: String,

        /// Block id
        block_id: String,
    },

    /// Move a block up or down within its section
    MoveBlock {
        /// Section id
        section_id: String,

        /// Block id
        block_id: String,

        /// up or down
        direction: MoveDirection,
    },

    /// Add a section under a chapter or another section
    AddSection {
        /// Chapter identifier or section id
        parent_id: String,

        /// Title of the new section
        title: String,
    },

    /// Change a chapter's title
    RenameChapter {
        /// Chapter identifier
        chapter_id: String,

        /// New title
        title: String,
    },

    /// Change a section's title
    RenameSection {
        /// Section id
        section_id: String,

        /// New title
        title: String,
    },

    /// Generate a slide with AI and append it to a section
    Generate {
        /// Section id
        section_id: String,

        /// What the slide should explain
        topic: String,
    },

    /// Generate an illustration with AI and add it to a block
    Illustrate {
        /// Section id
        section_id: String,

        /// Block id
        block_id: String,

        /// What the image should show
        topic: String,
    },

    /// Replace the whole document with a JSON file
    Import {
        /// JSON file in the backup format
        file: PathBuf,
    },

    /// Write the whole document to a JSON file
    Export {
        /// Output path
        file: PathBuf,
    },

    /// Write a static HTML viewer of the document
    Render {
        /// Output path
        #[arg(default_value = "signalbook.html")]
        output: PathBuf,

        /// Page title
        #[arg(short, long, default_value = "Señales y Sistemas")]
        title: String,
    },

    /// Open the interactive editing shell with autosave
    Edit,
}
