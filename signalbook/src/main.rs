//! signalbook - editor for the Signals and Systems interactive textbook
//!
//! One-shot subcommands load the document, apply a single change and save
//! it right away. `edit` opens an interactive shell that saves in the
//! background, and `serve` runs the persistence endpoints.

#![deny(unsafe_code)]
#![cfg_attr(all(not(debug_assertions), not(test)), deny(clippy::all))]
#![cfg_attr(all(not(debug_assertions), not(test)), warn(clippy::pedantic))]
#![cfg_attr(all(not(debug_assertions), not(test)), warn(missing_docs))]
// Allow some pedantic lints that are too strict for this project
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, HtmlInput};
use signalbook::config::EditorConfig;
use signalbook::editor::Editor;
use signalbook::generation::{generate_slide, illustrate_block, ContentGenerator, HttpGenerator};
use signalbook::notify::{ConsoleNotifier, LogNotifier, Notifier};
use signalbook::remote::HttpStore;
use signalbook::render;
use signalbook::search::filter_toc;
use signalbook::server::start_server;
use signalbook::shell::{run_shell, write_outline, write_section};
use signalbook::store::{ContentStore, FileStore, LoadOrigin};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main entry point for the signalbook CLI application
fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

/// Run the CLI application
fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = EditorConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;

    match cli.command {
        Commands::Serve { bind, backup } => handle_serve_command(&config, bind, backup),
        Commands::Edit => handle_edit_command(&config, cli.remote.as_deref()),
        command => handle_one_shot_command(&config, cli.remote.as_deref(), command),
    }
}

/// Initialise logging: `warn` by default, `info` with `--verbose`, or `RUST_LOG`
fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Info);
    }
    builder.init();
}

/// Pick the remote service when one is configured, else the backup file
fn open_store(config: &EditorConfig, remote: Option<&str>) -> Arc<dyn ContentStore> {
    match remote.or(config.remote.base_url.as_deref()) {
        Some(url) => {
            log::info!("Using remote store at {}", url);
            Arc::new(HttpStore::new(url))
        }
        None => Arc::new(FileStore::new(&config.backup_path)),
    }
}

fn generator(config: &EditorConfig) -> HttpGenerator {
    HttpGenerator::new(
        config.generator.content_url.clone(),
        config.generator.image_url.clone(),
    )
}

/// Handle the serve command
fn handle_serve_command(
    config: &EditorConfig,
    bind: Option<String>,
    backup: Option<PathBuf>,
) -> Result<()> {
    let mut server_config = config.server_config();
    if let Some(bind) = bind {
        server_config.bind = bind;
    }
    if let Some(backup) = backup {
        server_config.backup_path = backup;
    }

    let server = start_server(&server_config).context("Failed to start server")?;
    println!(
        "Serving {} on {} (Ctrl-C to stop)",
        server_config.backup_path.display(),
        server.base_url()
    );
    server.wait();
    Ok(())
}

/// Handle the edit command
fn handle_edit_command(config: &EditorConfig, remote: Option<&str>) -> Result<()> {
    let store = open_store(config, remote);
    let mut editor = Editor::open(
        store,
        Arc::new(ConsoleNotifier),
        Some(config.autosave_timing()),
    )
    .context("Failed to start autosave")?;
    report_origin(editor.origin());

    let generator = generator(config);
    let configured = config.generator.content_url.is_some() || config.generator.image_url.is_some();
    let generator = configured.then_some(&generator as &dyn ContentGenerator);

    let stdin = io::stdin();
    run_shell(&mut editor, generator, stdin.lock(), io::stdout()).context("Shell I/O error")?;

    if editor.close().context("Failed to save changes")? {
        println!("✓ Changes saved");
    }
    Ok(())
}

/// Handle every command that applies one change and exits
fn handle_one_shot_command(
    config: &EditorConfig,
    remote: Option<&str>,
    command: Commands,
) -> Result<()> {
    let store = open_store(config, remote);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let mut editor = Editor::open(store, notifier, None).context("Failed to open document")?;
    report_origin(editor.origin());

    match command {
        Commands::Outline { search } => {
            let toc = filter_toc(editor.manager().toc(), search.as_deref().unwrap_or(""));
            write_outline(&mut io::stdout().lock(), &toc, None)?;
        }

        Commands::Show { section_id } => {
            let section = editor
                .manager()
                .section(&section_id)
                .with_context(|| format!("No section '{}'", section_id))?;
            write_section(&mut io::stdout().lock(), section, None)?;
        }

        Commands::AddBlock { section_id, input } => {
            let html = read_html(&input)?;
            let block = editor
                .mutate(|m| m.add_block(&section_id, &html))
                .with_context(|| format!("No section '{}'", section_id))?;
            println!("✓ Added block {} to section {}", block.id, section_id);
        }

        Commands::EditBlock {
            section_id,
            block_id,
            input,
        } => {
            let html = read_html(&input)?;
            if !editor.mutate(|m| m.edit_block(&section_id, &block_id, &html)) {
                println!("Block {} in section {} was not changed", block_id, section_id);
            }
        }

        Commands::DeleteBlock {
            section_id,
            block_id,
        } => {
            if !editor.mutate(|m| m.delete_block(&section_id, &block_id)) {
                bail!("No block '{}' in section '{}'", block_id, section_id);
            }
            println!("✓ Deleted block {}", block_id);
        }

        Commands::MoveBlock {
            section_id,
            block_id,
            direction,
        } => {
            if editor.mutate(|m| m.move_block(&section_id, &block_id, direction)) {
                println!("✓ Moved block {} {}", block_id, direction);
            } else {
                println!("Block {} stays where it is", block_id);
            }
        }

        Commands::AddSection { parent_id, title } => {
            let section = editor
                .mutate(|m| m.add_section(&parent_id, &title))
                .with_context(|| format!("No chapter or section '{}'", parent_id))?;
            println!("✓ Added section {} {}", section.id, section.title);
        }

        Commands::RenameChapter { chapter_id, title } => {
            if !editor.mutate(|m| m.rename_chapter(&chapter_id, &title)) {
                bail!("No chapter '{}'", chapter_id);
            }
            println!("✓ Renamed chapter {}", chapter_id);
        }

        Commands::RenameSection { section_id, title } => {
            if !editor.mutate(|m| m.rename_section(&section_id, &title)) {
                bail!("No section '{}'", section_id);
            }
            println!("✓ Renamed section {}", section_id);
        }

        Commands::Generate { section_id, topic } => {
            let generator = generator(config);
            let block = editor
                .mutate(|m| generate_slide(m, &generator, &section_id, &topic))
                .context("Slide generation failed")?
                .with_context(|| format!("No section '{}'", section_id))?;
            println!("✓ Generated block {} in section {}", block.id, section_id);
        }

        Commands::Illustrate {
            section_id,
            block_id,
            topic,
        } => {
            let generator = generator(config);
            let illustrated = editor
                .mutate(|m| illustrate_block(m, &generator, &section_id, &block_id, &topic))
                .context("Image generation failed")?;
            if !illustrated {
                bail!("No block '{}' in section '{}'", block_id, section_id);
            }
            println!("✓ Added an image to block {}", block_id);
        }

        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            editor
                .mutate(|m| m.import_json(&text))
                .with_context(|| format!("{} is not a valid content document", file.display()))?;
            println!("✓ Imported {}", file.display());
        }

        Commands::Export { file } => {
            let json = editor.manager().export_json()?;
            write_file(&file, &json)?;
            println!("✓ Exported to {}", file.display());
        }

        Commands::Render { output, title } => {
            render::write_html(editor.manager().toc(), &title, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("✓ Wrote {}", output.display());
        }

        Commands::Serve { .. } | Commands::Edit => {
            bail!("serve and edit are not one-shot commands")
        }
    }

    editor.close().context("Failed to save changes")?;
    Ok(())
}

fn report_origin(origin: &LoadOrigin) {
    match origin {
        LoadOrigin::Restored => log::info!("Loaded saved content"),
        LoadOrigin::NoBackup => log::info!("No saved content yet, starting from the default book"),
        LoadOrigin::Fallback(reason) => {
            eprintln!("Warning: could not load saved content ({}), using the default book", reason);
        }
    }
}

fn read_html(input: &HtmlInput) -> Result<String> {
    match (&input.html, &input.file) {
        (Some(html), _) => Ok(html.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => bail!("Either --html or --file is required"),
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
