//! signalbook - editor for the Signals and Systems interactive textbook
//!
//! The book is a tree of chapters and numbered sections whose content is a
//! list of HTML slides. This crate keeps that tree in memory, edits it,
//! saves it locally or through a small HTTP service and renders it as a
//! static viewer.

#![deny(unsafe_code)]
#![cfg_attr(all(not(debug_assertions), not(test)), deny(clippy::all))]
#![cfg_attr(all(not(debug_assertions), not(test)), warn(clippy::pedantic))]
#![cfg_attr(all(not(debug_assertions), not(test)), warn(missing_docs))]
// Allow some pedantic lints that are too strict for this project
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::enum_variant_names)]

// Document model
pub mod content_model;
pub mod default_content;
pub mod section_id;
pub mod tree;

// Editing
pub mod manager;
pub mod notify;
pub mod search;

// Persistence
pub mod autosave;
pub mod config;
pub mod editor;
pub mod remote;
pub mod server;
pub mod store;

// Output and front ends
pub mod generation;
pub mod render;
pub mod shell;
