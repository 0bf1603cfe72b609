//! Local book storage and reading: stored EPUB and PDF files, reading
//! positions and settings, and a reader session that pages through them.

pub mod asset_store;
pub mod config;
pub mod epub_reader;
pub mod error;
pub mod gesture;
pub mod layout;
pub mod legacy;
pub mod location;
pub mod pdf_reader;
pub mod position;
pub mod progress;
pub mod reader;
pub mod session;
pub mod settings;
pub mod surface;
pub mod text;

#[cfg(test)]
mod test_support;
