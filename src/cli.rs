use clap::{Parser, Subcommand};
use folio::asset_store::FileType;
use folio::settings::Theme;
use std::path::PathBuf;

/// Store e-books locally and read them in the terminal
#[derive(Parser, Debug)]
#[command(name = "folio", version, about)]
pub struct Cli {
    /// Path to a folio.toml. Defaults to folio.toml inside the data directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the databases (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a book file under an id, replacing any previous file for that id
    Attach {
        book_id: String,
        file: PathBuf,
        /// Declared format. Guessed from the file extension when omitted.
        #[arg(short = 't', long = "type", value_enum)]
        file_type: Option<FileType>,
    },

    /// Remove a stored book and its reading positions
    Detach { book_id: String },

    /// List stored books
    List,

    /// Show how much space stored books take
    Usage,

    /// Move books out of the legacy store
    Migrate {
        /// Legacy store file. Defaults to legacy-assets.json in the data directory.
        #[arg(long)]
        legacy: Option<PathBuf>,
    },

    /// Print a book's outline
    Toc { book_id: String },

    /// Read a book interactively
    Read { book_id: String },

    /// Show or change reader settings
    Settings {
        #[arg(long, value_enum)]
        theme: Option<Theme>,

        /// Font size in percent (80 to 150, step 10)
        #[arg(long)]
        font_size: Option<u8>,

        #[arg(long)]
        font_family: Option<String>,
    },
}
