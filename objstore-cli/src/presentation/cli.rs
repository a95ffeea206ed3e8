use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "content-addressed object store CLI", long_about = None)]
pub struct Cli {
    /// Directory backing the filesystem content store.
    #[arg(long, global = true, default_value = "objstore-data")]
    pub store: PathBuf,

    /// Use an ephemeral in-memory store instead of `--store`.
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a byte stream (from a file, or stdin if omitted) and print its object id.
    Write {
        input: Option<PathBuf>,

        /// Bucket letter (`g`..`z`) content addresses are stored under;
        /// omit for a bare digest with no bucket letter.
        #[arg(long)]
        prefix: Option<char>,

        /// Name of a registered compressor (e.g. "zstd"); omit to store uncompressed.
        #[arg(long)]
        compressor: Option<String>,

        /// Name of a registered splitter.
        #[arg(long, default_value_t = objstore_core::splitter::DEFAULT_SPLITTER_NAME.to_string())]
        splitter: String,

        /// Maximum in-flight async chunk writes; 0 writes every chunk synchronously.
        #[arg(long, default_value_t = 0)]
        async_writes: usize,
    },

    /// Read an object's bytes (to a file, or stdout if omitted) by its rendered id.
    Read {
        id: String,

        out: Option<PathBuf>,

        /// Byte offset to seek to before reading.
        #[arg(long)]
        offset: Option<i64>,

        /// Maximum number of bytes to read; omit to read to the end.
        #[arg(long)]
        length: Option<u64>,
    },

    /// Check that every blob an object id transitively references is reachable.
    Verify { id: String },

    /// Preview which paths under a directory an ignore rule set would exclude.
    IgnorePreview {
        root: PathBuf,

        /// Dot-ignore filename to look for in every directory (repeatable).
        #[arg(long = "dot-ignore-filename")]
        dot_ignore_filenames: Vec<String>,

        /// Exclude files larger than this many bytes.
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Extra ignore rule, same syntax as a dot-ignore-file line (repeatable).
        #[arg(long = "rule")]
        rules: Vec<String>,

        /// Allow the walk to cross filesystem/mount boundaries.
        #[arg(long)]
        cross_filesystem: Option<bool>,
    },
}
