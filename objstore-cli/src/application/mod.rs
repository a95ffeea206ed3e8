pub mod handlers;

use clap::Parser;
use objstore_core::error::Result;

use crate::presentation::cli::{Cli, Commands};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = handlers::store_from_args(&cli.store, cli.memory)?;

    match cli.command {
        Commands::Write {
            input,
            prefix,
            compressor,
            splitter,
            async_writes,
        } => handlers::handle_write(store, input, prefix, compressor, splitter, async_writes),
        Commands::Read {
            id,
            out,
            offset,
            length,
        } => handlers::handle_read(store, id, out, offset, length),
        Commands::Verify { id } => handlers::handle_verify(store, id),
        Commands::IgnorePreview {
            root,
            dot_ignore_filenames,
            max_file_size,
            rules,
            cross_filesystem,
        } => handlers::handle_ignore_preview(
            root,
            dot_ignore_filenames,
            max_file_size,
            rules,
            cross_filesystem,
        ),
    }
}
