mod application;
mod presentation;

use objstore_core::error::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    application::run()
}
