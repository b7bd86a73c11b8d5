//! `gen-id`: interactive Ed25519 keypair generation, writing an identity
//! file for later use by the `trustee`/`client`/`relay` subcommands.

use std::io::{self, Write};
use std::path::Path;

use tracing::info;

use crate::config::IdentityFile;
use crate::Result;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:6879";

/// Prompt for a bind address (defaulting to [`DEFAULT_BIND_ADDRESS`]),
/// generate a fresh keypair, and save it to `path`.
pub fn run(path: &Path) -> Result<()> {
    print!("Bind address [{DEFAULT_BIND_ADDRESS}]: ");
    io::stdout().flush().ok();

    let mut input = String::new();
    io::stdin().read_line(&mut input).ok();
    let address = input.trim();
    let address = if address.is_empty() {
        DEFAULT_BIND_ADDRESS.to_string()
    } else {
        address.to_string()
    };

    let identity = IdentityFile::generate(address);
    identity.save(path)?;
    info!(path = %path.display(), "generated identity");
    println!("Wrote identity to {}", path.display());
    Ok(())
}
