use clap::CommandFactory;
use clap_complete::{Shell, generate_to};
use std::env;
use std::fs::File;
use std::io::Error;
use std::path::Path;

// Brings the CLI definition, and its clap imports, into scope.
include!("src/cli.rs");

fn main() -> Result<(), Error> {
    let outdir = match env::var_os("OUT_DIR") {
        None => return Ok(()),
        Some(outdir) => outdir,
    };

    let mut app = Cli::command();
    for shell in Shell::value_variants() {
        generate_to(*shell, &mut app, "cwlite-client", &outdir)?;
    }

    let stamp_path = Path::new(&outdir).join("client-stamp");
    if let Err(err) = File::create(&stamp_path) {
        panic!("failed to write {}: {}", stamp_path.display(), err);
    }

    Ok(())
}
