use anyhow::Result;
use client::runner;

fn main() -> Result<()> {
    runner::run_cli()
}
