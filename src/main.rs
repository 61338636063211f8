use clap::Parser;
use tracing_subscriber::EnvFilter;

use nbase::cli::Args;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let output = args.run()?;
    println!("{}", output);
    Ok(())
}
