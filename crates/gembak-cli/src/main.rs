mod cli;
mod dispatch;

use clap::Parser;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch::dispatch(&cli.command) {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
