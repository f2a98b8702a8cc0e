//! Background composer command line tool

#[cfg(feature = "cli")]
use bg_composer::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("bg-composer was built without the `cli` feature; rebuild with --features cli");
    std::process::exit(2);
}
