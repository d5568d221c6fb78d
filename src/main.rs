//! intervalmon CLI entry point.

use intervalmon::cli::{self, Cli};
use intervalmon::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
