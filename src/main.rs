// src/main.rs

use bundler::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("bundler error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every task succeeded.
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let report = run(args).await?;
    Ok(report.is_success())
}
