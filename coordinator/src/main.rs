#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]

mod logging;
mod shutdown;

use anyhow::{Context as _, Result as AnyResult};
use dotenv::dotenv;
use structopt::StructOpt;
use tokio::{runtime, spawn, sync::oneshot};
use tracing::info;

use self::logging::LogOptions;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    env!("COMMIT_SHA"),
    " ",
    env!("COMMIT_DATE"),
    "\n",
    env!("TARGET"),
    " ",
    env!("BUILD_DATE"),
    "\n",
    env!("CARGO_PKG_AUTHORS"),
    "\n",
    env!("CARGO_PKG_DESCRIPTION"),
);

#[derive(StructOpt)]
struct Options {
    #[structopt(flatten)]
    log: LogOptions,

    #[structopt(flatten)]
    app: lib::Options,
}

fn main() -> AnyResult<()> {
    dotenv().ok();
    // Parse CLI and handle help and version (which will stop the application).
    let matches = Options::clap().long_version(VERSION).get_matches();
    let options = Options::from_clap(&matches);

    // Start log system
    options.log.init()?;

    // Launch Tokio runtime
    runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Error creating Tokio runtime")?
        .block_on(async {
            let (send, shutdown) = oneshot::channel();
            spawn(async {
                shutdown::signal_shutdown().await.unwrap();
                let _result = send.send(());
            });

            lib::main(options.app, shutdown).await
        })?;

    // Terminate successfully
    info!("program terminating normally");
    Ok(())
}
