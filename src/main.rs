use std::process::ExitCode;

use clap::Parser;
use log::error;

use mvannot::Opts;
use mvannot::cli::SubCommandExtend;
use mvannot::error::exit_code;
use mvannot::metrics;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let result = opts.subcmd.run(&opts).await;

    if let Some(path) = &opts.metrics_file {
        if let Err(e) = metrics::write_textfile(path) {
            error!("failed to write metrics: {:#}", e);
        }
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}
