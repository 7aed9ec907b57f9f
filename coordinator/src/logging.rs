use anyhow::{Context as _, Result as AnyResult};
use structopt::StructOpt;
use tracing_subscriber::filter::EnvFilter;

#[derive(Clone, Debug, PartialEq, StructOpt)]
pub struct LogOptions {
    /// Increase log verbosity (-v = debug, -vv = trace).
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    /// Additional log filter directives, e.g. "lib::engine=trace".
    #[structopt(long, env = "LOG_FILTER", default_value = "")]
    log_filter: String,
}

impl LogOptions {
    pub fn init(&self) -> AnyResult<()> {
        let default_level = match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut filter = EnvFilter::new(default_level);
        if !self.log_filter.is_empty() {
            for directive in self.log_filter.split(',') {
                filter = filter.add_directive(directive.parse().with_context(|| {
                    format!("invalid log filter directive {:?}", directive)
                })?);
            }
        }
        tracing_subscriber::fmt().with_env_filter(filter).init();
        Ok(())
    }
}
