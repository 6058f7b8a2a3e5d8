use clap::Parser;
use rty_cli::{run, EarlyReturn, Options};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = Options::parse();
    let code = match run(&options) {
        Ok(code) => code,
        Err(EarlyReturn(code)) => code,
    };
    std::process::exit(code);
}
