use objperf::cli::{self, Command};

fn main() -> anyhow::Result<()> {
    cli::execute(Command::PutCached(argh::from_env()))
}
