use objperf::cli::{self, Command};

fn main() -> anyhow::Result<()> {
    cli::execute(Command::PutUncached(argh::from_env()))
}
