use objperf::cli::{self, Command};

fn main() -> anyhow::Result<()> {
    cli::execute(Command::GetCached(argh::from_env()))
}
