use objperf::cli::{self, Command};

fn main() -> anyhow::Result<()> {
    cli::execute(Command::GetUncached(argh::from_env()))
}
