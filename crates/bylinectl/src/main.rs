use clap::Parser;

fn main() {
    let cli = bylinectl::Cli::parse();
    ops::init_logging(&cli.log_args);
    std::process::exit(bylinectl::run(cli));
}
