use clap::Parser;

mod args;
pub mod exit_codes;
mod report;
mod verify;

use args::{Cli, Command};

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
    let cli = Cli::parse();
    let code = match cli.cmd {
        Command::Verify(args) => verify::cmd_verify(args).await,
        Command::Version => {
            println!("imgtrust {}", env!("CARGO_PKG_VERSION"));
            exit_codes::SUCCESS
        }
    };
    std::process::exit(code);
}
