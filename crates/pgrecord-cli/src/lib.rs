mod cli;
mod config;
mod migration_cmd;
mod model_cmd;

pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Migration(cmd) => migration_cmd::run(cmd).await,
        cli::Command::Model(cmd) => model_cmd::run(cmd),
    }
}
