use anyhow::Result;
use execgrid::module::options::SharedOptions;
use execgrid::module::{client, directory};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    about = "Messaging and service location for distributed execution nodes.",
    version = env!("CARGO_PKG_VERSION")
)]
struct MainOptions {
    #[structopt(flatten)]
    shared_options: SharedOptions,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Hosts a directory node
    Directory(directory::Options),

    /// Talks to a directory node
    Client(client::Options),
}

#[tokio::main]
async fn main() -> Result<()> {
    let main_options = MainOptions::from_args();
    let shared_options = main_options.shared_options;

    pretty_env_logger::formatted_timed_builder()
        .parse_filters(&shared_options.log)
        .init();

    log::info!("execgrid {}", env!("CARGO_PKG_VERSION"));

    match main_options.cmd {
        Command::Directory(options) => directory::run(options).await?,
        Command::Client(options) => client::run(options).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use structopt::clap::ErrorKind;

    #[test]
    fn render_help_for_every_command() {
        for args in &[
            vec!["execgrid", "--help"],
            vec!["execgrid", "directory", "--help"],
            vec!["execgrid", "client", "--help"],
            vec!["execgrid", "client", "executors", "--help"],
        ] {
            let error = MainOptions::clap()
                .get_matches_from_safe(args.iter().copied())
                .unwrap_err();
            assert_eq!(error.kind, ErrorKind::HelpDisplayed);
        }
    }

    #[test]
    fn parse_global_log_option_next_to_subcommand_options() {
        let options = MainOptions::from_iter_safe(vec![
            "execgrid",
            "directory",
            "-l",
            "debug",
            "--listen",
            "127.0.0.1:0",
            "--node",
            "node-A=10.0.0.1:8000",
        ])
        .unwrap();

        assert_eq!(options.shared_options.log, "debug");
        match options.cmd {
            Command::Directory(directory) => {
                assert_eq!(directory.listen, "127.0.0.1:0");
                assert_eq!(directory.nodes, vec!["node-A=10.0.0.1:8000".to_string()]);
            }
            Command::Client(_) => panic!("parsed the wrong subcommand"),
        }
    }
}
