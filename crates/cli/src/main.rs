// FILE: crates/cli/src/main.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use folio_config::ConfigManager;
use folio_library::LibraryManager;

mod commands;

fn build_cli() -> Command {
    Command::new("folio")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Browse the filesystem as a live tree and keep an ebook library in step with it")
        .arg(
            Arg::new("config-dir")
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.toml and the library store")
                .global(true),
        )
        .subcommand(Command::new("roots").about("List the tree roots"))
        .subcommand(
            Command::new("add")
                .about("Add a library base path and index its ebooks")
                .arg(Arg::new("path").required(true).value_name("PATH").help("Directory to add")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove a library base path and every row below it")
                .arg(Arg::new("path").required(true).value_name("PATH").help("Base path to remove")),
        )
        .subcommand(
            Command::new("tree")
                .about("Print the tree below a path")
                .arg(Arg::new("path").required(true).value_name("PATH").help("Directory to show"))
                .arg(
                    Arg::new("depth")
                        .short('d')
                        .long("depth")
                        .value_name("N")
                        .help("Levels to expand")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                ),
        )
        .subcommand(Command::new("scan").about("Rescan all base paths, import new ebooks and drop missing ones"))
        .subcommand(
            Command::new("list")
                .about("List library rows")
                .arg(Arg::new("under").short('u').long("under").value_name("PATH").help("Only rows below PATH"))
                .arg(Arg::new("search").short('s').long("search").value_name("TEXT").help("Match title, author, tag or file name"))
                .arg(
                    Arg::new("long")
                        .short('l')
                        .long("long")
                        .help("Show row ids and dates")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("rename")
                .about("Rename a file or directory, keeping its library row")
                .arg(Arg::new("path").required(true).value_name("PATH").help("Entry to rename"))
                .arg(Arg::new("name").required(true).value_name("NEW_NAME").help("New file name")),
        )
        .subcommand(Command::new("sweep").about("Remove rows whose files no longer exist"))
}

fn config_manager(matches: &ArgMatches) -> Result<ConfigManager> {
    let manager = match matches.get_one::<String>("config-dir") {
        Some(dir) => ConfigManager::with_directory(PathBuf::from(dir)),
        None => ConfigManager::new(),
    };
    manager.context("Failed to locate the configuration directory")
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let config_manager = config_manager(&matches)?;

    let config = config_manager.load_or_default();
    let level = config.app.effective_log_level().to_string();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut manager =
        LibraryManager::open(config_manager).context("Failed to open the library")?;
    manager.install_default_roots();
    manager.restore_expansion().await;

    let result = match matches.subcommand() {
        Some(("roots", _)) => commands::list_roots(&manager),
        Some(("add", sub_matches)) => commands::add_base_path(&mut manager, sub_matches).await,
        Some(("remove", sub_matches)) => commands::remove_base_path(&mut manager, sub_matches),
        Some(("tree", sub_matches)) => commands::show_tree(&mut manager, sub_matches).await,
        Some(("scan", _)) => commands::scan(&mut manager).await,
        Some(("list", sub_matches)) => commands::list_rows(&manager, sub_matches),
        Some(("rename", sub_matches)) => commands::rename(&mut manager, sub_matches).await,
        Some(("sweep", _)) => commands::sweep(&mut manager).await,
        _ => {
            build_cli().print_help()?;
            Ok(())
        }
    };

    manager.shutdown().context("Failed to save settings")?;
    result
}
