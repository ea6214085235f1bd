use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod dropbox;
mod error;
mod finder;
mod mcp;
mod tools;
mod utils;

#[cfg(test)]
mod test_support;

use config::{ConfigOverrides, FinderConfig};
use finder::BundleMode;
use mcp::server::McpServer;
use tools::ToolContext;

/// Framed startup banner, every row padded to the widest line. Plain text;
/// the caller decides on color.
fn banner(lines: &[&str]) -> String {
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let rule = "─".repeat(width + 2);

    let mut out = format!("┌{}┐\n", rule);
    for line in lines {
        out.push_str(&format!("│ {:<width$} │\n", line, width = width));
    }
    out.push_str(&format!("└{}┘", rule));
    out
}

fn build_cli() -> Command {
    Command::new("dropbox-pdf-finder")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Find the PDFs in a Dropbox folder that contain a keyword")
        .long_about(
            "Lists the PDF files of a Dropbox folder, searches each one for a keyword \
            (case-insensitive) and links every match. Matches can be merged into one PDF \
            or packed into a ZIP archive.\n\n\
            Modes:\n\
            - serve: Model Context Protocol server on stdio (default)\n\
            - search: one search from the command line",
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .help("Dropbox access token [env: DROPBOX_ACCESS_TOKEN]")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("concurrency")
                .long("concurrency")
                .short('j')
                .value_name("N")
                .help("PDFs scanned at the same time [env: DROPBOX_FINDER_CONCURRENCY]")
                .value_parser(value_parser!(usize))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .value_name("DIR")
                .help("Where bundles are written [env: DROPBOX_FINDER_OUTPUT_DIR]")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Dropbox request timeout")
                .value_parser(value_parser!(u64))
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("fail-fast")
                .long("fail-fast")
                .help("Stop at the first file that cannot be listed, scanned or bundled")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only log errors and hide the banner (for MCP clients)")
                .global(true)
                .conflicts_with("verbose")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log debug output")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("serve").about("Run the MCP server on stdio (default)"))
        .subcommand(
            Command::new("search")
                .about("Search a folder once and print the matching links")
                .arg(
                    Arg::new("folder-url")
                        .long("folder-url")
                        .value_name("URL")
                        .help("Dropbox folder URL or folder path")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("keyword")
                        .long("keyword")
                        .short('k')
                        .value_name("TEXT")
                        .help("Text to look for, case-insensitive")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("bundle")
                        .long("bundle")
                        .value_name("MODE")
                        .help("Merge the matches into one PDF or pack them into a ZIP")
                        .value_parser(["merge", "zip"])
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the outcome as JSON instead of live lines")
                        .action(ArgAction::SetTrue),
                ),
        )
}

/// Logs go to stderr; stdout carries JSON-RPC in serve mode. RUST_LOG wins
/// over the flags.
fn init_tracing(matches: &ArgMatches) {
    let default_level = if matches.get_flag("quiet") {
        "error"
    } else if matches.get_flag("verbose") {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn overrides_from(matches: &ArgMatches) -> ConfigOverrides {
    ConfigOverrides {
        access_token: matches.get_one::<String>("token").cloned(),
        concurrency: matches.get_one::<usize>("concurrency").copied(),
        output_dir: matches.get_one::<PathBuf>("output-dir").cloned(),
        timeout_secs: matches.get_one::<u64>("timeout").copied(),
        fail_fast: matches.get_flag("fail-fast"),
    }
}

fn search_args(matches: &ArgMatches) -> cli::SearchArgs {
    let bundle = matches
        .get_one::<String>("bundle")
        .and_then(|mode| mode.parse::<BundleMode>().ok());

    cli::SearchArgs {
        folder_url: matches
            .get_one::<String>("folder-url")
            .cloned()
            .unwrap_or_default(),
        keyword: matches
            .get_one::<String>("keyword")
            .cloned()
            .unwrap_or_default(),
        bundle,
        json: matches.get_flag("json"),
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    init_tracing(&matches);

    let config = match FinderConfig::resolve(overrides_from(&matches)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(2);
        }
    };

    if let Some(("search", sub)) = matches.subcommand() {
        if let Err(e) = cli::run_search(&config, search_args(sub)).await {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
        return;
    }

    match &config.access_token {
        Some(_) => info!("Dropbox access token configured; tools may omit accessToken"),
        None => info!("No Dropbox access token configured; every call must pass accessToken"),
    }

    if !matches.get_flag("quiet") {
        let title = format!("Dropbox PDF Keyword Finder {}", env!("CARGO_PKG_VERSION"));
        let text = banner(&[
            title.as_str(),
            "MCP server on stdio",
            "tools: pdf-keyword-search, list-folder-pdfs",
        ]);
        eprintln!("\n\x1b[36m{}\x1b[0m\n", text);
    }

    info!("Starting MCP server...");

    let mut server = McpServer::new(ToolContext::new(config));
    if let Err(e) = server.start().await {
        error!("Server stopped: {}", e);
        process::exit(1);
    }
}
