// Command-line interface for marktree
//
// Usage:
//  marktree <input> --to <format> [--from <format>] [--output <file>]  - Convert between formats (default)
//  marktree convert <input> --to <format> [--from <format>] [--output <file>]  - Same as above (explicit)
//  marktree inspect <input> [ast|digest|blocks|outline]                - Query engine views as JSON
//  marktree detect <input>                                              - Line ending and hard-break style
//  marktree serve <input> [--write-back]                                - JSON-lines protocol on stdin/stdout
//
// Logging goes to stderr so stdout stays parseable. RUST_LOG wins over --verbose.

use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use marktree::formats::markdown::{detect_style, BreakStyle, SerializeOptions};
use marktree::query::{self, AstArgs, ListBlocksArgs};
use marktree::{DocumentSession, Dispatcher, FormatRegistry, Limits, SessionSettings};
use marktree_config::{Loader, MarktreeConfig, PROJECT_FILE};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const INSPECT_VIEWS: &[&str] = &["ast", "digest", "blocks", "outline"];

const SUBCOMMANDS: &[&str] = &["convert", "inspect", "detect", "serve", "help"];

fn build_cli() -> Command {
    Command::new("marktree")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect, convert and serve markdown documents as structured trees")
        .long_about(
            "marktree parses markdown into a document tree, and exposes that tree to tools.\n\n\
            Commands:\n  \
            - convert: Transform between markdown and the JSON document tree\n  \
            - inspect: View the document through the query engine\n  \
            - detect:  Report the line-ending and hard-break conventions of a file\n  \
            - serve:   Answer protocol requests on stdin/stdout\n\n\
            Examples:\n  \
            marktree notes.md --to json              # Document tree as JSON\n  \
            marktree inspect notes.md outline        # Heading outline\n  \
            marktree serve notes.md --write-back     # Edit session, saved on exit",
        )
        .arg_required_else_help(true)
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to a marktree.toml configuration file")
                .value_hint(ValueHint::FilePath)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log more to stderr (repeat for trace output)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert a document between markdown and the tree formats (default command)")
                .arg(
                    Arg::new("input")
                        .help("Document to convert")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .help("Source format (detected from the file extension when omitted)")
                        .value_hint(ValueHint::Other),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .help("Target format (markdown, json, treeviz)")
                        .required(true)
                        .value_hint(ValueHint::Other),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Write the result here instead of stdout")
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Show query engine views of a markdown file as JSON")
                .arg(
                    Arg::new("path")
                        .help("Path to the markdown file")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("view")
                        .help("View to print. Defaults to 'ast'")
                        .required(false)
                        .value_parser(clap::builder::PossibleValuesParser::new(INSPECT_VIEWS))
                        .index(2),
                ),
        )
        .subcommand(
            Command::new("detect")
                .about("Report line ending and hard-break style")
                .arg(
                    Arg::new("path")
                        .help("Path to the markdown file")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve the query and mutation protocol as JSON lines on stdin/stdout")
                .arg(
                    Arg::new("path")
                        .help("Markdown file to open")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("write-back")
                        .long("write-back")
                        .help("Save the document to the input file when stdin closes")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let cli = build_cli();
    let matches = match cli.clone().try_get_matches_from(&args) {
        Ok(m) => m,
        Err(e) => {
            // `marktree notes.md --to json` means convert
            if args.len() > 1 && !args[1].starts_with('-') && !SUBCOMMANDS.contains(&args[1].as_str()) {
                let mut new_args = vec![args[0].clone(), "convert".to_string()];
                new_args.extend_from_slice(&args[1..]);
                match cli.try_get_matches_from(&new_args) {
                    Ok(m) => m,
                    Err(e2) => e2.exit(),
                }
            } else {
                e.exit();
            }
        }
    };

    init_logging(matches.get_count("verbose"));

    let config = load_cli_config(matches.get_one::<String>("config").map(String::as_str));

    match matches.subcommand() {
        Some(("convert", sub)) => {
            let input = required(sub, "input");
            let to = required(sub, "to");
            let registry = FormatRegistry::with_markdown_options((&config.markdown).into());
            let from = match sub.get_one::<String>("from") {
                Some(f) => f.clone(),
                None => registry.detect_format_from_filename(input).unwrap_or_else(|| {
                    fail(&format!(
                        "Could not detect format from filename '{input}'. Please specify --from explicitly"
                    ))
                }),
            };
            let output = sub.get_one::<String>("output").map(String::as_str);
            handle_convert_command(&registry, &config, input, &from, to, output);
        }
        Some(("inspect", sub)) => {
            let view = sub.get_one::<String>("view").map_or("ast", String::as_str);
            handle_inspect_command(required(sub, "path"), view, &config);
        }
        Some(("detect", sub)) => handle_detect_command(required(sub, "path")),
        Some(("serve", sub)) => {
            handle_serve_command(required(sub, "path"), sub.get_flag("write-back"), &config)
        }
        _ => fail("Unknown subcommand. Use --help for usage information."),
    }
}

fn init_logging(verbosity: u8) {
    let fallback = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with_writer(io::stderr)
        .init();
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches.get_one::<String>(name).map_or("", String::as_str)
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn read_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| fail(&format!("reading file '{path}': {e}")))
}

fn load_cli_config(explicit_path: Option<&str>) -> MarktreeConfig {
    let loader = Loader::new().with_optional_file(PROJECT_FILE);
    let loader = match explicit_path {
        Some(path) => loader.with_file(path),
        None => loader,
    };
    loader
        .build()
        .unwrap_or_else(|err| fail(&format!("failed to load configuration: {err}")))
}

/// Serializer overrides that keep a markdown source's own conventions, subject to the save policies.
fn markdown_params(config: &MarktreeConfig, source: &str) -> HashMap<String, String> {
    let options = marktree::MarkdownOptions::from(&config.markdown);
    let SerializeOptions { hard_break, crlf, .. } = options.serialize_options(&detect_style(source));
    let mut params = HashMap::new();
    let style = match hard_break {
        BreakStyle::Backslash => "backslash",
        BreakStyle::TwoSpaces => "two-spaces",
    };
    params.insert("hard-break-style".to_string(), style.to_string());
    params.insert("line-ending".to_string(), if crlf { "crlf" } else { "lf" }.to_string());
    params
}

fn handle_convert_command(
    registry: &FormatRegistry,
    config: &MarktreeConfig,
    input: &str,
    from: &str,
    to: &str,
    output: Option<&str>,
) {
    for name in [from, to] {
        if let Err(e) = registry.get(name) {
            fail(&e.to_string());
        }
    }

    let source = read_source(input);
    let doc = registry
        .parse(&source, from)
        .unwrap_or_else(|e| fail(&format!("parse error: {e}")));
    debug!(input, from, to, "parsed input");

    let params = if to == "markdown" && from == "markdown" {
        markdown_params(config, &source)
    } else {
        HashMap::new()
    };
    let text = registry
        .serialize_with_options(&doc, to, &params)
        .unwrap_or_else(|e| fail(&format!("serialization error: {e}")));

    match output {
        Some(path) => {
            fs::write(path, text).unwrap_or_else(|e| fail(&format!("writing file '{path}': {e}")));
            info!(path, "wrote output");
        }
        None => print!("{text}"),
    }
}

fn load_session(path: &str, config: &MarktreeConfig) -> DocumentSession {
    let source = read_source(path);
    DocumentSession::load(&source, SessionSettings::from(config))
        .unwrap_or_else(|e| fail(&format!("parse error: {e}")))
}

/// The JSON printed by `inspect` for one view.
fn inspect_view(session: &DocumentSession, view: &str) -> Result<Value, String> {
    let doc = session.doc();
    let value = match view {
        "ast" => serde_json::to_value(query::get_ast(doc, &AstArgs::default(), usize::MAX).map_err(|e| e.to_string())?),
        "blocks" => serde_json::to_value(
            query::list_blocks(doc, &ListBlocksArgs::default(), usize::MAX).map_err(|e| e.to_string())?,
        ),
        "digest" => serde_json::to_value(query::get_digest(doc)),
        "outline" => serde_json::to_value(query::get_digest(doc).outline),
        other => return Err(format!("unknown view '{other}'")),
    };
    value.map_err(|e| e.to_string())
}

fn handle_inspect_command(path: &str, view: &str, config: &MarktreeConfig) {
    let session = load_session(path, config);
    let value = inspect_view(&session, view).unwrap_or_else(|e| fail(&e));
    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(&e.to_string()),
    }
}

fn handle_detect_command(path: &str) {
    let style = detect_style(&read_source(path));
    match serde_json::to_string_pretty(&style) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(&e.to_string()),
    }
}

fn handle_serve_command(path: &str, write_back: bool, config: &MarktreeConfig) {
    let session = load_session(path, config);
    let mut dispatcher = Dispatcher::new(session, Limits::from(&config.protocol));
    info!(path, revision = %dispatcher.session().revision(), "serving");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin closed with an error");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = dispatcher.handle_line(&line) {
            if writeln!(stdout, "{response}").and_then(|()| stdout.flush()).is_err() {
                warn!("stdout closed; stopping");
                break;
            }
        }
    }

    if write_back {
        let session = dispatcher.into_session();
        let text = session
            .content()
            .unwrap_or_else(|e| fail(&format!("serialization error: {e}")));
        fs::write(path, text).unwrap_or_else(|e| fail(&format!("writing file '{path}': {e}")));
        info!(path, revision = %session.revision(), "saved document");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> MarktreeConfig {
        marktree_config::load_defaults().expect("defaults to load")
    }

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn markdown_params_keep_source_conventions() {
        let params = markdown_params(&defaults(), "a  \r\nb\r\n");
        assert_eq!(params.get("hard-break-style").map(String::as_str), Some("two-spaces"));
        assert_eq!(params.get("line-ending").map(String::as_str), Some("crlf"));
    }

    #[test]
    fn markdown_params_follow_forced_policies() {
        let config = Loader::new()
            .set_override("markdown.line_ending_on_save", "lf")
            .expect("override to apply")
            .build()
            .expect("config to build");
        let params = markdown_params(&config, "a\r\n");
        assert_eq!(params.get("line-ending").map(String::as_str), Some("lf"));
    }

    #[test]
    fn outline_view_nests_headings() {
        let session =
            DocumentSession::load("# A\n\n## B\n", SessionSettings::default()).expect("load");
        let outline = inspect_view(&session, "outline").expect("view");
        assert_eq!(outline[0]["text"], "A");
        assert_eq!(outline[0]["children"][0]["text"], "B");
    }

    #[test]
    fn unknown_views_are_errors() {
        let session = DocumentSession::load("x\n", SessionSettings::default()).expect("load");
        assert!(inspect_view(&session, "tokens").is_err());
    }
}
