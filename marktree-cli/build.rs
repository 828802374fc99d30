use clap::{Arg, ArgAction, Command, ValueHint};
use clap_complete::{generate_to, shells::*};
use std::env;
use std::io::Error;

// Mirror of the command tree in src/main.rs; build scripts can't reach into src/
const INSPECT_VIEWS: &[&str] = &["ast", "digest", "blocks", "outline"];

fn path_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .help(help)
        .required(true)
        .index(1)
        .value_hint(ValueHint::FilePath)
}

fn main() -> Result<(), Error> {
    let outdir = match env::var_os("OUT_DIR") {
        None => return Ok(()),
        Some(outdir) => outdir,
    };

    let mut cmd = Command::new("marktree")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect, convert and serve markdown documents as structured trees")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_hint(ValueHint::FilePath)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(
            Command::new("convert")
                .arg(path_arg("input", "Document to convert"))
                .arg(Arg::new("from").long("from").value_hint(ValueHint::Other))
                .arg(
                    Arg::new("to")
                        .long("to")
                        .required(true)
                        .value_parser(clap::builder::PossibleValuesParser::new([
                            "markdown", "json", "treeviz",
                        ])),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .arg(path_arg("path", "Path to the markdown file"))
                .arg(
                    Arg::new("view")
                        .index(2)
                        .value_parser(clap::builder::PossibleValuesParser::new(INSPECT_VIEWS)),
                ),
        )
        .subcommand(Command::new("detect").arg(path_arg("path", "Path to the markdown file")))
        .subcommand(
            Command::new("serve")
                .arg(path_arg("path", "Markdown file to open"))
                .arg(
                    Arg::new("write-back")
                        .long("write-back")
                        .action(ArgAction::SetTrue),
                ),
        );

    generate_to(Bash, &mut cmd, "marktree", &outdir)?;
    generate_to(Zsh, &mut cmd, "marktree", &outdir)?;
    generate_to(Fish, &mut cmd, "marktree", &outdir)?;

    println!("cargo:warning=Shell completions generated in {outdir:?}");

    Ok(())
}
