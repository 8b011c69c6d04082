mod logger;

use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, bail, Context as _};
use lexopt::prelude::*;

use arbor::Store;
use arbor_pull::Options;

const USAGE: &str = r#"usage:
  arbor init [--repo <path>]
  arbor pull [--repo <path>] [-v | --verbose] [--related] <remote> [<branch>...]

options:
  --repo <path>    repository to operate on (default: current directory)
  --related        also download commits listed as related
  -v, --verbose    show progress and debug output
"#;

struct CommonArgs {
    repo: PathBuf,
    verbose: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut parser = lexopt::Parser::from_env();
    let mut common = CommonArgs {
        repo: PathBuf::from("."),
        verbose: false,
    };
    let mut related = false;
    let mut command: Option<String> = None;
    let mut positional: Vec<String> = Vec::new();

    while let Some(arg) = parser.next()? {
        match arg {
            Long("repo") => common.repo = PathBuf::from(parser.value()?),
            Long("related") => related = true,
            Short('v') | Long("verbose") => common.verbose = true,
            Short('h') | Long("help") => {
                print!("{USAGE}");
                return Ok(());
            }
            Value(value) => {
                let value = value
                    .into_string()
                    .map_err(|v| anyhow!("invalid argument {v:?}"))?;
                if command.is_none() {
                    command = Some(value);
                } else {
                    positional.push(value);
                }
            }
            _ => bail!("unexpected argument; try `arbor --help`"),
        }
    }

    let level = if common.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    logger::init(level).context("failed to install logger")?;

    match command.as_deref() {
        Some("init") => init(&common),
        Some("pull") => pull(&common, related, &positional),
        Some(other) => bail!("unknown command {other:?}; try `arbor --help`"),
        None => bail!("no command given; try `arbor --help`"),
    }
}

fn init(common: &CommonArgs) -> anyhow::Result<()> {
    Store::init(&common.repo)
        .with_context(|| format!("failed to initialize repository at {:?}", common.repo))?;
    println!("initialized empty repository at {}", common.repo.display());

    Ok(())
}

fn pull(common: &CommonArgs, related: bool, args: &[String]) -> anyhow::Result<()> {
    let (remote, branches) = args
        .split_first()
        .ok_or_else(|| anyhow!("pull: a remote must be specified"))?;

    let store = Store::open(&common.repo)
        .with_context(|| format!("failed to open repository at {:?}", common.repo))?;
    let opts = Options {
        follow_related: related,
        verbose: common.verbose,
    };
    let stats = arbor_pull::pull(&store, remote, branches, opts)
        .with_context(|| format!("pull from {remote:?} failed"))?;

    for (name, digest) in &stats.updated_refs {
        println!("remote {remote}/{name} is now {digest}");
    }
    if stats.bytes_transferred > 0 {
        let (amount, unit) = if stats.bytes_transferred < 1024 {
            (stats.bytes_transferred, "B")
        } else {
            (stats.bytes_transferred / 1024, "KiB")
        };
        println!(
            "{} metadata, {} content objects fetched; {amount} {unit} transferred in {} seconds",
            stats.fetched_metadata,
            stats.fetched_content,
            stats.elapsed.as_secs(),
        );
    }
    Ok(())
}
