//! Generate a Wireshark dissector from an annotated protocol header.
//!
//! Usage:
//!   make_dissector [OPTIONS] [HEADER.h]
//!   make_dissector < MFSCommunication.h > packet-lizardfs.c
//!
//! Options:
//!   --config, -c FILE   YAML generator configuration (protocol names, ports, field classes)
//!   --output, -o FILE   Write the dissector to FILE instead of stdout
//!   --verbose, -v       Debug logging on stderr
//!
//! If no header is given, reads from stdin. On any error nothing is written and the exit
//! code is 1.

use anyhow::{bail, Context};
use dissectgen::{generate, parse_with_config, GeneratorConfig};
use std::io::{self, Read, Write};
use std::path::PathBuf;

fn take_value(args: &mut Vec<String>, names: &[&str]) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) else {
        return Ok(None);
    };
    args.remove(pos);
    if pos >= args.len() {
        bail!("{} needs a value", names[0]);
    }
    Ok(Some(args.remove(pos)))
}

fn take_flag(args: &mut Vec<String>, names: &[&str]) -> bool {
    if let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = take_flag(&mut args, &["--verbose", "-v"]);
    let config_path = take_value(&mut args, &["--config", "-c"])?.map(PathBuf::from);
    let output = take_value(&mut args, &["--output", "-o"])?.map(PathBuf::from);

    let filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if args.len() > 1 {
        bail!("expected at most one input header, got {}", args.len());
    }

    let config = match &config_path {
        Some(path) => GeneratorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GeneratorConfig::default(),
    };

    let (source, input_name) = match args.first() {
        Some(path) => (
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
            path.clone(),
        ),
        None => {
            let mut src = String::new();
            io::stdin()
                .read_to_string(&mut src)
                .context("reading stdin")?;
            (src, "<stdin>".to_string())
        }
    };

    let model = parse_with_config(&source, config).with_context(|| input_name.clone())?;
    let dissector = generate(&model).with_context(|| format!("generating dissector for {}", input_name))?;

    match &output {
        Some(path) => {
            std::fs::write(path, &dissector)
                .with_context(|| format!("writing {}", path.display()))?;
            log::info!("Written: {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(dissector.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
