//! deltavault - chain-based incremental backup over delta synchronization

use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deltavault::cli::{Cli, Commands};
use deltavault::delta::{read_delta_ops, write_delta};
use deltavault::error::Error;
use deltavault::patch::apply;
use deltavault::signature::{build_signature, read_signature, write_signature};
use deltavault::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_default(),
    };

    let verbose = if cli.verbose > 0 { cli.verbose } else { config.verbose };
    init_tracing(verbose, cli.json || config.json_logs);

    match cli.command {
        Commands::Signature(args) => {
            create_signature_file(&args.basis, &args.sigfile)?;
            tracing::info!(basis = ?args.basis, sigfile = ?args.sigfile, "signature written");
        }
        Commands::Delta(args) => {
            create_delta_file(&args.sigfile, &args.newfile, &args.deltafile).await?;
            tracing::info!(newfile = ?args.newfile, deltafile = ?args.deltafile, "delta written");
        }
        Commands::Patch(args) => {
            patch_file(&args.basis, &args.deltafile, &args.newfile).await?;
            tracing::info!(basis = ?args.basis, newfile = ?args.newfile, "patch applied");
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8, json: bool) {
    let filter = match verbose {
        0 => EnvFilter::new("deltavault=info"),
        1 => EnvFilter::new("deltavault=debug"),
        2 => EnvFilter::new("deltavault=trace"),
        _ => EnvFilter::new("trace"),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

fn create_signature_file(basis: &Path, sigfile: &Path) -> deltavault::Result<()> {
    let input = File::open(basis)
        .map_err(|e| Error::source_read(format!("opening {}", basis.display()), e))?;
    let sig = build_signature(BufReader::new(input))?;

    let out = File::create(sigfile)
        .map_err(|e| Error::sink_write(format!("creating {}", sigfile.display()), e))?;
    let mut writer = BufWriter::new(out);
    let result = write_signature(&sig, &mut writer).and_then(|_| {
        writer
            .flush()
            .map_err(|e| Error::sink_write("flushing signature artifact", e))
    });
    discard_on_error(&result, sigfile);
    result
}

async fn create_delta_file(
    sigfile: &Path,
    newfile: &Path,
    deltafile: &Path,
) -> deltavault::Result<()> {
    let sig_input = File::open(sigfile)
        .map_err(|e| Error::source_read(format!("opening {}", sigfile.display()), e))?;
    let sig = read_signature(&mut BufReader::new(sig_input))?;

    let new_input = File::open(newfile)
        .map_err(|e| Error::source_read(format!("opening {}", newfile.display()), e))?;

    let out = File::create(deltafile)
        .map_err(|e| Error::sink_write(format!("creating {}", deltafile.display()), e))?;
    let mut writer = BufWriter::new(out);
    let result = match write_delta(sig, BufReader::new(new_input), &mut writer).await {
        Ok(()) => writer
            .flush()
            .map_err(|e| Error::sink_write("flushing delta artifact", e)),
        Err(e) => Err(e),
    };
    discard_on_error(&result, deltafile);
    result
}

async fn patch_file(basis: &Path, deltafile: &Path, newfile: &Path) -> deltavault::Result<()> {
    let old = File::open(basis)
        .map_err(|e| Error::source_read(format!("opening {}", basis.display()), e))?;
    let delta_input = File::open(deltafile)
        .map_err(|e| Error::source_read(format!("opening {}", deltafile.display()), e))?;
    let (ops, producer_result) = read_delta_ops(BufReader::new(delta_input));

    let out = File::create(newfile)
        .map_err(|e| Error::sink_write(format!("creating {}", newfile.display()), e))?;
    let mut writer = BufWriter::new(out);
    let result = match apply(&old, ops, producer_result, &mut writer).await {
        Ok(()) => writer
            .flush()
            .map_err(|e| Error::sink_write("flushing reconstructed file", e)),
        Err(e) => Err(e),
    };
    discard_on_error(&result, newfile);
    result
}

/// A failed command must not leave a half-written artifact behind.
fn discard_on_error(result: &deltavault::Result<()>, path: &Path) {
    if result.is_err() {
        let _ = std::fs::remove_file(path);
    }
}
