//! CLI argument parsing for deltavault

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// deltavault - chain-based incremental backup over delta synchronization
#[derive(Parser, Debug)]
#[command(name = "deltavault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file path
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize a basis file into a signature artifact
    Signature(SignatureArgs),

    /// Compute a delta from a prior signature and a new file
    Delta(DeltaArgs),

    /// Reconstruct a file from a basis plus a delta artifact
    Patch(PatchArgs),
}

/// Arguments for the signature command
#[derive(Parser, Debug)]
pub struct SignatureArgs {
    /// File to summarize
    pub basis: PathBuf,

    /// Signature artifact to create
    pub sigfile: PathBuf,
}

/// Arguments for the delta command
#[derive(Parser, Debug)]
pub struct DeltaArgs {
    /// Signature of the prior version
    pub sigfile: PathBuf,

    /// New version of the file
    pub newfile: PathBuf,

    /// Delta artifact to create
    pub deltafile: PathBuf,
}

/// Arguments for the patch command
#[derive(Parser, Debug)]
pub struct PatchArgs {
    /// Prior version of the file
    pub basis: PathBuf,

    /// Delta artifact to apply
    pub deltafile: PathBuf,

    /// Reconstructed file to create
    pub newfile: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signature_command() {
        let cli = Cli::try_parse_from(["deltavault", "signature", "basis.bin", "basis.sig"]).unwrap();
        match cli.command {
            Commands::Signature(args) => {
                assert_eq!(args.basis, PathBuf::from("basis.bin"));
                assert_eq!(args.sigfile, PathBuf::from("basis.sig"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_delta_argument_order() {
        let cli =
            Cli::try_parse_from(["deltavault", "delta", "old.sig", "new.bin", "out.delta"]).unwrap();
        match cli.command {
            Commands::Delta(args) => {
                assert_eq!(args.sigfile, PathBuf::from("old.sig"));
                assert_eq!(args.newfile, PathBuf::from("new.bin"));
                assert_eq!(args.deltafile, PathBuf::from("out.delta"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parses_patch_argument_order() {
        let cli =
            Cli::try_parse_from(["deltavault", "patch", "old.bin", "out.delta", "new.bin"]).unwrap();
        match cli.command {
            Commands::Patch(args) => {
                assert_eq!(args.basis, PathBuf::from("old.bin"));
                assert_eq!(args.deltafile, PathBuf::from("out.delta"));
                assert_eq!(args.newfile, PathBuf::from("new.bin"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn verbosity_flags_stack() {
        let cli = Cli::try_parse_from(["deltavault", "-vv", "signature", "a", "b"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
