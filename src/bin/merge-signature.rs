//! merge-signature CLI tool
//!
//! Attaches a signature page to a PDF document, either by overlaying the
//! source's last page onto the signature page (merge, the default) or by
//! adding the signature as a new trailing page (append).

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use merge_signature::pdf::{merge_signature, SignatureMode, SignatureOptions};

/// Attach a signature page to a PDF document
#[derive(Parser, Debug)]
#[command(name = "merge-signature")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_negates_reqs = true)]
#[command(after_help = "EXAMPLES:
    # Overlay the contract's last page onto the signature page
    merge-signature contract.pdf signature.pdf signed.pdf

    # Same, spelled out
    merge-signature merge contract.pdf signature.pdf signed.pdf

    # Add the signature page after the last contract page
    merge-signature append contract.pdf signature.pdf signed.pdf")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Source PDF file
    #[arg(required = true, value_name = "PDF_FILE")]
    pdf_file: Option<PathBuf>,

    /// Signature PDF file (only its first page is used)
    #[arg(required = true, value_name = "SIGNATURE_PDF")]
    signature_pdf: Option<PathBuf>,

    /// Output PDF file path
    #[arg(required = true, value_name = "OUT_FILE")]
    out_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Overlay the source's last page content onto the signature page
    Merge(SignatureArgs),

    /// Add the signature as a new trailing page
    Append(SignatureArgs),
}

#[derive(Args, Debug)]
struct SignatureArgs {
    /// Source PDF file
    pdf_file: PathBuf,

    /// Signature PDF file (only its first page is used)
    signature_pdf: PathBuf,

    /// Output PDF file path
    out_file: PathBuf,
}

fn main() {
    // try_parse so that usage errors exit 1; --help and --version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // The bare three-argument form defaults to merge mode
    let (mode, args) = match cli.command {
        Some(Command::Merge(args)) => (SignatureMode::Merge, args),
        Some(Command::Append(args)) => (SignatureMode::Append, args),
        None => match (cli.pdf_file, cli.signature_pdf, cli.out_file) {
            (Some(pdf_file), Some(signature_pdf), Some(out_file)) => (
                SignatureMode::Merge,
                SignatureArgs {
                    pdf_file,
                    signature_pdf,
                    out_file,
                },
            ),
            // clap enforces the positionals when no subcommand is given
            _ => bail!("missing required arguments"),
        },
    };

    let options = SignatureOptions {
        source_path: args.pdf_file,
        signature_path: args.signature_pdf,
        output_path: args.out_file,
        mode,
    };

    match mode {
        SignatureMode::Merge => eprintln!("Merging signature page..."),
        SignatureMode::Append => eprintln!("Appending signature page..."),
    }

    merge_signature(&options).context("Failed to attach signature page")?;

    eprintln!("Output: {}", options.output_path.display());

    Ok(())
}
