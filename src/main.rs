//! Entry point for the zebin validation tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Locate the `-file <path>` argument pair.
//! 3. Map the candidate container into memory.
//! 4. Run the full decode pipeline and print warnings, errors and a
//!    validity verdict.
//!
//! Exit codes: 0 when the binary is a valid zebin, -1 for a missing
//! argument or unreadable file, -2 when the file is not a zebin at all,
//! otherwise the numeric decode error code.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::exit;

use zebin::{decode_program, is_zebin, DecodeConfig, TargetDevice};

/// Standalone validator for zebin device binaries.
///
/// Decodes a container without any target device, reporting every decode
/// warning and error a driver would surface into its build log.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Arguments (scanned manually for `-file <path>`)
    #[arg(allow_hyphen_values = true, num_args = 0..)]
    inputs: Vec<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", help = "Set the logging level")]
    log_level: String,
}

/// Maps the input file into memory.
fn map_input(path: &Path) -> Result<Mmap> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mmap =
        unsafe { Mmap::map(&file) }.with_context(|| format!("failed to map {}", path.display()))?;
    Ok(mmap)
}

fn main() {
    let cli = Cli::parse();
    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Manual scan because clap's allow_hyphen_values captures everything.
    let mut file: Option<PathBuf> = None;
    let mut iter = cli.inputs.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "-file" || arg == "--file" {
            file = iter.next().map(PathBuf::from);
        }
    }
    let Some(path) = file else {
        eprintln!("Error: no input file. Usage: zebin -file <path>");
        exit(-1);
    };

    let mmap = match map_input(&path) {
        Ok(mmap) => mmap,
        Err(err) => {
            eprintln!("Error: {err:#}");
            exit(-1);
        }
    };

    println!("Validating {} ({} bytes)", path.display(), mmap.len());
    if !is_zebin(&mmap) {
        println!("Binary is not a zebin container.");
        exit(-2);
    }

    // The validator has no device to match against.
    let config = DecodeConfig {
        force_device_compatibility: true,
        ..Default::default()
    };
    let output = decode_program(&mmap, &TargetDevice::default(), &config);

    if !output.warnings.is_empty() {
        println!("Warnings:\n{}", output.warnings.trim_end());
    }
    if !output.errors.is_empty() {
        println!("Errors:\n{}", output.errors.trim_end());
    }
    match output.program {
        Ok(program) => {
            println!("Kernels: {}", program.kernel_infos.len());
            for kernel in &program.kernel_infos {
                println!(
                    "  {} : {} bytes of ISA",
                    kernel.descriptor.metadata.kernel_name,
                    kernel.heap.kernel_isa.len()
                );
            }
            println!(
                "Global constants: {} bytes, global variables: {} bytes",
                program.global_constants.size, program.global_variables.size
            );
            println!("Binary is a valid zebin.");
            exit(0);
        }
        Err(err) => {
            println!("Binary is not a valid zebin: {err}.");
            exit(err.code());
        }
    }
}
