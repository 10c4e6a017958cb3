//! convertir CLI
//!
//! Converts TF-style ELECTRA checkpoints into module-style parameter files.
//!
//! # Usage
//!
//! ```bash
//! # Convert every role and verify the forward passes agree
//! convertir convert --checkpoint-dir electra_small --model-size small --test
//!
//! # Convert only the discriminator into a chosen directory
//! convertir convert --checkpoint-dir electra_base --model-size base --roles disc --save-dir out
//!
//! # Inspect how names are mapped for the generator
//! convertir map --checkpoint-dir electra_small --role gen
//!
//! # Validate a run config
//! convertir validate-config run.yaml
//! ```

use clap::Parser;
use convertir::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
