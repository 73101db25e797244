//! fidocheck CLI - WebAuthn registration verification and FIDO metadata tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;
mod exit_codes;
mod utils;

use commands::inspect::InspectOptions;
use commands::mds::MdsOptions;
use commands::verify_registration::VerifyOptions;
use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "Exit codes:
  0   Success
  1   General error
  65  Verification failed (ceremony or metadata rejected)
  66  Input error (unreadable or malformed input)
  69  Service unavailable (metadata endpoint)";

#[derive(Parser)]
#[command(name = "fidocheck")]
#[command(author, version, about = "WebAuthn / FIDO2 verification toolkit", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a captured registration (attestation) ceremony
    VerifyRegistration {
        /// JSON capture: origin, rpId, challenge and the browser response
        #[arg(value_name = "CAPTURE")]
        capture: PathBuf,

        /// PEM bundle of trusted attestation root certificates
        #[arg(long, value_name = "PEM")]
        roots: Option<PathBuf>,

        /// Accept self attestation
        #[arg(long)]
        allow_self_attestation: bool,

        /// Require the user-verified flag
        #[arg(long)]
        require_uv: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Suppress output; rely on the exit code
        #[arg(short, long)]
        quiet: bool,
    },

    /// Decode authenticator data (or an attestation object) and show its fields
    Inspect {
        /// Hex or base64url encoded bytes
        #[arg(value_name = "DATA")]
        data: String,

        /// Input is a CBOR attestation object rather than raw authenticator data
        #[arg(long)]
        attestation_object: bool,

        /// Check rpIdHash against this RP ID
        #[arg(long, value_name = "RP_ID")]
        rp_id: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch and verify the FIDO metadata BLOB, then summarise it
    Mds {
        /// PEM file with the MDS root certificate (default: FIDOCHECK_MDS_ROOT_CERT)
        #[arg(long, value_name = "PEM")]
        root: Option<PathBuf>,

        /// Read the BLOB from a file instead of fetching it
        #[arg(long, value_name = "FILE", conflicts_with = "url")]
        file: Option<PathBuf>,

        /// BLOB endpoint (default: FIDOCHECK_MDS_URL or the FIDO Alliance MDS)
        #[arg(long)]
        url: Option<String>,

        /// Show the status history of one authenticator
        #[arg(long)]
        aaguid: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    utils::init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::VerifyRegistration {
            capture,
            roots,
            allow_self_attestation,
            require_uv,
            json,
            quiet,
        } => {
            commands::verify_registration::execute(VerifyOptions {
                capture,
                roots,
                allow_self_attestation,
                require_user_verification: require_uv,
                json,
                quiet,
            })
            .await
        }
        Commands::Inspect {
            data,
            attestation_object,
            rp_id,
            json,
        } => commands::inspect::execute(InspectOptions {
            data,
            attestation_object,
            rp_id,
            json,
        }),
        Commands::Mds {
            root,
            file,
            url,
            aaguid,
            json,
        } => {
            commands::mds::execute(MdsOptions {
                root,
                file,
                url,
                aaguid,
                json,
            })
            .await
        }
    };

    match result {
        Ok(()) => ExitCode::success().into(),
        Err(err) => {
            let exit = ExitCode::from_anyhow(&err);
            if let Some(message) = &exit.message {
                eprintln!("{} {message}", "error:".red().bold());
            }
            exit.into()
        }
    }
}
