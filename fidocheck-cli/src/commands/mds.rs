//! Fetch, verify and summarise a FIDO metadata BLOB.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use fidocheck_core::metadata::{
    AuthenticatorStatus, BlobVerifier, LocalFileBlobProvider, MetadataBlobPayload,
    MetadataBlobProvider,
};
use fidocheck_core::{Aaguid, MetadataConfig, TrustAnchor, VerifierConfig};
use tracing::info;

use crate::exit_codes::InputError;
use crate::utils::read_input;

pub struct MdsOptions {
    /// MDS root certificate (PEM); falls back to FIDOCHECK_MDS_ROOT_CERT.
    pub root: Option<PathBuf>,
    /// Read the BLOB from a file instead of the network.
    pub file: Option<PathBuf>,
    pub url: Option<String>,
    pub aaguid: Option<String>,
    pub json: bool,
}

/// Execute the mds command.
pub async fn execute(options: MdsOptions) -> Result<()> {
    let config = MetadataConfig::from_env();
    let root_path = options
        .root
        .clone()
        .or(config.root_certificate.clone())
        .ok_or_else(|| InputError("An MDS root certificate is required (--root)".into()))?;
    let roots = TrustAnchor::from_pem_bundle(&read_input(&root_path)?)
        .with_context(|| format!("Failed to parse root certificate {}", root_path.display()))?;
    let mut verifier = BlobVerifier::new(roots);
    if config.revocation_check_enabled {
        if let Some(crl) = VerifierConfig::from_env().crl_file {
            verifier = verifier.with_revocation_check(crl);
        }
    }

    let aaguid: Option<Aaguid> = options
        .aaguid
        .as_deref()
        .map(|s| s.parse())
        .transpose()
        .map_err(|e| InputError(format!("Invalid AAGUID: {e}")))?;

    let provider = provider(&options, &config, verifier)?;
    let payload = provider
        .provide()
        .await
        .context("Failed to load metadata BLOB")?;
    info!(no = payload.no, entries = payload.entries.len(), "Metadata BLOB verified");

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&payload, aaguid.as_ref()))?);
        return Ok(());
    }

    println!();
    println!("   {} {}", "Serial:".dimmed(), payload.no);
    println!("   {} {}", "Next update:".dimmed(), payload.next_update);
    println!("   {} {}", "Entries:".dimmed(), payload.entries.len());
    for (status, count) in status_histogram(&payload) {
        println!("     {:<32} {}", status, count);
    }

    if let Some(aaguid) = aaguid {
        println!();
        let mut found = false;
        for entry in payload.entries_for_aaguid(&aaguid) {
            found = true;
            let description = entry
                .metadata_statement
                .as_ref()
                .map(|s| s.description.as_str())
                .unwrap_or("(no metadata statement)");
            println!("   {} {}", "Authenticator:".dimmed(), description.bold());
            for report in &entry.status_reports {
                let date = report
                    .effective_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".into());
                println!("     {date}  {}", status_label(report.status));
            }
        }
        if !found {
            println!("   {} {}", "Authenticator:".dimmed(), "not listed".yellow());
        }
    }
    Ok(())
}

fn provider(
    options: &MdsOptions,
    config: &MetadataConfig,
    verifier: BlobVerifier,
) -> Result<Arc<dyn MetadataBlobProvider>> {
    if let Some(file) = &options.file {
        return Ok(Arc::new(LocalFileBlobProvider::new(file, verifier)));
    }
    network_provider(options, config, verifier)
}

#[cfg(feature = "network")]
fn network_provider(
    options: &MdsOptions,
    config: &MetadataConfig,
    verifier: BlobVerifier,
) -> Result<Arc<dyn MetadataBlobProvider>> {
    use fidocheck_core::metadata::{FidoMds3BlobProvider, ReqwestHttpClient, RetryConfig};

    let client = ReqwestHttpClient::new(RetryConfig {
        timeout: config.fetch_timeout,
        ..Default::default()
    })
    .context("Failed to build HTTP client")?;
    let url = options.url.clone().unwrap_or_else(|| config.url.clone());
    Ok(Arc::new(FidoMds3BlobProvider::new(Arc::new(client), url, verifier)))
}

#[cfg(not(feature = "network"))]
fn network_provider(
    _options: &MdsOptions,
    _config: &MetadataConfig,
    _verifier: BlobVerifier,
) -> Result<Arc<dyn MetadataBlobProvider>> {
    Err(InputError("Built without network support; pass --file".into()).into())
}

fn status_label(status: AuthenticatorStatus) -> colored::ColoredString {
    let label = format!("{status:?}");
    if status.is_fido_certified() {
        label.green()
    } else if status.is_compromise() || status == AuthenticatorStatus::Revoked {
        label.red()
    } else {
        label.yellow()
    }
}

/// Count of entries by their latest status report.
fn status_histogram(payload: &MetadataBlobPayload) -> BTreeMap<String, usize> {
    let mut histogram = BTreeMap::new();
    for entry in &payload.entries {
        let status = entry
            .latest_status()
            .map(|r| format!("{:?}", r.status))
            .unwrap_or_else(|| "(none)".into());
        *histogram.entry(status).or_insert(0) += 1;
    }
    histogram
}

fn summary_json(payload: &MetadataBlobPayload, aaguid: Option<&Aaguid>) -> serde_json::Value {
    let entries: Vec<_> = aaguid
        .map(|a| payload.entries_for_aaguid(a).collect())
        .unwrap_or_default();
    serde_json::json!({
        "no": payload.no,
        "nextUpdate": payload.next_update,
        "entries": payload.entries.len(),
        "statuses": status_histogram(payload),
        "matches": entries,
    })
}
