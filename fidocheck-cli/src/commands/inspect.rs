//! Decode and display authenticator data or a whole attestation object.

use anyhow::{Context, Result};
use colored::Colorize;
use fidocheck_core::codec::{AttestationObject, AuthenticatorData};
use fidocheck_core::crypto;
use serde_json::json;

use crate::utils::{b64url, decode_binary};

pub struct InspectOptions {
    /// Hex or base64 input.
    pub data: String,
    /// Treat the input as a CBOR attestation object instead of raw authData.
    pub attestation_object: bool,
    /// RP ID to compare against `rpIdHash`.
    pub rp_id: Option<String>,
    pub json: bool,
}

/// Execute the inspect command.
pub fn execute(options: InspectOptions) -> Result<()> {
    let bytes = decode_binary(&options.data)?;

    let (format, auth_data) = if options.attestation_object {
        let object =
            AttestationObject::decode(&bytes).context("Failed to decode attestation object")?;
        (Some(object.format()), object.auth_data)
    } else {
        let auth_data =
            AuthenticatorData::decode(&bytes).context("Failed to decode authenticator data")?;
        (None, auth_data)
    };
    let rp_id_match = options
        .rp_id
        .as_deref()
        .map(|rp_id| crypto::sha256(rp_id.as_bytes()) == auth_data.rp_id_hash);

    if options.json {
        println!("{}", serde_json::to_string_pretty(&to_json(format, &auth_data, rp_id_match))?);
        return Ok(());
    }

    println!();
    if let Some(format) = format {
        println!("   {} {}", "Format:".dimmed(), format);
    }
    println!("   {} {}", "RP ID hash:".dimmed(), hex::encode(auth_data.rp_id_hash));
    match rp_id_match {
        Some(true) => println!("   {} {}", "RP ID:".dimmed(), "matches".green()),
        Some(false) => println!("   {} {}", "RP ID:".dimmed(), "DOES NOT MATCH".red()),
        None => {}
    }
    println!("   {} {}", "Flags:".dimmed(), flag_names(&auth_data).join(" "));
    println!("   {} {}", "Sign count:".dimmed(), auth_data.sign_count);
    if let Some(acd) = &auth_data.attested_credential_data {
        println!("   {} {}", "AAGUID:".dimmed(), acd.aaguid);
        println!("   {} {}", "Credential:".dimmed(), b64url(&acd.credential_id));
        println!(
            "   {} {:?}{}",
            "Key:".dimmed(),
            acd.credential_public_key.key_type(),
            acd.credential_public_key
                .alg()
                .map(|a| format!(" ({a})"))
                .unwrap_or_default()
        );
    }
    let extensions = auth_data.extension_ids();
    if !extensions.is_empty() {
        println!("   {} {}", "Extensions:".dimmed(), extensions.join(", "));
    }
    Ok(())
}

fn flag_names(auth_data: &AuthenticatorData) -> Vec<&'static str> {
    let flags = auth_data.flags;
    [
        (flags.user_present(), "UP"),
        (flags.user_verified(), "UV"),
        (flags.backup_eligible(), "BE"),
        (flags.backup_state(), "BS"),
        (flags.has_attested_credential_data(), "AT"),
        (flags.has_extensions(), "ED"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

fn to_json(
    format: Option<fidocheck_core::AttestationFormat>,
    auth_data: &AuthenticatorData,
    rp_id_match: Option<bool>,
) -> serde_json::Value {
    let credential = auth_data.attested_credential_data.as_ref().map(|acd| {
        json!({
            "aaguid": acd.aaguid,
            "credentialId": b64url(&acd.credential_id),
            "keyType": format!("{:?}", acd.credential_public_key.key_type()),
            "algorithm": acd.credential_public_key.alg().map(|a| a.id()),
        })
    });
    json!({
        "format": format.map(|f| f.as_str()),
        "rpIdHash": hex::encode(auth_data.rp_id_hash),
        "rpIdMatches": rp_id_match,
        "flags": flag_names(auth_data),
        "signCount": auth_data.sign_count,
        "attestedCredentialData": credential,
        "extensions": auth_data.extension_ids(),
    })
}
