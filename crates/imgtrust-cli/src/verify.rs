//! `imgtrust verify` - Decide whether an image is signed and logged.

use anyhow::{Context, Result};
use std::fs;

use imgtrust_verify::{
    LogKey, VerificationResult, Verifier, VerifierConfig, VerifyError, VerifyOptions,
    VerifyRequest,
};

use crate::args::{OutputFormat, VerifyArgs};
use crate::exit_codes;
use crate::report;

pub async fn cmd_verify(args: VerifyArgs) -> i32 {
    match run_verify(&args).await {
        Ok(result) => {
            if !args.quiet {
                match args.format {
                    OutputFormat::Text => print!("{}", report::render_text(&result)),
                    OutputFormat::Json => match report::render_json(&result) {
                        Ok(json) => println!("{}", json),
                        Err(e) => eprintln!("error: {e:#}"),
                    },
                }
            }
            if result.verified {
                exit_codes::SUCCESS
            } else {
                exit_codes::REJECTED
            }
        }
        Err(e) => {
            let code = exit_code_for(&e);
            if !args.quiet {
                match args.format {
                    OutputFormat::Text => eprintln!("error: {e:#}"),
                    OutputFormat::Json => println!("{}", report::render_json_error(&e, code)),
                }
            }
            code
        }
    }
}

/// Exit code for a call that ended without a decision.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<VerifyError>() {
        Some(VerifyError::Transport { .. }) => exit_codes::TRANSPORT_ERROR,
        Some(VerifyError::DeadlineExceeded { .. }) => exit_codes::DEADLINE_EXCEEDED,
        Some(VerifyError::InvalidRequest { .. }) | Some(VerifyError::Key(_)) | None => {
            exit_codes::USAGE_ERROR
        }
    }
}

pub fn build_config(args: &VerifyArgs) -> VerifierConfig {
    let mut config = VerifierConfig::default()
        .with_rekor_url(args.rekor_url.trim_end_matches('/'))
        .with_timeout_secs(args.timeout)
        .with_max_retries(args.max_retries)
        .with_insecure_registry(args.insecure_registry);
    if let Some(token) = args.registry_token.as_deref().filter(|t| !t.is_empty()) {
        config = config.with_registry_token(token);
    }
    config
}

async fn run_verify(args: &VerifyArgs) -> Result<VerificationResult> {
    let signer_pem = fs::read_to_string(&args.pubkey)
        .with_context(|| format!("failed to read public key: {}", args.pubkey.display()))?;
    let log_key = LogKey::load(&args.rekor_pubkey).with_context(|| {
        format!(
            "failed to load log public key: {}",
            args.rekor_pubkey.display()
        )
    })?;

    let request = VerifyRequest::parse(&args.hash, &args.image_ref, &signer_pem)?.with_options(
        VerifyOptions {
            require_log_key_match: args.require_log_key_match,
            require_entry_timestamp: args.require_entry_timestamp,
        },
    );

    let config = build_config(args);
    tracing::debug!(
        rekor_url = %config.rekor_url,
        log_id = %log_key.log_id(),
        timeout_secs = config.timeout_secs,
        "verifier ready"
    );
    let verifier = Verifier::from_config(&config, log_key)?;

    Ok(verifier.verify(&request).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::args::{Cli, Command};
    use clap::Parser;
    use imgtrust_verify::{Stage, TransportError};

    const LOG_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEEbZOP31y57BWlCYhn+aiLcgakAIa
lSxDCYWBkZtiOVEdT8+U9h07BbrEclyNC7pQdhNyaBu/1Yp8EtUWyyv+Vw==
-----END PUBLIC KEY-----
";

    fn args_with_keys(pubkey: &str, rekor_pubkey: &str, extra: &[&str]) -> VerifyArgs {
        let mut argv = vec![
            "imgtrust",
            "verify",
            "--hash",
            "abc",
            "--image-ref",
            "ghcr.io/acme/app:v1",
            "--pubkey",
            pubkey,
            "--rekor-pubkey",
            rekor_pubkey,
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().cmd {
            Command::Verify(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    fn args(extra: &[&str]) -> VerifyArgs {
        args_with_keys("cosign.pub", "rekor.pub", extra)
    }

    #[test]
    fn test_exit_codes() {
        let transport = anyhow::Error::new(VerifyError::Transport {
            stage: Stage::SearchingLog,
            source: TransportError::Network {
                message: "connection refused".to_string(),
            },
        });
        assert_eq!(exit_code_for(&transport), exit_codes::TRANSPORT_ERROR);

        let deadline = anyhow::Error::new(VerifyError::DeadlineExceeded {
            timeout: Duration::from_secs(5),
        });
        assert_eq!(exit_code_for(&deadline), exit_codes::DEADLINE_EXCEEDED);

        let io = anyhow::anyhow!("failed to read public key");
        assert_eq!(exit_code_for(&io), exit_codes::USAGE_ERROR);
    }

    #[test]
    fn test_build_config() {
        let config = build_config(&args(&[
            "--rekor-url",
            "http://localhost:3000/",
            "--registry-token",
            "tok",
            "--insecure-registry",
        ]));
        assert_eq!(config.rekor_url, "http://localhost:3000");
        assert_eq!(config.registry_token.as_deref(), Some("tok"));
        assert_eq!(config.registry_scheme, "http");
    }

    #[test]
    fn test_timeout_flag_reaches_verifier() {
        let config = build_config(&args(&["--timeout", "17"]));
        let log_key = LogKey::from_pem(LOG_KEY_PEM).unwrap();
        let verifier = Verifier::from_config(&config, log_key).unwrap();
        assert_eq!(verifier.timeout(), Duration::from_secs(17));
    }

    #[tokio::test]
    async fn test_missing_key_file_is_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.pub");
        let missing = missing.to_str().unwrap();
        let code = cmd_verify(args_with_keys(missing, missing, &["-q"])).await;
        assert_eq!(code, exit_codes::USAGE_ERROR);
    }
}
