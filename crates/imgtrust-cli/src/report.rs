//! Human and machine renderings of a verification result.

use imgtrust_verify::{Stage, VerificationResult};

pub fn render_text(result: &VerificationResult) -> String {
    let mut out = String::new();

    if result.verified {
        out.push_str(&format!("VERIFIED {} ({})\n", result.digest, result.reference));
    } else {
        let stage = result.rejected_at.unwrap_or(Stage::Rejected);
        out.push_str(&format!(
            "REJECTED {} ({}) at {}\n",
            result.digest, result.reference, stage
        ));
    }

    if !result.log_entries_verified.is_empty() {
        out.push_str(&format!(
            "  log entries: {}\n",
            result.log_entries_verified.join(", ")
        ));
    }
    if !result.matched_signatures.is_empty() {
        out.push_str(&format!("  signatures:  {}\n", result.matched_signatures.len()));
        for signature in &result.matched_signatures {
            if let Some(layer) = &signature.layer_digest {
                out.push_str(&format!("    - {}\n", layer));
            }
        }
    }
    if !result.errors.is_empty() {
        out.push_str("  rejected candidates:\n");
        for failure in &result.errors {
            out.push_str(&format!("    {}\n", failure));
        }
    }

    out
}

pub fn render_json(result: &VerificationResult) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}

/// JSON document for a call that ended without a decision.
pub fn render_json_error(error: &anyhow::Error, exit_code: i32) -> String {
    serde_json::json!({
        "verified": false,
        "error": format!("{error:#}"),
        "exit_code": exit_code,
    })
    .to_string()
}
