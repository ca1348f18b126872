// Utility helpers

/// Builds an opaque request id: `{prefix}_{unix_millis}_{12 hex chars}`.
///
/// Unique enough to avoid casual collisions; not meant to be secret.
pub fn generate_request_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = hex::encode(rand::random::<[u8; 6]>());
    let prefix = prefix.trim();
    if prefix.is_empty() {
        format!("req_{}_{}", millis, suffix)
    } else {
        format!("{}_{}_{}", prefix, millis, suffix)
    }
}

/// Explorer-style reference link for a submitted transaction.
pub fn explorer_tx_link(explorer_base_url: &str, tx_hash: &str) -> String {
    format!("{}/tx/{}", explorer_base_url.trim_end_matches('/'), tx_hash)
}

// Internal helper that checks whether an error message points to a transient RPC problem.
pub fn looks_like_transient_rpc_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("error sending request")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("error decoding response body")
        || lower.contains("too many requests")
        || lower.contains("429")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("timeout")
        || lower.contains("timed out")
}
