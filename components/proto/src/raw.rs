use std::collections::HashMap;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// The recognized attribute keys of the Postfix `smtpd_access_policy`
/// protocol. Anything else read off the wire is silently dropped.
const RECOGNIZED_KEYS: &[&str] = &[
    "request",
    "protocol_state",
    "protocol_name",
    "client_address",
    "client_name",
    "helo_name",
    "sender",
    "recipient",
    "instance",
    "sasl_method",
    "sasl_username",
    "sasl_sender",
    "size",
    "ccert_subject",
    "ccert_issuer",
    "ccert_fingerprint",
];

/// One `key=value` block as handed to us by Postfix, before any
/// postwhite-specific interpretation (command suffix splitting,
/// lowercasing, sender splitting) has happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRequest {
    attributes: HashMap<String, String>,
}

impl RawRequest {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Reads one `key=value\n` block terminated by an empty line off `reader`.
///
/// Returns `Ok(None)` if the connection closed before any attribute line was
/// read (the client hung up without sending a request). Unknown keys are
/// dropped; this never fails on an unrecognized key, only on a line that
/// doesn't contain `=` at all.
pub async fn read_raw_request<R>(mut reader: R) -> Result<Option<RawRequest>>
where
    R: AsyncBufRead + Unpin,
{
    let mut attributes = HashMap::new();
    let mut saw_any_line = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .context("reading policy request line")?;
        if bytes_read == 0 {
            if saw_any_line {
                anyhow::bail!("connection closed mid-request");
            }
            return Ok(None);
        }
        saw_any_line = true;

        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            break;
        }

        let (key, value) = trimmed
            .split_once('=')
            .with_context(|| format!("malformed attribute line: {:?}", trimmed))?;
        if RECOGNIZED_KEYS.contains(&key) {
            attributes.insert(key.to_string(), value.to_string());
        }
    }

    Ok(Some(RawRequest { attributes }))
}
