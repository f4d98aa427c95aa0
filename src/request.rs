use once_cell::sync::Lazy;
use regex::Regex;

use postwhite_proto::RawRequest;

/// The recognized command verbs a `+verb[-arg]` recipient suffix can carry.
///
/// `block` is deliberately absent: an earlier revision of this tool used
/// `block`, the current one uses `deny`, and by design they are not
/// aliased; a `+block...` suffix simply fails to match and is treated as
/// having no command at all.
static COMMAND_RECIPIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+)\+(info|learn|allow|swallow|deny)-?(.*)?(@.+)$").expect("valid regex")
});

static AT_STAND_IN: &str = "-at-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Info,
    Learn,
    Allow,
    Swallow,
    Deny,
}

impl Command {
    fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "info" => Some(Command::Info),
            "learn" => Some(Command::Learn),
            "allow" => Some(Command::Allow),
            "swallow" => Some(Command::Swallow),
            "deny" => Some(Command::Deny),
            _ => None,
        }
    }
}

/// A policy request after postwhite's own interpretation: lowercased,
/// command suffix split off the recipient, sender split into local/domain.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub client_address: String,
    pub client_name: String,
    pub sender: String,
    pub sender_local: String,
    pub sender_domain: String,
    pub recipient: String,
    pub sasl_username: String,
    pub instance: String,
    pub command: Option<(Command, String)>,
}

impl ParsedRequest {
    pub fn from_raw(raw: &RawRequest) -> Self {
        let client_address = raw.get("client_address").unwrap_or_default().to_lowercase();
        let client_name = raw.get("client_name").unwrap_or_default().to_lowercase();
        let sender = raw.get("sender").unwrap_or_default().to_lowercase();
        let recipient_raw = raw.get("recipient").unwrap_or_default().to_lowercase();
        let sasl_username = raw.get("sasl_username").unwrap_or_default().to_lowercase();
        let instance = raw.get("instance").unwrap_or_default().to_string();

        let (recipient, command) = split_command(&recipient_raw);
        let (sender_local, sender_domain) = split_sender(&sender);

        ParsedRequest {
            client_address,
            client_name,
            sender,
            sender_local,
            sender_domain,
            recipient,
            sasl_username,
            instance,
            command,
        }
    }
}

/// Splits a `local+verb[-arg]@domain` recipient into its bare `local@domain`
/// form plus the extracted command, or returns the recipient unchanged with
/// `None` if it carries no recognized command suffix.
fn split_command(recipient: &str) -> (String, Option<(Command, String)>) {
    let Some(caps) = COMMAND_RECIPIENT.captures(recipient) else {
        return (recipient.to_string(), None);
    };
    let base = &caps[1];
    let verb = &caps[2];
    let argument = caps.get(3).map_or("", |m| m.as_str());
    let domain = &caps[4]; // includes the leading '@'

    let Some(command) = Command::from_verb(verb) else {
        return (recipient.to_string(), None);
    };

    let argument = argument.replace(AT_STAND_IN, "@");
    let stripped = format!("{}{}", base, domain);
    (stripped, Some((command, argument)))
}

/// Splits `sender` on its last `@` into `(local, domain)`. A sender with no
/// `@` at all yields an empty domain.
fn split_sender(sender: &str) -> (String, String) {
    match sender.rsplit_once('@') {
        Some((local, domain)) => (local.to_string(), domain.to_string()),
        None => (sender.to_string(), String::new()),
    }
}
