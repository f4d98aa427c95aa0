use crate::context::RuntimeContext;
use crate::error::PostwhiteError;
use crate::request::{Command, ParsedRequest};
use crate::spool::LearningSpool;
use crate::store::{AllowListStore, ListDecision, Method};

/// A fully rendered outbound reply-mail, ready to be handed to the outbound
/// SMTP collaborator. Headers are plain strings rather than a typed model:
/// the daemon constructs the full RFC 822 message including headers itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub to: String,
    pub from: String,
    pub reply_to: String,
    pub body: String,
}

impl OutboundMail {
    /// Renders the complete RFC 822 text: headers, blank line, body.
    pub fn to_rfc822(&self) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nReply-To: {}\r\nSubject: postwhite\r\n\r\n{}\r\n",
            self.from, self.to, self.reply_to, self.body
        )
    }
}

/// Splits an already-stripped recipient `local@domain` into its parts.
fn split_recipient(recipient: &str) -> (&str, &str) {
    recipient.split_once('@').unwrap_or((recipient, ""))
}

/// Builds the `local+verb-argument@domain` address used as the Reply-To on
/// advisory mails: the "reply to toggle" mechanism.
fn command_address(recipient: &str, verb: &str, argument: &str) -> String {
    let (local, domain) = split_recipient(recipient);
    if argument.is_empty() {
        format!("{}+{}@{}", local, verb, domain)
    } else {
        format!("{}+{}-{}@{}", local, verb, argument, domain)
    }
}

fn render(template: &str, replacements: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in replacements {
        out = out.replace(&format!("%{{{}}}", key), value);
    }
    out
}

fn append_footer(ctx: &RuntimeContext, body: String) -> String {
    if ctx.messages.footer.is_empty() {
        body
    } else {
        format!("{}\r\n\r\n{}", body, ctx.messages.footer)
    }
}

/// Executes an authorized command, mutating the store/spool as needed, and
/// returns the reply-mail to send (if any).
pub fn execute(
    ctx: &RuntimeContext,
    store: &AllowListStore,
    spool: &LearningSpool,
    req: &ParsedRequest,
    verb: Command,
    argument: &str,
) -> Result<Option<OutboundMail>, PostwhiteError> {
    match verb {
        Command::Info => {
            let mut entries = store.dump(&req.recipient)?;
            entries.sort_by(|a, b| a.pattern.cmp(&b.pattern));
            let whitelist = if entries.is_empty() {
                "(empty)".to_string()
            } else {
                entries
                    .iter()
                    .map(|e| format!("{}\t{:?}", e.pattern, e.method))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            let body = render(
                &ctx.messages.info,
                &[
                    ("recipient", &req.recipient),
                    ("sender", &req.sender),
                    ("sender_domain", &req.sender_domain),
                    ("whitelist", &whitelist),
                ],
            );
            Ok(Some(OutboundMail {
                to: req.recipient.clone(),
                from: ctx.config.sender.clone(),
                reply_to: ctx.config.sender.clone(),
                body: append_footer(ctx, body),
            }))
        }
        Command::Learn => {
            spool.begin_learning(&req.recipient)?;
            Ok(None)
        }
        Command::Allow => {
            store.add(&req.recipient, argument, Method::Allow)?;
            spool.end_learning(&req.recipient)?;
            Ok(None)
        }
        Command::Swallow => {
            store.add(&req.recipient, argument, Method::Swallow)?;
            Ok(None)
        }
        Command::Deny => {
            store.remove(&req.recipient, argument)?;
            spool.end_learning(&req.recipient)?;
            Ok(None)
        }
    }
}

/// Builds the advisory mail sent to a recipient in learning mode upon
/// seeing a new sender: the allow-advisory offers to allow-list the
/// sender's domain, the deny-advisory offers to remove it.
pub fn build_learning_advisory(
    ctx: &RuntimeContext,
    req: &ParsedRequest,
    decision: ListDecision,
) -> OutboundMail {
    let (template, verb) = match decision {
        ListDecision::Deny => (&ctx.messages.allow_advisory, "allow"),
        ListDecision::Allow | ListDecision::Swallow => (&ctx.messages.deny_advisory, "deny"),
    };
    let reply_to = command_address(&req.recipient, verb, &req.sender_domain);
    let body = render(
        template,
        &[
            ("recipient", &req.recipient),
            ("sender", &req.sender),
            ("sender_domain", &req.sender_domain),
        ],
    );
    OutboundMail {
        to: req.recipient.clone(),
        from: ctx.config.sender.clone(),
        reply_to,
        body: append_footer(ctx, body),
    }
}
