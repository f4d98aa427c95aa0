use postwhite_proto::Action;

use crate::command::{self, OutboundMail};
use crate::context::RuntimeContext;
use crate::error::PostwhiteError;
use crate::request::ParsedRequest;
use crate::spool::LearningSpool;
use crate::store::{AllowListStore, ListDecision};

/// What the Policy Server should tell Postfix, plus anything the Command
/// Executor / Mail Builder produced along the way.
pub struct Outcome {
    pub action: Action,
    pub mail: Option<OutboundMail>,
}

impl Outcome {
    fn plain(action: Action) -> Self {
        Outcome { action, mail: None }
    }
}

/// Runs the decision table against one parsed request.
///
/// Any unexpected failure along the way (store/spool I/O, mostly) is caught
/// here and converted to `DUNNO "daemon error"`: the daemon is advisory and
/// must never block mail delivery on an internal bug.
pub fn decide(
    ctx: &RuntimeContext,
    store: &AllowListStore,
    spool: &LearningSpool,
    req: &ParsedRequest,
) -> Outcome {
    match try_decide(ctx, store, spool, req) {
        Ok(outcome) => outcome,
        Err(err) => {
            log::warn!("decision failed, failing open to DUNNO: {}", err);
            Outcome::plain(Action::dunno("daemon error"))
        }
    }
}

fn try_decide(
    ctx: &RuntimeContext,
    store: &AllowListStore,
    spool: &LearningSpool,
    req: &ParsedRequest,
) -> Result<Outcome, PostwhiteError> {
    // 1. Loopback bypass: the daemon itself and local submission are never
    // blocked.
    if is_loopback(&req.client_address) {
        return Ok(Outcome::plain(Action::dunno(
            "not a whitelist protected recipient",
        )));
    }

    // 2. Recipients we have no opinion about.
    if !ctx.recipients.contains(&req.recipient) {
        return Ok(Outcome::plain(Action::Dunno(None)));
    }

    // 3. Command messages.
    if let Some((verb, argument)) = &req.command {
        if !is_authorized(ctx, req) {
            return Ok(Outcome::plain(Action::reject("authorization failed")));
        }
        let mail = command::execute(ctx, store, spool, req, *verb, argument)?;
        return Ok(Outcome {
            action: Action::discard("executing command"),
            mail,
        });
    }

    // 4. Learning mode.
    if spool.is_learning(&req.recipient)? {
        let list_decision = store.query(&req.recipient, &req.sender, &req.sender_domain)?;
        let mail = command::build_learning_advisory(ctx, req, list_decision);
        return Ok(Outcome {
            action: Action::Ok(Some("learning mode".to_string())),
            mail: Some(mail),
        });
    }

    // 5. Plain allow-list lookup.
    let list_decision = store.query(&req.recipient, &req.sender, &req.sender_domain)?;
    let action = match list_decision {
        ListDecision::Swallow => Action::discard("found on whitelist with SWALLOW"),
        ListDecision::Allow => Action::dunno("found on whitelist with ALLOW"),
        ListDecision::Deny => Action::reject(ctx.config.reject_message.clone()),
    };
    Ok(Outcome::plain(action))
}

fn is_loopback(client_address: &str) -> bool {
    matches!(client_address, "127.0.0.1" | "::1")
}

/// A command is authorized iff the sender is itself a registered recipient,
/// the sender equals the (suffix-stripped) recipient, and SASL enforcement
/// is either disabled or satisfied by the MTA-supplied identity.
fn is_authorized(ctx: &RuntimeContext, req: &ParsedRequest) -> bool {
    if !ctx.recipients.contains(&req.sender) {
        return false;
    }
    if req.sender != req.recipient {
        return false;
    }
    if ctx.config.require_sasl {
        match ctx.recipients.expected_sasl(&req.sender) {
            Some(expected) => expected == req.sasl_username,
            None => false,
        }
    } else {
        true
    }
}
