use std::fmt;

/// The verb a policy service hands back to Postfix for one query.
///
/// See `access`(5) and the `SMTPD_POLICY_README` for the full verb set;
/// postwhite only ever emits these four.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No opinion; Postfix should consult the next policy service (or its
    /// built-in restrictions).
    Dunno(Option<String>),
    /// Accept the message.
    Ok(Option<String>),
    /// Reject the message with the attached human-readable reason.
    Reject(String),
    /// Accept at the SMTP level but silently drop the message.
    Discard(String),
}

impl Action {
    pub fn dunno(msg: impl Into<String>) -> Self {
        Action::Dunno(Some(msg.into()))
    }

    pub fn reject(msg: impl Into<String>) -> Self {
        Action::Reject(msg.into())
    }

    pub fn discard(msg: impl Into<String>) -> Self {
        Action::Discard(msg.into())
    }

    /// Renders the exact response bytes Postfix expects, including the
    /// trailing blank line that terminates the response block.
    pub fn to_response(&self) -> Vec<u8> {
        let (verb, msg): (&str, Option<&str>) = match self {
            Action::Dunno(m) => ("DUNNO", m.as_deref()),
            Action::Ok(m) => ("OK", m.as_deref()),
            Action::Reject(m) => ("REJECT", Some(m.as_str())),
            Action::Discard(m) => ("DISCARD", Some(m.as_str())),
        };
        let mut line = format!("action={}", verb);
        if let Some(msg) = msg {
            if !msg.is_empty() {
                line.push(' ');
                line.push_str(msg);
            }
        }
        line.push('\n');
        line.push('\n');
        line.into_bytes()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_response()).trim())
    }
}
