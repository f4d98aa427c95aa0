/// # Example policy delegation exchange
///
/// S: <accepts TCP connection on the configured host:port>
/// C: request=smtpd_access_policy
/// C: client_address=203.0.113.5
/// C: client_name=unknown
/// C: sender=marvin@sirius.tld
/// C: recipient=hitchhike@dent.tld
/// C: sasl_username=
/// C: instance=7fcb.5f1a2b3c.1
/// C: <empty line>
/// S: action=DUNNO
/// S: <empty line>
/// C: <closes connection>
pub use action::Action;
pub use raw::{read_raw_request, RawRequest};

mod action;
mod raw;
