use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, ResultEntry, Scope, SearchEntry};
use tokio::time::Instant;
use tracing::debug;

use crate::types::{ErrorKind, ProbeError, ProbeOutcome};

/// Bind result codes that count as a clean rejection of the anonymous bind
/// rather than a protocol problem: strongerAuthRequired(8),
/// inappropriateAuthentication(48), invalidCredentials(49),
/// insufficientAccessRights(50), unwillingToPerform(53).
const DENIED_RESULT_CODES: &[u32] = &[8, 48, 49, 50, 53];

/// One anonymous-bind attempt against one server. Implementations must never
/// return an error: every failure mode is folded into `ProbeOutcome::Failed`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &str) -> ProbeOutcome;
}

/// Real prober over the `ldap3` async client.
pub struct LdapProber {
    port: u16,
    use_tls: bool,
    timeout: Duration,
}

enum BindVerdict {
    Accepted(String),
    Rejected(u32),
    Unexpected(u32, String),
}

impl LdapProber {
    pub fn new(port: u16, use_tls: bool, timeout: Duration) -> Self {
        Self {
            port,
            use_tls,
            timeout,
        }
    }

    fn url(&self, target: &str) -> String {
        let scheme = if self.use_tls { "ldaps" } else { "ldap" };
        format!("{scheme}://{target}:{}", self.port)
    }

    async fn attempt(&self, target: &str) -> Result<BindVerdict, LdapError> {
        let url = self.url(target);
        debug!(url = %url, "connecting");

        // Invalid certificates are accepted: the question being answered is
        // the server's bind posture, which a self-signed cert would otherwise
        // mask behind a transport failure.
        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_no_tls_verify(true);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                debug!(error = %e, "connection driver ended with error");
            }
        });

        let result = ldap.with_timeout(self.timeout).simple_bind("", "").await?;
        let verdict = match result.rc {
            0 => BindVerdict::Accepted(self.read_root_dse(&mut ldap).await),
            rc if DENIED_RESULT_CODES.contains(&rc) => BindVerdict::Rejected(rc),
            rc => BindVerdict::Unexpected(rc, result.text),
        };

        let _ = ldap.unbind().await;
        Ok(verdict)
    }

    /// Fetch the RootDSE over the already-bound session. A failure here does
    /// not demote the bind verdict; it just leaves the metadata empty.
    async fn read_root_dse(&self, ldap: &mut Ldap) -> String {
        let search = ldap
            .with_timeout(self.timeout)
            .search("", Scope::Base, "(objectClass=*)", vec!["*", "+"])
            .await
            .and_then(|res| res.success());
        match search {
            Ok((entries, _)) => format_root_dse(entries),
            Err(e) => {
                debug!(error = %e, "RootDSE read failed after successful bind");
                String::new()
            }
        }
    }
}

#[async_trait]
impl Prober for LdapProber {
    async fn probe(&self, target: &str) -> ProbeOutcome {
        let start = Instant::now();
        match self.attempt(target).await {
            Ok(BindVerdict::Accepted(metadata)) => ProbeOutcome::Authorized {
                metadata,
                elapsed: start.elapsed(),
            },
            Ok(BindVerdict::Rejected(rc)) => {
                debug!(host = target, rc, "anonymous bind rejected");
                ProbeOutcome::Denied {
                    elapsed: start.elapsed(),
                }
            }
            Ok(BindVerdict::Unexpected(rc, text)) => ProbeOutcome::Failed {
                error: ProbeError::new(
                    ErrorKind::Protocol,
                    format!("unexpected bind result {rc}: {text}"),
                ),
                elapsed: start.elapsed(),
            },
            Err(e) => ProbeOutcome::Failed {
                error: ProbeError::new(ErrorKind::classify(&e.to_string()), e.to_string()),
                elapsed: start.elapsed(),
            },
        }
    }
}

/// Render RootDSE entries as `attr: value` lines. Attributes are sorted so
/// the blob is stable for a given server, and binary attributes are reported
/// by size only.
fn format_root_dse(entries: Vec<ResultEntry>) -> String {
    let mut out = String::new();
    for entry in entries {
        let entry = SearchEntry::construct(entry);
        let mut attrs: Vec<_> = entry.attrs.iter().collect();
        attrs.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        for (name, values) in attrs {
            for value in values {
                out.push_str(name);
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
        }
        let mut bin_attrs: Vec<_> = entry.bin_attrs.iter().collect();
        bin_attrs.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        for (name, values) in bin_attrs {
            for value in values {
                out.push_str(name);
                out.push_str(&format!(": <{} bytes of binary data>\n", value.len()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_scheme_follows_tls_flag() {
        let plain = LdapProber::new(389, false, Duration::from_secs(1));
        assert_eq!(plain.url("dc01.example.com"), "ldap://dc01.example.com:389");
        let tls = LdapProber::new(636, true, Duration::from_secs(1));
        assert_eq!(tls.url("dc01.example.com"), "ldaps://dc01.example.com:636");
    }

    #[test]
    fn denied_codes_cover_anonymous_rejections() {
        for rc in [8, 48, 49, 50, 53] {
            assert!(DENIED_RESULT_CODES.contains(&rc));
        }
        assert!(!DENIED_RESULT_CODES.contains(&0));
        assert!(!DENIED_RESULT_CODES.contains(&2));
    }
}
