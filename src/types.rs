use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Classified result of one anonymous-bind attempt against a single server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server accepted the anonymous bind. `metadata` is the raw RootDSE
    /// text the server exposed (possibly empty).
    Authorized { metadata: String, elapsed: Duration },
    /// The server answered the bind with a clean rejection.
    Denied { elapsed: Duration },
    /// Connection, transport, or protocol trouble prevented a clean
    /// bind/deny determination.
    Failed { error: ProbeError, elapsed: Duration },
}

impl ProbeOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            ProbeOutcome::Authorized { elapsed, .. }
            | ProbeOutcome::Denied { elapsed }
            | ProbeOutcome::Failed { elapsed, .. } => *elapsed,
        }
    }

    pub fn is_authorized(&self) -> bool {
        matches!(self, ProbeOutcome::Authorized { .. })
    }
}

/// What went wrong during a failed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ProbeError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Host unreachable, DNS failure, refused or timed-out connection.
    Connection,
    /// TLS negotiation failure.
    Transport,
    /// Malformed or unexpected directory-protocol response.
    Protocol,
}

impl ErrorKind {
    /// Classify an `ldap3` error by its rendered message. The client does not
    /// expose a stable error taxonomy, so this keys on the wording of its
    /// display impls and of the underlying I/O and TLS errors.
    pub fn classify(message: &str) -> ErrorKind {
        let m = message.to_ascii_lowercase();
        if m.contains("tls") || m.contains("ssl") || m.contains("certificate") || m.contains("handshake") {
            ErrorKind::Transport
        } else if m.contains("i/o")
            || m.contains("connection")
            || m.contains("refused")
            || m.contains("unreachable")
            || m.contains("timed out")
            || m.contains("timeout")
            || m.contains("resolve")
        {
            ErrorKind::Connection
        } else {
            ErrorKind::Protocol
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Connection => "connection error",
            ErrorKind::Transport => "transport error",
            ErrorKind::Protocol => "protocol error",
        };
        f.write_str(s)
    }
}

/// Targets that accepted the anonymous bind, mapped to their RootDSE text.
/// Ordered map so output files and summaries are stable between runs.
pub type AggregateResult = BTreeMap<String, String>;

/// Wall-clock statistics for one dispatcher run.
#[derive(Debug, Clone)]
pub struct ScanStats {
    pub total_targets: usize,
    pub elapsed: Duration,
}

impl ScanStats {
    /// Targets per second over the whole run.
    pub fn rate(&self) -> f64 {
        self.total_targets as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
    }
}

/// Everything a sweep returns: the authorized map, run statistics, and the
/// targets without a recorded outcome. `unattempted` holds targets skipped
/// by cancellation; `aborted` holds targets of a crashed worker's shard,
/// whose outcomes (attempted or not) were lost with it.
#[derive(Debug, Clone)]
pub struct SweepResults {
    pub authorized: AggregateResult,
    pub stats: ScanStats,
    pub unattempted: Vec<String>,
    pub aborted: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_io_errors_as_connection() {
        let kind = ErrorKind::classify("I/O interaction error: Connection refused (os error 111)");
        assert_eq!(kind, ErrorKind::Connection);
        assert_eq!(ErrorKind::classify("operation timed out"), ErrorKind::Connection);
        assert_eq!(
            ErrorKind::classify("failed to resolve host ldap.internal"),
            ErrorKind::Connection
        );
    }

    #[test]
    fn classify_tls_errors_as_transport() {
        let kind = ErrorKind::classify("error performing TLS handshake: certificate verify failed");
        assert_eq!(kind, ErrorKind::Transport);
    }

    #[test]
    fn classify_everything_else_as_protocol() {
        assert_eq!(ErrorKind::classify("op send error"), ErrorKind::Protocol);
        assert_eq!(ErrorKind::classify("ASN.1 decoding error"), ErrorKind::Protocol);
    }

    #[test]
    fn rate_is_finite_for_zero_elapsed() {
        let stats = ScanStats {
            total_targets: 10,
            elapsed: Duration::ZERO,
        };
        assert!(stats.rate().is_finite());
    }
}
