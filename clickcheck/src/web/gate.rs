//! Host routing gate.
//!
//! This is a cheap filter for stray traffic, not an access control.

/// Decides whether a request's Host is one the receiver answers for.
pub trait HostGate: Send + Sync {
    fn accepts(&self, host: &str) -> bool;
}

/// Accepts hosts starting with a fixed prefix.
#[derive(Debug, Clone)]
pub struct PrefixGate {
    prefix: String,
}

impl PrefixGate {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for PrefixGate {
    fn default() -> Self {
        Self::new("click")
    }
}

impl HostGate for PrefixGate {
    fn accepts(&self, host: &str) -> bool {
        host.starts_with(&self.prefix)
    }
}

impl<F> HostGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accepts(&self, host: &str) -> bool {
        self(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_gate_default() {
        let gate = PrefixGate::default();
        assert!(gate.accepts("click.example.com"));
        assert!(gate.accepts("clicktrack.example.com:8080"));
        assert!(!gate.accepts("other.example.com"));
        assert!(!gate.accepts(""));
    }

    #[test]
    fn test_prefix_gate_custom() {
        let gate = PrefixGate::new("track");
        assert!(gate.accepts("track.example.com"));
        assert!(!gate.accepts("click.example.com"));
    }

    #[test]
    fn test_closure_gate() {
        let gate = |host: &str| host.ends_with(".test");
        assert!(gate.accepts("anything.test"));
        assert!(!gate.accepts("click.example.com"));
    }
}
