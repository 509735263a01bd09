//! Service lifecycle states.

/// Externally observable lifecycle of a service.
///
/// ```text
/// Created ──open()──▶ Opening ──bound──▶ Open ──quit()──▶ Quitting ──▶ Closed
///    ▲                   │
///    └──── bind failure ─┘
/// ```
///
/// Closed is terminal; a closed service never serves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, nothing bound.
    Created,
    /// open() accepted, binding in progress.
    Opening,
    /// Bound and accepting requests.
    Open,
    /// quit() accepted, draining in-flight requests.
    Quitting,
    /// Fully stopped.
    Closed,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Closed)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lifecycle::Created => "created",
            Lifecycle::Opening => "opening",
            Lifecycle::Open => "open",
            Lifecycle::Quitting => "quitting",
            Lifecycle::Closed => "closed",
        };
        f.write_str(name)
    }
}
