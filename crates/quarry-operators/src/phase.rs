//! Execution phases used for per-operator timing and request phase counts.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Between construction and first run.
    Instantiate,
    Exec,
    /// Waiting on an external service (datastore, indexer).
    Serv,
    Sort,
    Idle,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Instantiate,
        Phase::Exec,
        Phase::Serv,
        Phase::Sort,
        Phase::Idle,
    ];

    pub const fn index(self) -> usize {
        match self {
            Phase::Instantiate => 0,
            Phase::Exec => 1,
            Phase::Serv => 2,
            Phase::Sort => 3,
            Phase::Idle => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Phase::Instantiate => "instantiate",
            Phase::Exec => "exec",
            Phase::Serv => "serv",
            Phase::Sort => "sort",
            Phase::Idle => "idle",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
