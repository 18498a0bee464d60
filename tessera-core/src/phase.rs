//! Scenario phases

use serde::{Deserialize, Serialize};
use std::fmt;

/// One phase of an authorization scenario. Phases always run in the order of
/// [`Phase::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Privileged setup (`prepare.json`)
    Prepare,
    /// Queries that must return results (`yes.json`)
    YesQuery,
    /// Queries that must return nothing (`no.json`)
    NoQuery,
    /// Transactions that must commit cleanly (`tyes.json`)
    YesTransaction,
    /// Transactions that must be rejected (`tno.json`)
    NoTransaction,
    /// Privileged teardown (`clean.json`)
    Cleanup,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Prepare,
        Phase::YesQuery,
        Phase::NoQuery,
        Phase::YesTransaction,
        Phase::NoTransaction,
        Phase::Cleanup,
    ];

    /// File holding this phase's entries inside a scenario directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Phase::Prepare => "prepare.json",
            Phase::YesQuery => "yes.json",
            Phase::NoQuery => "no.json",
            Phase::YesTransaction => "tyes.json",
            Phase::NoTransaction => "tno.json",
            Phase::Cleanup => "clean.json",
        }
    }

    /// Role-table key naming the roles for this phase. Privileged phases have none.
    pub fn role_set(self) -> Option<&'static str> {
        match self {
            Phase::YesQuery => Some("yes"),
            Phase::NoQuery => Some("no"),
            Phase::YesTransaction => Some("tyes"),
            Phase::NoTransaction => Some("tno"),
            Phase::Prepare | Phase::Cleanup => None,
        }
    }

    pub fn expects_success(self) -> bool {
        !matches!(self, Phase::NoQuery | Phase::NoTransaction)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "prepare",
            Phase::YesQuery => "yes-query",
            Phase::NoQuery => "no-query",
            Phase::YesTransaction => "yes-transaction",
            Phase::NoTransaction => "no-transaction",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}
