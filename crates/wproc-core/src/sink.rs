//! Check-result sink abstraction.
//!
//! What happens to a finished check — state machines, flapping,
//! freshness, perfdata — is the host's concern. The result handler
//! builds a [`CheckResult`] from the wire frame and hands it over here,
//! exactly once per completed CHECK job.

use crate::job::CheckResult;

pub trait CheckResultSink {
    /// Consume one completed check. Called from the master thread; must
    /// not block.
    fn process_check_result(&mut self, cr: CheckResult);
}
