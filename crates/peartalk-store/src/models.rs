//! Result types returned by store operations.

/// Outcome of [`crate::Database::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Primary key assigned to the message.
    pub key: String,
    /// Number of secondary index writes that failed. The primary record is
    /// stored regardless; missing entries are restored by the next repair.
    pub index_faults: usize,
}

/// Outcome of [`crate::Database::repair_indexes`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Index entries added for primary records that lacked them.
    pub restored: usize,
    /// Index entries removed because they were dangling or disagreed with
    /// their primary record.
    pub removed: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.restored == 0 && self.removed == 0
    }
}
