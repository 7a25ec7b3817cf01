/// A connection's transaction state (spec §4.5): `Idle` outside any
/// transaction (autocommit), `InTransaction` between `begin` and the
/// matching `commit`/`rollback`. Transitions are the only legal moves;
/// anything else is a programmer error caught by the wrapper, not a state
/// the machine itself needs to reject defensively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    InTransaction,
}

/// Tracks one connection's transaction lifecycle across the statements in
/// a transactional wrapper scope (spec §4.5). A connection checked out of
/// the pool always starts `Idle`; [`TransactionManager`] only exists for
/// the duration of one `with_transaction` call.
pub struct TransactionManager {
    state: TransactionState,
    statement_count: u32,
    /// The connection's autocommit setting as it stood the moment `begin`
    /// opened this transaction, so it can be put back exactly where it was
    /// regardless of whether the transaction ends in commit or rollback.
    /// Always clears the saved auto-commit value on termination.
    saved_autocommit: Option<bool>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self { state: TransactionState::Idle, statement_count: 0, saved_autocommit: None }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn begin(&mut self, current_autocommit: bool) {
        debug_assert_eq!(self.state, TransactionState::Idle, "begin called while already in a transaction");
        self.state = TransactionState::InTransaction;
        self.statement_count = 0;
        self.saved_autocommit = Some(current_autocommit);
    }

    pub fn record_statement(&mut self) {
        self.statement_count += 1;
    }

    pub fn statement_count(&self) -> u32 {
        self.statement_count
    }

    pub fn saved_autocommit(&self) -> Option<bool> {
        self.saved_autocommit
    }

    pub fn commit(&mut self) {
        self.state = TransactionState::Idle;
        self.saved_autocommit = None;
    }

    pub fn rollback(&mut self) {
        self.state = TransactionState::Idle;
        self.saved_autocommit = None;
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::InTransaction
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begins_idle_and_tracks_statements() {
        let mut txn = TransactionManager::new();
        assert_eq!(txn.state(), TransactionState::Idle);
        txn.begin(true);
        txn.record_statement();
        txn.record_statement();
        assert_eq!(txn.statement_count(), 2);
        assert!(txn.is_active());
    }

    #[test]
    fn commit_and_rollback_both_return_to_idle() {
        let mut txn = TransactionManager::new();
        txn.begin(true);
        txn.commit();
        assert_eq!(txn.state(), TransactionState::Idle);

        txn.begin(true);
        txn.rollback();
        assert_eq!(txn.state(), TransactionState::Idle);
    }

    #[test]
    fn begin_saves_autocommit_and_commit_clears_it() {
        let mut txn = TransactionManager::new();
        txn.begin(false);
        assert_eq!(txn.saved_autocommit(), Some(false));
        txn.commit();
        assert_eq!(txn.saved_autocommit(), None);

        txn.begin(true);
        assert_eq!(txn.saved_autocommit(), Some(true));
        txn.rollback();
        assert_eq!(txn.saved_autocommit(), None);
    }
}
