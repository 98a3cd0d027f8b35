//! Nested transactions over the single connection
//!
//! Frames nest freely. The frame that takes the depth from 0 to 1 is the
//! owner: it alone issues `BEGIN`/`COMMIT`/`ROLLBACK`. Every frame puts its
//! target's loading/saving flags back when it ends, so they mark only the
//! frames currently on the stack. Clearing `modified` waits for the owner's
//! commit and is skipped for targets mutated after their frame finished.

use super::query::handle_error;
use super::Storage;
use crate::storable::{StorableMeta, StorableRef};
use crate::{Result, StorageError};
use std::cell::{Cell, RefCell};
use std::ops::BitOr;
use tracing::{debug, warn};

/// What a transaction frame does to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode(u8);

impl Mode {
    /// Target is being loaded; setters leave it unmodified
    pub const READ: Mode = Mode(1);
    /// Target is being saved; the owner opens a database transaction
    pub const WRITE: Mode = Mode(2);
    /// Clear the target's modified flag on a successful commit
    pub const MODIFIED: Mode = Mode(4);

    pub fn contains(self, other: Mode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Mode {
    type Output = Mode;

    fn bitor(self, rhs: Mode) -> Mode {
        Mode(self.0 | rhs.0)
    }
}

/// Work left to the owner for one finished or open frame
struct Pending {
    target: StorableRef,
    mode: Mode,
    snapshot: StorableMeta,
    /// Mutation count when the frame committed; `None` while open or dropped
    written: Option<u64>,
}

/// Transaction state shared by every frame opened on one `Storage`.
#[derive(Default)]
pub(crate) struct TxnContext {
    depth: Cell<u32>,
    writing: Cell<bool>,
    poisoned: Cell<bool>,
    pending: RefCell<Vec<Pending>>,
}

impl TxnContext {
    pub(crate) fn depth(&self) -> u32 {
        self.depth.get()
    }

    fn reset(&self) -> Vec<Pending> {
        self.depth.set(0);
        self.writing.set(false);
        self.poisoned.set(false);
        std::mem::take(&mut *self.pending.borrow_mut())
    }
}

/// The target of one frame and the flags it had before the frame opened
struct Target {
    object: StorableRef,
    loading: bool,
    saving: bool,
    slot: usize,
}

/// One frame of a possibly nested transaction.
///
/// Call [`Transaction::commit`] only once the guarded work fully succeeded;
/// dropping an owner without committing rolls everything back.
pub struct Transaction<'a> {
    root: &'a Storage,
    mode: Mode,
    owner: bool,
    finished: bool,
    target: Option<Target>,
}

impl<'a> Transaction<'a> {
    pub fn new(root: &'a Storage, mode: Mode, target: Option<StorableRef>) -> Result<Self> {
        let ctx = root.txn();
        let owner = ctx.depth.get() == 0;

        if owner && mode.contains(Mode::WRITE) {
            root.connection()?
                .execute_batch("BEGIN")
                .map_err(|e| handle_error("Transaction::new", "BEGIN", &[], e))?;
            ctx.writing.set(true);
        }
        ctx.depth.set(ctx.depth.get() + 1);

        let target = target.map(|object| {
            let snapshot = {
                let mut guard = object.borrow_mut();
                let snapshot = guard.meta().clone();
                let meta = guard.meta_mut();
                if mode.contains(Mode::WRITE) {
                    meta.saving = true;
                } else if mode.contains(Mode::READ) {
                    meta.loading = true;
                }
                snapshot
            };
            let mut pending = ctx.pending.borrow_mut();
            pending.push(Pending {
                target: object.clone(),
                mode,
                snapshot: snapshot.clone(),
                written: None,
            });
            Target {
                object,
                loading: snapshot.loading,
                saving: snapshot.saving,
                slot: pending.len() - 1,
            }
        });

        debug!(depth = ctx.depth.get(), owner, ?mode, "transaction frame opened");
        Ok(Self {
            root,
            mode,
            owner,
            finished: false,
            target,
        })
    }

    /// Whether this frame performs the physical commit
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// Finish the frame. Only the owner commits the database transaction.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.release(true);
        if !self.owner {
            return Ok(());
        }

        let ctx = self.root.txn();
        if ctx.poisoned.get() {
            warn!("nested write failed, rolling back");
            self.close(false);
            return Err(StorageError::Aborted);
        }

        if ctx.writing.get() {
            let committed = self
                .root
                .connection()
                .and_then(|conn| {
                    conn.execute_batch("COMMIT")
                        .map_err(|e| handle_error("Transaction::commit", "COMMIT", &[], e))
                });
            if let Err(e) = committed {
                self.close(false);
                return Err(e);
            }
        }

        self.close(true);
        Ok(())
    }

    /// Give the target its own flags back; a committed frame records the
    /// mutation count it wrote.
    fn release(&mut self, committed: bool) {
        let Some(target) = self.target.take() else {
            return;
        };
        let Ok(mut object) = target.object.try_borrow_mut() else {
            warn!("transaction target still borrowed, flags left as is");
            return;
        };
        let meta = object.meta_mut();
        meta.loading = target.loading;
        meta.saving = target.saving;
        if committed {
            if let Some(pending) = self.root.txn().pending.borrow_mut().get_mut(target.slot) {
                pending.written = Some(meta.mutations);
            }
        }
    }

    fn close(&self, committed: bool) {
        let ctx = self.root.txn();
        if !committed && ctx.writing.get() {
            match self.root.connection() {
                Ok(conn) => {
                    if let Err(e) = conn.execute_batch("ROLLBACK") {
                        warn!(error = %e, "rollback failed");
                    }
                }
                Err(e) => warn!(error = %e, "rollback without a connection"),
            }
        }

        for pending in ctx.reset().into_iter().rev() {
            let Ok(mut object) = pending.target.try_borrow_mut() else {
                warn!("transaction target still borrowed, modified flag left as is");
                continue;
            };
            let meta = object.meta_mut();
            if committed {
                let unchanged = pending.written == Some(meta.mutations);
                if unchanged && pending.mode.contains(Mode::MODIFIED) {
                    meta.modified = false;
                }
            } else if pending.mode.contains(Mode::WRITE) {
                let mutations = meta.mutations;
                *meta = StorableMeta {
                    loading: meta.loading,
                    saving: meta.saving,
                    mutations,
                    modified: pending.snapshot.modified || mutations != pending.snapshot.mutations,
                    ..pending.snapshot
                };
            }
        }

        debug!(committed, "transaction closed");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.release(false);
        }
        let ctx = self.root.txn();
        if !self.owner {
            ctx.depth.set(ctx.depth.get().saturating_sub(1));
            if !self.finished && self.mode.contains(Mode::WRITE) {
                ctx.poisoned.set(true);
            }
            return;
        }
        if ctx.depth.get() > 0 {
            self.close(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storable::Storable;

    #[test]
    fn test_mode_flags() {
        let mode = Mode::WRITE | Mode::MODIFIED;
        assert!(mode.contains(Mode::WRITE));
        assert!(mode.contains(Mode::MODIFIED));
        assert!(!mode.contains(Mode::READ));
    }

    #[test]
    fn test_depth_and_owner() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.transaction_depth(), 0);

        let outer = Transaction::new(&storage, Mode::WRITE, None).unwrap();
        assert!(outer.is_owner());
        {
            let inner = Transaction::new(&storage, Mode::WRITE, None).unwrap();
            assert!(!inner.is_owner());
            assert_eq!(storage.transaction_depth(), 2);
            inner.commit().unwrap();
        }
        assert_eq!(storage.transaction_depth(), 1);
        outer.commit().unwrap();
        assert_eq!(storage.transaction_depth(), 0);
    }

    #[test]
    fn test_drop_rolls_back() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.connection().unwrap();
        conn.execute_batch("CREATE TABLE scratch (n INTEGER)").unwrap();

        {
            let _txn = Transaction::new(&storage, Mode::WRITE, None).unwrap();
            conn.execute("INSERT INTO scratch (n) VALUES (1)", []).unwrap();
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scratch", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(storage.transaction_depth(), 0);
    }

    #[test]
    fn test_failed_nested_write_aborts_owner() {
        let storage = Storage::open_in_memory().unwrap();
        let conn = storage.connection().unwrap();
        conn.execute_batch("CREATE TABLE scratch (n INTEGER)").unwrap();

        let outer = Transaction::new(&storage, Mode::WRITE, None).unwrap();
        conn.execute("INSERT INTO scratch (n) VALUES (1)", []).unwrap();
        {
            let _inner = Transaction::new(&storage, Mode::WRITE, None).unwrap();
        }
        assert!(matches!(outer.commit(), Err(StorageError::Aborted)));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM scratch", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_flags_restored_on_commit() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        element.set_name("draft");
        assert!(element.is_modified());

        let txn = Transaction::new(
            &storage,
            Mode::WRITE | Mode::MODIFIED,
            Some(element.as_storable()),
        )
        .unwrap();
        assert!(element.borrow().is_saving());
        txn.commit().unwrap();

        assert!(!element.borrow().is_saving());
        assert!(!element.is_modified());
    }

    #[test]
    fn test_nested_frame_restores_its_own_flags() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();

        let outer = Transaction::new(&storage, Mode::WRITE, None).unwrap();
        let inner = Transaction::new(&storage, Mode::READ, Some(element.as_storable())).unwrap();
        assert!(element.borrow().is_loading());
        inner.commit().unwrap();
        assert!(!element.borrow().is_loading());

        element.set_name("draft");
        assert!(element.is_modified());
        outer.commit().unwrap();
    }

    #[test]
    fn test_mutation_after_frame_keeps_modified() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        element.set_name("draft");

        let outer = Transaction::new(&storage, Mode::WRITE, None).unwrap();
        let inner = Transaction::new(
            &storage,
            Mode::WRITE | Mode::MODIFIED,
            Some(element.as_storable()),
        )
        .unwrap();
        inner.commit().unwrap();
        assert!(!element.borrow().is_saving());
        element.set_name("final");
        outer.commit().unwrap();

        assert!(element.is_modified());
    }

    #[test]
    fn test_rollback_keeps_later_edits_modified() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();

        {
            let _outer = Transaction::new(&storage, Mode::WRITE, None).unwrap();
            let inner = Transaction::new(
                &storage,
                Mode::WRITE | Mode::MODIFIED,
                Some(element.as_storable()),
            )
            .unwrap();
            element.borrow_mut().meta.id = 7;
            inner.commit().unwrap();
            element.set_name("draft");
        }

        assert_eq!(element.id(), 0);
        assert!(element.is_modified());
    }

    #[test]
    fn test_rollback_restores_meta() {
        let storage = Storage::open_in_memory().unwrap();
        let element = storage.element();
        element.set_name("draft");

        {
            let _txn =
                Transaction::new(&storage, Mode::WRITE, Some(element.as_storable())).unwrap();
            element.borrow_mut().meta.id = 99;
            element.borrow_mut().meta.version = 3;
        }

        assert_eq!(element.id(), 0);
        assert_eq!(element.version(), 0);
        assert!(element.is_modified());
        assert!(!element.borrow().is_saving());
    }
}
