//! Before/after hooks wrapped around collection operations.
//!
//! Hooks extend a [`crate::Collection`] by composition: each one is registered
//! for an [`Action`] and runs around the storage call of every operation
//! performing that action.
//!
//! - Before-hooks see the caller's input record of `create_record`,
//!   `update_record` and `delete_record` and may modify it or abort the call.
//! - After-hooks see every record an operation returns (each record of a
//!   page, each tombstone of a bulk delete) and may transform it.

use crate::{error::Result, Error, Record};
use std::fmt;
use std::sync::Arc;

/// Kind of operation a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// What a hook is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookContext<'a> {
    pub action: Action,
    pub resource_name: &'a str,
    /// Parent id resolved for this call
    pub parent_id: &'a str,
}

pub type BeforeHook = Arc<dyn Fn(&HookContext<'_>, &mut Record) -> Result<()> + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(&HookContext<'_>, Record) -> Result<Record> + Send + Sync>;

/// Ordered sets of before and after hooks.
#[derive(Clone, Default)]
pub struct Hooks {
    before: Vec<(Action, BeforeHook)>,
    after: Vec<(Action, AfterHook)>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook running on the input record before storage is called.
    pub fn before<F>(mut self, action: Action, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>, &mut Record) -> Result<()> + Send + Sync + 'static,
    {
        self.before.push((action, Arc::new(hook)));
        self
    }

    /// Register a hook running on each record returned by storage.
    ///
    /// For writes, storage has already committed when the hook runs. An
    /// error from the hook is returned to the caller but does not roll the
    /// write back.
    pub fn after<F>(mut self, action: Action, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>, Record) -> Result<Record> + Send + Sync + 'static,
    {
        self.after.push((action, Arc::new(hook)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }

    pub(crate) fn run_before(&self, ctx: &HookContext<'_>, record: &mut Record) -> Result<()> {
        for (_, hook) in self.before.iter().filter(|(a, _)| *a == ctx.action) {
            hook(ctx, record).map_err(|err| hook_failure(ctx, "before", err))?;
        }
        Ok(())
    }

    pub(crate) fn run_after(&self, ctx: &HookContext<'_>, record: Record) -> Result<Record> {
        self.after
            .iter()
            .filter(|(a, _)| *a == ctx.action)
            .try_fold(record, |record, (_, hook)| {
                hook(ctx, record).map_err(|err| hook_failure(ctx, "after", err))
            })
    }

    pub(crate) fn run_after_all(
        &self,
        ctx: &HookContext<'_>,
        records: Vec<Record>,
    ) -> Result<Vec<Record>> {
        if !self.after.iter().any(|(a, _)| *a == ctx.action) {
            return Ok(records);
        }
        records
            .into_iter()
            .map(|record| self.run_after(ctx, record))
            .collect()
    }
}

/// Log a failing hook. The error is the hook's own and passes through as is.
fn hook_failure(ctx: &HookContext<'_>, stage: &str, err: Error) -> Error {
    tracing::warn!(
        resource = ctx.resource_name,
        parent_id = ctx.parent_id,
        action = %ctx.action,
        stage,
        error = %err,
        "hook failed"
    );
    err
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}
