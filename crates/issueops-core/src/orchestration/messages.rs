//! Markdown bodies of the comments posted back to the pull request.

use crate::lock::{LockRecord, LockScope};

fn describe(record: &LockRecord) -> String {
    let mut text = format!(
        "- __Holder__: `{}`\n- __Environment__: `{}`\n- __Global__: `{}`\n- __Sticky__: `{}`\n- __Created__: `{}`",
        record.holder,
        record.environment,
        record.global,
        record.sticky,
        record.created_at.to_rfc3339()
    );
    if let Some(reason) = &record.reason {
        text.push_str(&format!("\n- __Reason__: `{}`", reason));
    }
    if let Some(link) = &record.link {
        text.push_str(&format!("\n- __Link__: {}", link));
    }
    text
}

pub fn lock_claimed(record: &LockRecord, fresh: bool) -> String {
    let heading = if fresh {
        "### 🔒 Deployment Lock Claimed"
    } else {
        "### 🔒 Deployment Lock Already Claimed"
    };
    let scope = if record.global {
        "all environments".to_string()
    } else {
        format!("the `{}` environment", record.environment)
    };
    format!(
        "{}\n\n__{}__ holds the lock for {}.\n\n{}",
        heading,
        record.holder,
        scope,
        describe(record)
    )
}

pub fn lock_conflict(existing: &LockRecord, requested: &LockScope) -> String {
    format!(
        "### ⚠️ Cannot claim deployment lock\n\nSorry, `{}` is locked by __{}__ and the lock covers `{}`.\n\n{}",
        existing.scope(),
        existing.holder,
        requested,
        describe(existing)
    )
}

pub fn lock_lost(requested: &LockScope) -> String {
    format!(
        "### ⚠️ Cannot claim deployment lock\n\nSorry, another run claimed the `{}` lock at the same time.",
        requested
    )
}

pub fn lock_released(record: &LockRecord) -> String {
    format!(
        "### 🔓 Deployment Lock Removed\n\nThe `{}` lock held by __{}__ has been released.",
        record.scope(),
        record.holder
    )
}

pub fn lock_not_held(scope: &LockScope) -> String {
    format!(
        "### 🔓 Deployment Lock Removed\n\nThere is no `{}` lock to release.",
        scope
    )
}

pub fn release_forbidden(record: &LockRecord) -> String {
    format!(
        "### ⚠️ Cannot remove deployment lock\n\nThe `{}` lock is a sticky lock held by __{}__. Only the holder can remove it, or use `--force`.\n\n{}",
        record.scope(),
        record.holder,
        describe(record)
    )
}

pub fn lock_info(scope: &LockScope, record: Option<&LockRecord>) -> String {
    match record {
        Some(record) => format!("### 🔒 Lock Details\n\n{}", describe(record)),
        None => format!("### 🔓 No Lock\n\n`{}` is not locked.", scope),
    }
}

pub fn deployment_started(environment: &str, git_ref: &str, noop: bool, actor: &str) -> String {
    let mode = if noop { "noop deployment" } else { "deployment" };
    format!(
        "### Deployment Triggered 🚀\n\n__{}__, started a __{}__ of `{}` to __{}__",
        actor, mode, git_ref, environment
    )
}

pub fn stale_branch(git_ref: &str, message: &str) -> String {
    format!(
        "### ⚠️ Deployment Warning\n\n`{}` was out of date and GitHub updated it: {}\n\nRun your command again once the branch's checks have passed.",
        git_ref, message
    )
}
