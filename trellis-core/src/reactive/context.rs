//! Reactive Context
//!
//! The reactive context tracks which effect is currently running. This
//! enables automatic dependency tracking: when a reactive property is read,
//! the current effect is registered as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running an effect pushes its subscriber ID;
//! the guard returned by [`ReactiveContext::enter`] pops it on drop, which
//! also happens while unwinding from a panicking effect body.
//!
//! Entries can be empty. [`ReactiveContext::untracked`] pushes an empty entry
//! so reads inside it register nothing, and disposing a running effect blanks
//! its entry so the rest of its body stops tracking.

use std::cell::RefCell;

use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone, Copy)]
struct ContextEntry {
    /// The effect this entry was pushed for, if any.
    owner: Option<SubscriberId>,
    /// The effect reads are attributed to. Cleared when the owner is
    /// disposed mid-run.
    subscriber: Option<SubscriberId>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    owner: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    /// Enter a context in which reads are not tracked.
    pub fn untracked() -> Self {
        Self::push(None)
    }

    fn push(owner: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                owner,
                subscriber: owner,
            });
        });

        Self { owner }
    }

    /// Check if reads are currently being attributed to an effect.
    pub fn is_active() -> bool {
        Self::current_subscriber().is_some()
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber))
            .ok()
            .flatten()
    }

    /// Check whether `subscriber_id` is anywhere on the stack.
    pub fn is_running(subscriber_id: SubscriberId) -> bool {
        CONTEXT_STACK
            .try_with(|stack| {
                stack
                    .borrow()
                    .iter()
                    .any(|entry| entry.owner == Some(subscriber_id))
            })
            .unwrap_or(false)
    }

    /// Stop attributing reads to `subscriber_id` for the rest of its run.
    ///
    /// The entries stay on the stack so the guards still pop in order.
    pub fn detach(subscriber_id: SubscriberId) {
        let _ = CONTEXT_STACK.try_with(|stack| {
            for entry in stack.borrow_mut().iter_mut() {
                if entry.subscriber == Some(subscriber_id) {
                    entry.subscriber = None;
                }
            }
        });
    }

    /// Current stack depth.
    pub fn depth() -> usize {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().len())
            .unwrap_or(0)
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.owner, self.owner,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.owner, entry.owner
                );
            }
        });
    }
}
