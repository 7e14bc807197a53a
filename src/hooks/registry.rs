//! Ordered before/after hook lists.
//!
//! Calls never iterate the live lists: a chain run starts from a snapshot, so
//! hooks registered or removed while a call is in flight only affect calls
//! submitted afterwards.
use crate::errors::InterceptError;
use crate::hooks::hook::{AfterHook, BeforeHook, Channel, Hook};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct HookLists {
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
}

#[derive(Default)]
pub struct HookRegistry {
    lists: RwLock<HookLists>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lists = self.read();
        f.debug_struct("HookRegistry")
            .field("before", &lists.before.len())
            .field("after", &lists.after.len())
            .finish()
    }
}

fn insert_unique<T>(list: &mut Vec<T>, hook: T, position: Option<usize>, same: impl Fn(&T, &T) -> bool) -> bool {
    if list.iter().any(|h| same(h, &hook)) {
        return false;
    }
    let at = position.unwrap_or(list.len()).min(list.len());
    list.insert(at, hook);
    true
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HookLists> {
        self.lists.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HookLists> {
        self.lists.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts `hook` into `channel` at `position` (default: end, clamped to the list
    /// length). Registering a hook that is already present does nothing.
    ///
    /// Fails with [`InterceptError::InvalidHook`] when the hook kind does not belong
    /// to `channel`; nothing is registered in that case.
    pub fn register(
        &self,
        channel: Channel,
        hook: impl Into<Hook>,
        position: Option<usize>,
    ) -> Result<(), InterceptError> {
        let hook = hook.into();
        if hook.channel() != channel {
            return Err(InterceptError::InvalidHook(format!(
                "{} hook cannot be registered on the {} channel",
                hook.channel(),
                channel
            )));
        }

        let mut lists = self.write();
        let added = match hook {
            Hook::Before(h) => insert_unique(&mut lists.before, h, position, BeforeHook::same),
            Hook::After(h) => insert_unique(&mut lists.after, h, position, AfterHook::same),
        };
        if !added {
            log::debug!("{} hook already registered, ignoring", channel);
        }
        Ok(())
    }

    pub fn register_before(&self, hook: BeforeHook, position: Option<usize>) {
        insert_unique(&mut self.write().before, hook, position, BeforeHook::same);
    }

    pub fn register_after(&self, hook: AfterHook, position: Option<usize>) {
        insert_unique(&mut self.write().after, hook, position, AfterHook::same);
    }

    /// Removes hooks and returns how many were removed.
    ///
    /// - `channel` and `hook` given: removes that hook from the channel
    /// - only `channel` given: empties the channel
    /// - no `channel`: empties the whole registry
    pub fn unregister(&self, channel: Option<Channel>, hook: Option<&Hook>) -> usize {
        let mut lists = self.write();
        match (channel, hook) {
            (None, _) => {
                let n = lists.before.len() + lists.after.len();
                lists.before.clear();
                lists.after.clear();
                n
            }
            (Some(Channel::Before), None) => std::mem::take(&mut lists.before).len(),
            (Some(Channel::After), None) => std::mem::take(&mut lists.after).len(),
            (Some(Channel::Before), Some(Hook::Before(h))) => {
                let before = lists.before.len();
                lists.before.retain(|x| !x.same(h));
                before - lists.before.len()
            }
            (Some(Channel::After), Some(Hook::After(h))) => {
                let before = lists.after.len();
                lists.after.retain(|x| !x.same(h));
                before - lists.after.len()
            }
            // A hook is never present on the other channel
            (Some(_), Some(_)) => 0,
        }
    }

    /// Removes every hook.
    pub fn clear(&self) {
        self.unregister(None, None);
    }

    /// Ordered copy of the before-hooks.
    pub fn before_snapshot(&self) -> Vec<BeforeHook> {
        self.read().before.clone()
    }

    /// Ordered copy of the after-hooks.
    pub fn after_snapshot(&self) -> Vec<AfterHook> {
        self.read().after.clone()
    }

    pub fn len(&self, channel: Channel) -> usize {
        let lists = self.read();
        match channel {
            Channel::Before => lists.before.len(),
            Channel::After => lists.after.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let lists = self.read();
        lists.before.is_empty() && lists.after.is_empty()
    }

    pub fn contains(&self, hook: &Hook) -> bool {
        let lists = self.read();
        match hook {
            Hook::Before(h) => lists.before.iter().any(|x| x.same(h)),
            Hook::After(h) => lists.after.iter().any(|x| x.same(h)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_before() -> BeforeHook {
        BeforeHook::sync(|_req| Ok(None))
    }

    fn noop_after() -> AfterHook {
        AfterHook::sync(|_req, _res| Ok(()))
    }

    #[test]
    fn registering_twice_is_a_no_op() {
        let registry = HookRegistry::new();
        let hook = noop_before();

        registry.register(Channel::Before, hook.clone(), None).unwrap();
        registry.register(Channel::Before, hook.clone(), None).unwrap();
        registry.register_before(hook, Some(0));

        assert_eq!(registry.len(Channel::Before), 1);
    }

    #[test]
    fn kind_must_match_channel() {
        let registry = HookRegistry::new();

        let res = registry.register(Channel::Before, noop_after(), None);
        assert!(matches!(res, Err(InterceptError::InvalidHook(_))));
        let res = registry.register(Channel::After, noop_before(), None);
        assert!(matches!(res, Err(InterceptError::InvalidHook(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn position_inserts_and_clamps() {
        let registry = HookRegistry::new();
        let a = noop_before();
        let b = noop_before();
        let c = noop_before();

        registry.register_before(a.clone(), None);
        registry.register_before(b.clone(), Some(0));
        registry.register_before(c.clone(), Some(99));

        let snapshot = registry.before_snapshot();
        assert!(snapshot[0].same(&b));
        assert!(snapshot[1].same(&a));
        assert!(snapshot[2].same(&c));
    }

    #[test]
    fn snapshot_is_independent() {
        let registry = HookRegistry::new();
        registry.register_before(noop_before(), None);

        let snapshot = registry.before_snapshot();
        registry.register_before(noop_before(), None);
        registry.unregister(Some(Channel::Before), None);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(Channel::Before), 0);
    }

    #[test]
    fn unregister_variants() {
        let registry = HookRegistry::new();
        let a = noop_before();
        let b = noop_before();
        let x = noop_after();

        registry.register_before(a.clone(), None);
        registry.register_before(b.clone(), None);
        registry.register_after(x.clone(), None);

        // wrong channel removes nothing
        assert_eq!(registry.unregister(Some(Channel::After), Some(&Hook::Before(a.clone()))), 0);

        assert_eq!(registry.unregister(Some(Channel::Before), Some(&Hook::Before(a.clone()))), 1);
        assert!(!registry.contains(&Hook::Before(a)));
        assert!(registry.contains(&Hook::Before(b)));

        assert_eq!(registry.unregister(Some(Channel::After), None), 1);
        assert_eq!(registry.len(Channel::After), 0);

        registry.register_after(x, None);
        assert_eq!(registry.unregister(None, None), 2);
        assert!(registry.is_empty());
    }
}
