//! Hook registry shared by request specs and prepared messages.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::http::response::ResponseMessage;

/// Events a hook can be registered for.
pub const HOOK_EVENTS: &[&str] = &["response"];

/// A callback run against a received response.
pub type Hook = Arc<dyn Fn(&mut ResponseMessage) + Send + Sync>;

/// One hook or several, as accepted by registration.
#[derive(Clone)]
pub enum HookSpec {
    One(Hook),
    Many(Vec<Hook>),
}

impl From<Hook> for HookSpec {
    fn from(hook: Hook) -> Self {
        HookSpec::One(hook)
    }
}

impl From<Vec<Hook>> for HookSpec {
    fn from(hooks: Vec<Hook>) -> Self {
        HookSpec::Many(hooks)
    }
}

/// Hooks keyed by event name; every known event starts with an empty list.
#[derive(Clone)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Vec<Hook>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self {
            hooks: HOOK_EVENTS
                .iter()
                .map(|e| (e.to_string(), Vec::new()))
                .collect(),
        }
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds hooks for `event`, which must be a known hook event.
    pub fn register(&mut self, event: &str, spec: impl Into<HookSpec>) -> Result<()> {
        let Some(list) = self.hooks.get_mut(event) else {
            return Err(Error::InvalidValue(format!(
                "Unsupported event specified, with event name \"{event}\""
            )));
        };
        match spec.into() {
            HookSpec::One(hook) => list.push(hook),
            HookSpec::Many(hooks) => list.extend(hooks),
        }
        Ok(())
    }

    /// Removes `hook` from `event`; returns whether it was registered.
    pub fn deregister(&mut self, event: &str, hook: &Hook) -> bool {
        let Some(list) = self.hooks.get_mut(event) else {
            return false;
        };
        match list.iter().position(|h| Arc::ptr_eq(h, hook)) {
            Some(i) => {
                list.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, event: &str) -> &[Hook] {
        self.hooks.get(event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Registered `(event, hooks)` pairs, in event-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Hook])> {
        self.hooks.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (event, hooks) in &self.hooks {
            map.entry(event, &hooks.len());
        }
        map.finish()
    }
}

/// Anything that carries a hook registry.
pub trait HookBearing {
    fn hooks(&self) -> &HookRegistry;
    fn hooks_mut(&mut self) -> &mut HookRegistry;

    fn register_hook(&mut self, event: &str, spec: impl Into<HookSpec>) -> Result<()> {
        self.hooks_mut().register(event, spec)
    }

    fn deregister_hook(&mut self, event: &str, hook: &Hook) -> bool {
        self.hooks_mut().deregister(event, hook)
    }
}

/// Runs every hook registered for `event` against `response`, in
/// registration order.
pub fn dispatch_hook(hooks: &HookRegistry, event: &str, response: &mut ResponseMessage) {
    let registered = hooks.get(event);
    if !registered.is_empty() {
        tracing::trace!(event, count = registered.len(), "Dispatching hooks");
    }
    for hook in registered {
        hook(response);
    }
}
