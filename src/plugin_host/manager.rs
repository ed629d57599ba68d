//! Effect Instance Manager
//!
//! Owns the plugin binding, the parameter slots and the live instance of a
//! single node, and moves the node through its lifecycle:
//!
//! ```text
//!            create_plugin_instance()          first render / query
//!  Unbound ───────────────────────────▶ Bound ─────────────────────▶ Active
//!     ▲                                   │                            │
//!     └──── set_plugin_id(other) ◀────────┴────────────────────────────┘
//!
//!  any state ── set_plugin_id("") / destroy() ──▶ Destroyed
//! ```
//!
//! Renders run under the state read lock plus the per-instance mutex, so
//! they serialize per instance while id changes and teardown, which take
//! the write lock, wait for in-flight renders to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::binder::{BoundPlugin, PluginBinder};
use super::effect::EffectInstance;
use super::params::{ParameterBinding, ParameterHost, ParameterPlugs, ParameterSlot};
use super::types::*;

/// Lifecycle state of a node's effect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    /// No plugin id, or an id that has not been bound yet
    Unbound,
    /// Descriptor bound and slots materialized; no live instance
    Bound,
    /// A live instance exists
    Active,
    /// Terminal
    Destroyed,
}

type InstanceSlot = Option<Box<dyn EffectInstance>>;

struct BoundState {
    plugin: BoundPlugin,
    parameters: ParameterBinding,
    instance: Mutex<InstanceSlot>,
    active: AtomicBool,
}

struct ManagerState {
    plugin_id: String,
    bound: Option<BoundState>,
    destroyed: bool,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Access to the live instance while the node's render lock is held
pub struct ActiveInstance<'a> {
    descriptor: &'a PluginDescriptor,
    binding: &'a ParameterBinding,
    parameters: &'a Mutex<Box<dyn ParameterHost>>,
    instance: &'a mut dyn EffectInstance,
}

impl ActiveInstance<'_> {
    pub fn descriptor(&self) -> &PluginDescriptor {
        self.descriptor
    }

    /// Write the current slot values into the instance
    pub fn push_parameters(&mut self, time: f64) -> PluginResult<()> {
        let parameters = lock(self.parameters);
        self.binding
            .push_to_plugin(&**parameters, &mut *self.instance, time)
    }

    pub fn instance(&mut self) -> &mut dyn EffectInstance {
        &mut *self.instance
    }
}

/// Per-node effect lifecycle
pub struct EffectInstanceManager {
    binder: Arc<PluginBinder>,
    state: RwLock<ManagerState>,
    parameters: Mutex<Box<dyn ParameterHost>>,
}

impl EffectInstanceManager {
    pub fn new(binder: Arc<PluginBinder>) -> Self {
        Self::with_parameter_host(binder, Box::new(ParameterPlugs::new()))
    }

    /// Materialize slots into a caller-supplied container
    pub fn with_parameter_host(binder: Arc<PluginBinder>, parameters: Box<dyn ParameterHost>) -> Self {
        Self {
            binder,
            state: RwLock::new(ManagerState {
                plugin_id: String::new(),
                bound: None,
                destroyed: false,
            }),
            parameters: Mutex::new(parameters),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn bound_of(state: &ManagerState) -> PluginResult<&BoundState> {
        if state.destroyed {
            return Err(PluginError::NodeDestroyed);
        }
        state
            .bound
            .as_ref()
            .ok_or_else(|| PluginError::NotInstantiated(state.plugin_id.clone()))
    }

    pub fn binder(&self) -> &Arc<PluginBinder> {
        &self.binder
    }

    pub fn plugin_id(&self) -> String {
        self.read_state().plugin_id.clone()
    }

    pub fn state(&self) -> InstanceState {
        let state = self.read_state();
        match &state.bound {
            _ if state.destroyed => InstanceState::Destroyed,
            None => InstanceState::Unbound,
            Some(bound) if bound.active.load(Ordering::Acquire) => InstanceState::Active,
            Some(_) => InstanceState::Bound,
        }
    }

    /// Bound descriptor, once `create_plugin_instance` has succeeded
    pub fn descriptor(&self) -> Option<Arc<PluginDescriptor>> {
        self.read_state()
            .bound
            .as_ref()
            .map(|b| b.plugin.descriptor.clone())
    }

    /// Select a plugin
    ///
    /// A different id releases the current instance and slots (waiting for
    /// in-flight renders) and leaves the node unbound. An empty id destroys
    /// the node.
    pub fn set_plugin_id(&self, id: &str) -> PluginResult<()> {
        let mut state = self.write_state();
        if state.destroyed {
            return Err(PluginError::NodeDestroyed);
        }
        if id.is_empty() {
            self.release(&mut state);
            state.destroyed = true;
            debug!("Plugin id cleared, node destroyed");
            return Ok(());
        }
        if state.plugin_id == id {
            return Ok(());
        }
        self.release(&mut state);
        debug!("Plugin id {:?} -> {:?}", state.plugin_id, id);
        state.plugin_id = id.to_string();
        Ok(())
    }

    /// Bind the current plugin id and materialize its slots
    ///
    /// Returns false when the id is empty or no plugin has it, and when the
    /// node is destroyed. Other failures are logged and also return false;
    /// use `try_create_plugin_instance` to see them.
    pub fn create_plugin_instance(&self) -> bool {
        match self.try_create_plugin_instance() {
            Ok(created) => created,
            Err(e) => {
                warn!("Could not create plugin instance: {}", e);
                false
            }
        }
    }

    /// Like `create_plugin_instance`, but reports malformed schemas,
    /// incompatible plugins and slot failures as errors
    pub fn try_create_plugin_instance(&self) -> PluginResult<bool> {
        let mut state = self.write_state();
        self.create_locked(&mut state)
    }

    fn create_locked(&self, state: &mut ManagerState) -> PluginResult<bool> {
        if state.destroyed || state.plugin_id.is_empty() {
            return Ok(false);
        }
        if state.bound.is_some() {
            return Ok(true);
        }

        let plugin = match self.binder.bind(&state.plugin_id) {
            Ok(plugin) => plugin,
            Err(PluginError::NotFound(id)) => {
                debug!("No plugin with id {}", id);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        let parameters = {
            let mut host = lock(&self.parameters);
            ParameterBinding::materialize(&mut **host, &plugin.descriptor)?
        };
        info!(
            "Bound {} ({} parameter slots)",
            state.plugin_id,
            parameters.len()
        );
        state.bound = Some(BoundState {
            plugin,
            parameters,
            instance: Mutex::new(None),
            active: AtomicBool::new(false),
        });
        Ok(true)
    }

    /// Rebind the current plugin id from scratch
    ///
    /// The cached binding is dropped and the plugin described again. Slot
    /// values that still fit the new schema are carried over.
    pub fn reload(&self) -> PluginResult<bool> {
        let mut state = self.write_state();
        if state.destroyed {
            return Err(PluginError::NodeDestroyed);
        }
        let previous: Vec<(String, ParameterValue)> = match &state.bound {
            Some(bound) => {
                let host = lock(&self.parameters);
                bound
                    .parameters
                    .paths()
                    .filter_map(|path| host.value(path).map(|v| (path.to_string(), v)))
                    .collect()
            }
            None => Vec::new(),
        };

        self.release(&mut state);
        self.binder.invalidate(&state.plugin_id);
        if !self.create_locked(&mut state)? {
            return Ok(false);
        }

        let mut host = lock(&self.parameters);
        for (path, value) in previous {
            if host.slot(&path).is_none() {
                continue;
            }
            if let Err(e) = host.set_value(&path, value) {
                debug!("Dropped value of {} on reload: {}", path, e);
            }
        }
        Ok(true)
    }

    /// Destroy the instance and slots; waits for in-flight renders
    pub fn destroy(&self) {
        let mut state = self.write_state();
        if state.destroyed {
            return;
        }
        self.release(&mut state);
        state.destroyed = true;
        debug!("Destroyed node for {:?}", state.plugin_id);
    }

    fn release(&self, state: &mut ManagerState) {
        let Some(mut bound) = state.bound.take() else {
            return;
        };
        let instance = bound
            .instance
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if instance.is_some() {
            debug!("Destroying instance of {}", bound.plugin.descriptor.id());
        }
        drop(instance);
        bound.parameters.teardown(&mut **lock(&self.parameters));
    }

    pub fn parameter(&self, path: &str) -> Option<ParameterValue> {
        lock(&self.parameters).value(path)
    }

    pub fn parameter_slot(&self, path: &str) -> Option<ParameterSlot> {
        lock(&self.parameters).slot(path).cloned()
    }

    pub fn parameter_paths(&self) -> Vec<String> {
        lock(&self.parameters).slot_paths()
    }

    /// Edit a slot
    ///
    /// Rejected values leave the slot unchanged. On an active node the value
    /// is forwarded to the instance together with an instance-changed
    /// notification.
    pub fn set_parameter(&self, path: &str, value: ParameterValue, time: f64) -> PluginResult<()> {
        let state = self.read_state();
        let bound = Self::bound_of(&state)?;
        lock(&self.parameters).set_value(path, value)?;

        if bound.active.load(Ordering::Acquire) {
            let mut slot = lock(&bound.instance);
            if let Some(instance) = slot.as_deref_mut() {
                let host = lock(&self.parameters);
                bound.parameters.push_edit(&**host, instance, path, time)?;
            }
        }
        Ok(())
    }

    fn activate(&self, bound: &BoundState, slot: &mut InstanceSlot) -> PluginResult<()> {
        if slot.is_some() {
            return Ok(());
        }
        let descriptor = &bound.plugin.descriptor;
        let values = bound.parameters.values(&**lock(&self.parameters))?;
        match bound.plugin.plugin.create_instance(descriptor, &values) {
            Ok(instance) => {
                *slot = Some(instance);
                bound.active.store(true, Ordering::Release);
                debug!("Instantiated {} in the {} context", descriptor.id(), descriptor.context);
                Ok(())
            }
            Err(e) => {
                warn!("{} refused instantiation: {}", descriptor.id(), e);
                Err(e)
            }
        }
    }

    /// Make sure a live instance exists
    pub fn ensure_active(&self) -> PluginResult<()> {
        self.with_bound(|_| Ok(()))
    }

    /// Run `f` on the bound descriptor once a live instance exists
    ///
    /// The node cannot be re-targeted or destroyed while `f` runs, but
    /// renders on the instance may.
    pub fn with_bound<R>(&self, f: impl FnOnce(&PluginDescriptor) -> PluginResult<R>) -> PluginResult<R> {
        let state = self.read_state();
        let bound = Self::bound_of(&state)?;
        if !bound.active.load(Ordering::Acquire) {
            let mut slot = lock(&bound.instance);
            self.activate(bound, &mut slot)?;
        }
        f(bound.plugin.descriptor.as_ref())
    }

    /// Run `f` with exclusive access to the live instance, creating it first
    /// if needed
    ///
    /// The node cannot be re-targeted or destroyed while `f` runs.
    pub fn with_active<R>(
        &self,
        f: impl FnOnce(&mut ActiveInstance<'_>) -> PluginResult<R>,
    ) -> PluginResult<R> {
        let state = self.read_state();
        let bound = Self::bound_of(&state)?;
        let mut slot = lock(&bound.instance);
        self.activate(bound, &mut slot)?;
        let Some(instance) = slot.as_deref_mut() else {
            return Err(PluginError::NotInstantiated(state.plugin_id.clone()));
        };
        let mut active = ActiveInstance {
            descriptor: bound.plugin.descriptor.as_ref(),
            binding: &bound.parameters,
            parameters: &self.parameters,
            instance,
        };
        f(&mut active)
    }
}

impl Drop for EffectInstanceManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_host::effect::{EffectPlugin, ParameterValues, RenderArgs};
    use crate::plugin_host::image::Image;
    use crate::plugin_host::mock_plugin::{self, CONSTANT_PLUGIN_ID, INVERT_PLUGIN_ID};
    use crate::plugin_host::registry::PluginRegistry;
    use std::sync::atomic::AtomicUsize;

    /// Refuses to instantiate unless its `ready` parameter is set
    struct PickyPlugin {
        info: PluginInfo,
        live: Arc<AtomicUsize>,
        edits: Arc<Mutex<Vec<String>>>,
    }

    struct PickyInstance {
        live: Arc<AtomicUsize>,
        edits: Arc<Mutex<Vec<String>>>,
    }

    impl EffectPlugin for PickyPlugin {
        fn info(&self) -> &PluginInfo {
            &self.info
        }

        fn describe(&self, _context: EffectContext) -> PluginResult<EffectSchema> {
            Ok(EffectSchema {
                clips: vec![ClipDescriptor::output()],
                parameters: vec![ParameterDescriptor::new("ready", ParameterKind::Boolean)],
            })
        }

        fn create_instance(
            &self,
            _descriptor: &PluginDescriptor,
            values: &ParameterValues,
        ) -> PluginResult<Box<dyn EffectInstance>> {
            if values.get("ready") != Some(&ParameterValue::Bool(true)) {
                return Err(PluginError::InstantiationRefused("not ready".to_string()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(PickyInstance {
                live: self.live.clone(),
                edits: self.edits.clone(),
            }))
        }
    }

    impl EffectInstance for PickyInstance {
        fn set_parameter(&mut self, name: &str, _value: &ParameterValue, _time: f64) -> PluginResult<()> {
            lock(&self.edits).push(format!("set {}", name));
            Ok(())
        }

        fn instance_changed(&mut self, name: &str, _time: f64) -> PluginResult<()> {
            lock(&self.edits).push(format!("changed {}", name));
            Ok(())
        }

        fn render(&mut self, _args: &RenderArgs<'_>, _output: &mut Image) -> PluginResult<()> {
            Ok(())
        }
    }

    impl Drop for PickyInstance {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn binder_with_edits() -> (Arc<PluginBinder>, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let registry = Arc::new(PluginRegistry::new());
        mock_plugin::register_builtins(&registry);
        let live = Arc::new(AtomicUsize::new(0));
        let edits = Arc::new(Mutex::new(Vec::new()));
        let mut info = PluginInfo::new("test.picky", PluginVersion::new(1, 0), PluginSource::Builtin);
        info.contexts = vec![EffectContext::Generator];
        registry.register(Arc::new(PickyPlugin {
            info,
            live: live.clone(),
            edits: edits.clone(),
        }));
        (Arc::new(PluginBinder::new(registry)), live, edits)
    }

    fn binder() -> (Arc<PluginBinder>, Arc<AtomicUsize>) {
        let (binder, live, _) = binder_with_edits();
        (binder, live)
    }

    #[test]
    fn test_unresolved_ids_create_nothing() {
        let (binder, _) = binder();
        let manager = EffectInstanceManager::new(binder);
        assert!(!manager.create_plugin_instance());

        manager.set_plugin_id("com.example.missing").unwrap();
        assert!(!manager.create_plugin_instance());
        assert!(manager.parameter_paths().is_empty());
        assert_eq!(manager.state(), InstanceState::Unbound);
    }

    #[test]
    fn test_create_is_idempotent() {
        let (binder, _) = binder();
        let manager = EffectInstanceManager::new(binder);
        manager.set_plugin_id(INVERT_PLUGIN_ID).unwrap();
        assert!(manager.create_plugin_instance());
        let paths = manager.parameter_paths();
        assert!(manager.create_plugin_instance());
        assert_eq!(manager.parameter_paths(), paths);
        assert_eq!(manager.state(), InstanceState::Bound);
    }

    #[test]
    fn test_id_change_tears_down_slots() {
        let (binder, _) = binder();
        let manager = EffectInstanceManager::new(binder);
        manager.set_plugin_id(INVERT_PLUGIN_ID).unwrap();
        manager.create_plugin_instance();
        assert!(manager.parameter_paths().contains(&"mix".to_string()));

        manager.set_plugin_id(CONSTANT_PLUGIN_ID).unwrap();
        assert!(manager.parameter_paths().is_empty());
        assert_eq!(manager.state(), InstanceState::Unbound);

        assert!(manager.create_plugin_instance());
        assert_eq!(manager.parameter_paths(), vec!["color"]);
    }

    #[test]
    fn test_empty_id_destroys() {
        let (binder, live) = binder();
        let manager = EffectInstanceManager::new(binder);
        manager.set_plugin_id("test.picky").unwrap();
        manager.create_plugin_instance();
        manager.set_parameter("ready", ParameterValue::Bool(true), 0.0).unwrap();
        manager.ensure_active().unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 1);

        manager.set_plugin_id("").unwrap();
        assert_eq!(manager.state(), InstanceState::Destroyed);
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert!(manager.parameter_paths().is_empty());
        assert!(!manager.create_plugin_instance());
        assert!(matches!(
            manager.set_plugin_id(INVERT_PLUGIN_ID),
            Err(PluginError::NodeDestroyed)
        ));
    }

    #[test]
    fn test_refused_instantiation_stays_bound() {
        let (binder, live) = binder();
        let manager = EffectInstanceManager::new(binder);
        manager.set_plugin_id("test.picky").unwrap();
        assert!(manager.create_plugin_instance());

        assert!(matches!(
            manager.ensure_active(),
            Err(PluginError::InstantiationRefused(_))
        ));
        assert_eq!(manager.state(), InstanceState::Bound);

        manager.set_parameter("ready", ParameterValue::Bool(true), 0.0).unwrap();
        manager.ensure_active().unwrap();
        assert_eq!(manager.state(), InstanceState::Active);
        assert_eq!(live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_edits_reach_active_instance() {
        let (binder, _, edits) = binder_with_edits();
        let manager = EffectInstanceManager::new(binder);
        manager.set_plugin_id("test.picky").unwrap();
        manager.create_plugin_instance();

        // Not active yet: only the slot changes
        manager.set_parameter("ready", ParameterValue::Bool(true), 0.0).unwrap();
        assert!(lock(&edits).is_empty());

        manager.with_active(|active| active.push_parameters(0.0)).unwrap();
        assert_eq!(*lock(&edits), vec!["set ready"]);

        manager.set_parameter("ready", ParameterValue::Bool(true), 1.0).unwrap();
        assert_eq!(*lock(&edits), vec!["set ready", "set ready", "changed ready"]);
    }

    #[test]
    fn test_reload_keeps_values() {
        let (binder, _) = binder();
        let manager = EffectInstanceManager::new(binder.clone());
        manager.set_plugin_id(INVERT_PLUGIN_ID).unwrap();
        manager.create_plugin_instance();
        manager.set_parameter("mix", ParameterValue::Double(0.25), 0.0).unwrap();
        manager.ensure_active().unwrap();

        assert!(manager.reload().unwrap());
        assert_eq!(manager.state(), InstanceState::Bound);
        assert_eq!(manager.parameter("mix"), Some(ParameterValue::Double(0.25)));
    }

    #[test]
    fn test_not_instantiated_errors() {
        let (binder, _) = binder();
        let manager = EffectInstanceManager::new(binder);
        manager.set_plugin_id(INVERT_PLUGIN_ID).unwrap();
        assert!(matches!(
            manager.with_active(|_| Ok(())),
            Err(PluginError::NotInstantiated(_))
        ));
        assert!(matches!(
            manager.set_parameter("mix", ParameterValue::Double(0.5), 0.0),
            Err(PluginError::NotInstantiated(_))
        ));
    }
}
