//! Parameter Synchronizer
//!
//! Mirrors a plugin's parameter schema as host-side slots and moves values
//! between the slots and a live instance.
//!
//! Slots live in a [`ParameterHost`], the node's plug container. Nested
//! parameters get dotted paths (`channels.red`) while the plugin keeps
//! addressing them by their flat name (`red`).

use tracing::{debug, warn};

use super::effect::{EffectInstance, ParameterValues};
use super::types::*;

/// Host-native value holder for one plugin parameter
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSlot {
    /// Dotted path from the top of the parameter tree
    pub path: String,
    pub descriptor: ParameterDescriptor,
    /// Current value; `None` for groups and push buttons
    pub value: Option<ParameterValue>,
}

impl ParameterSlot {
    pub fn new(path: &str, descriptor: &ParameterDescriptor) -> Self {
        Self {
            path: path.to_string(),
            descriptor: descriptor.clone(),
            value: descriptor.default_value(),
        }
    }

    /// Plugin-side parameter name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// Container the synchronizer creates slots in
///
/// `set_value` is the host's edit path: it must leave the previous value
/// in place when it rejects a value.
pub trait ParameterHost: Send {
    /// Add a slot; fails if the path is taken
    fn add_slot(&mut self, slot: ParameterSlot) -> PluginResult<()>;

    fn remove_slot(&mut self, path: &str) -> Option<ParameterSlot>;

    fn slot(&self, path: &str) -> Option<&ParameterSlot>;

    /// Every slot path, in creation order
    fn slot_paths(&self) -> Vec<String>;

    fn value(&self, path: &str) -> Option<ParameterValue> {
        self.slot(path).and_then(|s| s.value.clone())
    }

    fn set_value(&mut self, path: &str, value: ParameterValue) -> PluginResult<()>;
}

/// Default slot container, kept in creation order
#[derive(Debug, Default)]
pub struct ParameterPlugs {
    slots: Vec<ParameterSlot>,
}

impl ParameterPlugs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl ParameterHost for ParameterPlugs {
    fn add_slot(&mut self, slot: ParameterSlot) -> PluginResult<()> {
        if self.slot(&slot.path).is_some() {
            return Err(PluginError::ParameterError(format!(
                "slot {} already exists",
                slot.path
            )));
        }
        self.slots.push(slot);
        Ok(())
    }

    fn remove_slot(&mut self, path: &str) -> Option<ParameterSlot> {
        let index = self.slots.iter().position(|s| s.path == path)?;
        Some(self.slots.remove(index))
    }

    fn slot(&self, path: &str) -> Option<&ParameterSlot> {
        self.slots.iter().find(|s| s.path == path)
    }

    fn slot_paths(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.path.clone()).collect()
    }

    fn set_value(&mut self, path: &str, value: ParameterValue) -> PluginResult<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.path == path)
            .ok_or_else(|| PluginError::ParameterError(format!("no slot {}", path)))?;
        if slot.descriptor.read_only {
            return Err(PluginError::InvalidParameterValue(format!("{} is read-only", path)));
        }
        slot.descriptor.validate(&value)?;
        slot.value = Some(value);
        Ok(())
    }
}

/// The slots materialized for one bound descriptor
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterBinding {
    /// (slot path, plugin parameter name), in creation order
    slots: Vec<(String, String)>,
}

impl ParameterBinding {
    /// Create one slot per parameter, recursing into groups
    ///
    /// Either every slot is created or, on error, the ones already created
    /// are removed again before the error is returned.
    pub fn materialize(
        host: &mut dyn ParameterHost,
        descriptor: &PluginDescriptor,
    ) -> PluginResult<Self> {
        let mut binding = ParameterBinding::default();
        if let Err(e) = binding.materialize_all(host, "", descriptor.parameters()) {
            warn!(
                "Rolling back {} slots of {}: {}",
                binding.slots.len(),
                descriptor.id(),
                e
            );
            binding.teardown(host);
            return Err(e);
        }
        debug!("Materialized {} slots for {}", binding.slots.len(), descriptor.id());
        Ok(binding)
    }

    fn materialize_all(
        &mut self,
        host: &mut dyn ParameterHost,
        prefix: &str,
        parameters: &[ParameterDescriptor],
    ) -> PluginResult<()> {
        for param in parameters {
            let path = if prefix.is_empty() {
                param.name.clone()
            } else {
                format!("{}.{}", prefix, param.name)
            };
            host.add_slot(ParameterSlot::new(&path, param))?;
            self.slots.push((path.clone(), param.name.clone()));
            self.materialize_all(host, &path, param.children())?;
        }
        Ok(())
    }

    /// Remove every slot this binding created
    pub fn teardown(&mut self, host: &mut dyn ParameterHost) {
        for (path, _) in self.slots.drain(..).rev() {
            host.remove_slot(&path);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(path, _)| path.as_str())
    }

    /// Slot path of a plugin parameter
    pub fn path_of(&self, name: &str) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, n)| n == name)
            .map(|(path, _)| path.as_str())
    }

    /// Current slot values converted to the plugin's declared types
    pub fn values(&self, host: &dyn ParameterHost) -> PluginResult<ParameterValues> {
        let mut values = ParameterValues::new();
        for (path, name) in &self.slots {
            if let Some((name, value)) = converted(host, path, name)? {
                values.insert(name, value);
            }
        }
        Ok(values)
    }

    /// Write every slot value into a live instance
    pub fn push_to_plugin(
        &self,
        host: &dyn ParameterHost,
        instance: &mut dyn EffectInstance,
        time: f64,
    ) -> PluginResult<()> {
        for (name, value) in self.values(host)? {
            instance.set_parameter(&name, &value, time)?;
        }
        Ok(())
    }

    /// Write one slot into a live instance and notify it of the edit
    pub fn push_edit(
        &self,
        host: &dyn ParameterHost,
        instance: &mut dyn EffectInstance,
        path: &str,
        time: f64,
    ) -> PluginResult<()> {
        let Some((_, name)) = self.slots.iter().find(|(p, _)| p == path) else {
            return Err(PluginError::ParameterError(format!("no slot {}", path)));
        };
        if let Some((name, value)) = converted(host, path, name)? {
            instance.set_parameter(&name, &value, time)?;
            instance.instance_changed(&name, time)?;
        }
        Ok(())
    }
}

fn converted(
    host: &dyn ParameterHost,
    path: &str,
    name: &str,
) -> PluginResult<Option<(String, ParameterValue)>> {
    let slot = host
        .slot(path)
        .ok_or_else(|| PluginError::ParameterError(format!("slot {} vanished", path)))?;
    match &slot.value {
        Some(value) => Ok(Some((name.to_string(), slot.descriptor.convert(value)?))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_host::effect::RenderArgs;
    use crate::plugin_host::image::Image;

    fn descriptor(parameters: Vec<ParameterDescriptor>) -> PluginDescriptor {
        PluginDescriptor {
            info: PluginInfo::new("test.params", PluginVersion::new(1, 0), PluginSource::Builtin),
            context: EffectContext::Filter,
            schema: EffectSchema {
                clips: vec![ClipDescriptor::output()],
                parameters,
            },
            thread_safety: RenderThreadSafety::InstanceSafe,
        }
    }

    fn sample() -> PluginDescriptor {
        descriptor(vec![
            ParameterDescriptor::new("gain", ParameterKind::Double)
                .with_default(ParameterValue::Double(0.5))
                .with_range(0.0, 1.0)
                .clamped(),
            ParameterDescriptor::new(
                "channels",
                ParameterKind::Group {
                    children: vec![ParameterDescriptor::new("red", ParameterKind::Boolean)
                        .with_default(ParameterValue::Bool(true))],
                },
            ),
            ParameterDescriptor::new(
                "mode",
                ParameterKind::Choice {
                    options: vec!["a".to_string(), "b".to_string()],
                },
            ),
        ])
    }

    /// Host that refuses to add a slot at a given path
    struct FailingHost {
        plugs: ParameterPlugs,
        fail_at: &'static str,
    }

    impl ParameterHost for FailingHost {
        fn add_slot(&mut self, slot: ParameterSlot) -> PluginResult<()> {
            if slot.path == self.fail_at {
                return Err(PluginError::ParameterError("host refused".to_string()));
            }
            self.plugs.add_slot(slot)
        }

        fn remove_slot(&mut self, path: &str) -> Option<ParameterSlot> {
            self.plugs.remove_slot(path)
        }

        fn slot(&self, path: &str) -> Option<&ParameterSlot> {
            self.plugs.slot(path)
        }

        fn slot_paths(&self) -> Vec<String> {
            self.plugs.slot_paths()
        }

        fn set_value(&mut self, path: &str, value: ParameterValue) -> PluginResult<()> {
            self.plugs.set_value(path, value)
        }
    }

    #[derive(Default)]
    struct RecordingInstance {
        calls: Vec<String>,
    }

    impl EffectInstance for RecordingInstance {
        fn set_parameter(&mut self, name: &str, value: &ParameterValue, _time: f64) -> PluginResult<()> {
            self.calls.push(format!("{}={:?}", name, value));
            Ok(())
        }

        fn instance_changed(&mut self, name: &str, _time: f64) -> PluginResult<()> {
            self.calls.push(format!("changed {}", name));
            Ok(())
        }

        fn render(&mut self, _args: &RenderArgs<'_>, _output: &mut Image) -> PluginResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_materialize_nested_paths() {
        let mut plugs = ParameterPlugs::new();
        let binding = ParameterBinding::materialize(&mut plugs, &sample()).unwrap();
        assert_eq!(plugs.slot_paths(), vec!["gain", "channels", "channels.red", "mode"]);
        assert_eq!(binding.path_of("red"), Some("channels.red"));
        assert_eq!(plugs.value("gain"), Some(ParameterValue::Double(0.5)));
        assert_eq!(plugs.value("mode"), Some(ParameterValue::Choice(0)));
        assert_eq!(plugs.value("channels"), None);
    }

    #[test]
    fn test_materialize_rolls_back() {
        let mut host = FailingHost {
            plugs: ParameterPlugs::new(),
            fail_at: "mode",
        };
        let result = ParameterBinding::materialize(&mut host, &sample());
        assert!(result.is_err());
        assert!(host.slot_paths().is_empty());
    }

    #[test]
    fn test_teardown_removes_everything() {
        let mut plugs = ParameterPlugs::new();
        let mut binding = ParameterBinding::materialize(&mut plugs, &sample()).unwrap();
        binding.teardown(&mut plugs);
        assert!(plugs.is_empty());
        assert!(binding.is_empty());
        // A second teardown is harmless
        binding.teardown(&mut plugs);
    }

    #[test]
    fn test_out_of_range_choice_keeps_previous_value() {
        let mut plugs = ParameterPlugs::new();
        ParameterBinding::materialize(&mut plugs, &sample()).unwrap();
        plugs.set_value("mode", ParameterValue::Choice(1)).unwrap();
        let err = plugs.set_value("mode", ParameterValue::Choice(2)).unwrap_err();
        assert!(matches!(err, PluginError::InvalidParameterValue(_)));
        assert_eq!(plugs.value("mode"), Some(ParameterValue::Choice(1)));
    }

    #[test]
    fn test_read_only_and_unknown_slots() {
        let mut locked = ParameterDescriptor::new("locked", ParameterKind::Integer);
        locked.read_only = true;
        let mut plugs = ParameterPlugs::new();
        ParameterBinding::materialize(&mut plugs, &descriptor(vec![locked])).unwrap();
        assert!(matches!(
            plugs.set_value("locked", ParameterValue::Int(3)),
            Err(PluginError::InvalidParameterValue(_))
        ));
        assert!(matches!(
            plugs.set_value("nothing", ParameterValue::Int(3)),
            Err(PluginError::ParameterError(_))
        ));
    }

    #[test]
    fn test_push_converts_and_clamps() {
        let mut plugs = ParameterPlugs::new();
        let binding = ParameterBinding::materialize(&mut plugs, &sample()).unwrap();
        plugs.set_value("gain", ParameterValue::Int(4)).unwrap();
        plugs.set_value("mode", ParameterValue::Int(1)).unwrap();

        let mut instance = RecordingInstance::default();
        binding.push_to_plugin(&plugs, &mut instance, 0.0).unwrap();
        assert_eq!(
            instance.calls,
            vec!["gain=Double(1.0)", "mode=Choice(1)", "red=Bool(true)"]
        );
    }

    #[test]
    fn test_push_edit_notifies() {
        let mut plugs = ParameterPlugs::new();
        let binding = ParameterBinding::materialize(&mut plugs, &sample()).unwrap();
        plugs.set_value("channels.red", ParameterValue::Bool(false)).unwrap();

        let mut instance = RecordingInstance::default();
        binding
            .push_edit(&plugs, &mut instance, "channels.red", 1.0)
            .unwrap();
        assert_eq!(instance.calls, vec!["red=Bool(false)", "changed red"]);
    }
}
