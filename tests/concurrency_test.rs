//! Concurrency Tests
//!
//! A node is shared between evaluation threads. Renders on one instance must
//! not interleave, and re-targeting or destroying a node must wait for the
//! render in flight.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use ofx_host::plugin_host::mock_plugin::{CONSTANT_PLUGIN_ID, INVERT_PLUGIN_ID};
use ofx_host::plugin_host::*;

const RECORDER_ID: &str = "test.concurrency.recorder";

/// Shared observations of every recorder instance
#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
    busy: AtomicBool,
    overlaps: AtomicUsize,
    live: AtomicUsize,
    changed_at: Mutex<Vec<f64>>,
}

impl Recorder {
    fn enter(&self, event: String) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.log.lock().unwrap().push(event);
    }

    fn leave(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

type Gate = (Sender<()>, Receiver<()>);

/// Generator that records every call and can block its first render
struct RecorderPlugin {
    info: PluginInfo,
    recorder: Arc<Recorder>,
    gate: Mutex<Option<Gate>>,
}

impl RecorderPlugin {
    fn new(recorder: Arc<Recorder>, gate: Option<Gate>) -> Self {
        let mut info = PluginInfo::new(RECORDER_ID, PluginVersion::new(1, 0), PluginSource::Builtin);
        info.contexts = vec![EffectContext::Generator];
        Self {
            info,
            recorder,
            gate: Mutex::new(gate),
        }
    }
}

impl EffectPlugin for RecorderPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn describe(&self, _context: EffectContext) -> PluginResult<EffectSchema> {
        Ok(EffectSchema {
            clips: vec![ClipDescriptor::output()],
            parameters: vec![ParameterDescriptor::new("level", ParameterKind::Double)],
        })
    }

    fn create_instance(
        &self,
        _descriptor: &PluginDescriptor,
        _values: &ParameterValues,
    ) -> PluginResult<Box<dyn EffectInstance>> {
        self.recorder.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecorderInstance {
            recorder: self.recorder.clone(),
            gate: self.gate.lock().unwrap().take(),
        }))
    }
}

struct RecorderInstance {
    recorder: Arc<Recorder>,
    gate: Option<Gate>,
}

impl EffectInstance for RecorderInstance {
    fn set_parameter(&mut self, name: &str, _value: &ParameterValue, _time: f64) -> PluginResult<()> {
        self.recorder.enter(format!("set {}", name));
        self.recorder.leave();
        Ok(())
    }

    fn instance_changed(&mut self, name: &str, time: f64) -> PluginResult<()> {
        self.recorder.enter(format!("changed {}", name));
        self.recorder.changed_at.lock().unwrap().push(time);
        self.recorder.leave();
        Ok(())
    }

    fn render(&mut self, args: &RenderArgs<'_>, output: &mut Image) -> PluginResult<()> {
        self.recorder.enter("render".to_string());
        if let Some((started, release)) = self.gate.take() {
            let _ = started.send(());
            let _ = release.recv();
        }
        for y in args.render_window.y1..args.render_window.y2 {
            for x in args.render_window.x1..args.render_window.x2 {
                output.set_pixel(x, y, [args.time as f32, 0.0, 0.0, 1.0]);
            }
        }
        self.recorder.leave();
        Ok(())
    }
}

impl Drop for RecorderInstance {
    fn drop(&mut self) {
        self.recorder.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn recorder_node(recorder: Arc<Recorder>, gate: Option<Gate>) -> Arc<OfxImageNode> {
    let registry = Arc::new(PluginRegistry::new());
    registry.register(Arc::new(RecorderPlugin::new(recorder, gate)));
    let node = OfxImageNode::new(
        "recorder",
        Arc::new(PluginBinder::new(registry)),
        Arc::new(DefaultFormat::new(Some(Format::new(8, 8)))),
    );
    node.set_plugin_id(RECORDER_ID).unwrap();
    assert!(node.create_plugin_instance());
    Arc::new(node)
}

/// Parallel computes and edits never overlap inside one instance
#[test]
fn test_renders_and_edits_do_not_interleave() {
    let recorder = Arc::new(Recorder::default());
    let node = recorder_node(recorder.clone(), None);
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads + 1));

    let mut handles = Vec::new();
    for t in 0..threads {
        let node = node.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..25 {
                let time = (t * 100 + i) as f64;
                let image = node.compute(&EvaluationContext::at_time(time)).unwrap();
                assert_eq!(image.pixel(0, 0), [time as f32, 0.0, 0.0, 1.0]);
            }
        }));
    }
    {
        let node = node.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..25 {
                node.set_parameter("level", ParameterValue::Double(i as f64), 0.0)
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
    let events = recorder.events();
    let renders = events.iter().filter(|e| *e == "render").count();
    assert_eq!(renders, threads * 25);
    for (i, event) in events.iter().enumerate() {
        // Each render is preceded by its own parameter push, each edit
        // notification by the edit itself
        if event == "render" || event == "changed level" {
            assert_eq!(events[i - 1], "set level", "event {} of {:?}", i, events);
        }
    }
    assert_eq!(recorder.live.load(Ordering::SeqCst), 1);
}

/// Destroying a node blocks until the render in flight finishes
#[test]
fn test_destroy_waits_for_render() {
    let recorder = Arc::new(Recorder::default());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let node = recorder_node(recorder.clone(), Some((started_tx, release_rx)));

    let render = {
        let node = node.clone();
        thread::spawn(move || node.compute(&EvaluationContext::new()))
    };
    started_rx.recv().unwrap();

    let destroyed = Arc::new(AtomicBool::new(false));
    let destroyer = {
        let node = node.clone();
        let destroyed = destroyed.clone();
        thread::spawn(move || {
            node.destroy();
            destroyed.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!destroyed.load(Ordering::SeqCst));
    assert_eq!(recorder.live.load(Ordering::SeqCst), 1);

    release_tx.send(()).unwrap();
    let image = render.join().unwrap().unwrap();
    assert_eq!(image.bounds(), Rect::new(0, 0, 8, 8));
    destroyer.join().unwrap();

    assert!(destroyed.load(Ordering::SeqCst));
    assert_eq!(node.state(), InstanceState::Destroyed);
    assert_eq!(recorder.live.load(Ordering::SeqCst), 0);
}

/// Re-targeting a node waits for the render and drops the old instance
#[test]
fn test_plugin_change_waits_for_render() {
    let recorder = Arc::new(Recorder::default());
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let node = recorder_node(recorder.clone(), Some((started_tx, release_rx)));

    let render = {
        let node = node.clone();
        thread::spawn(move || node.compute(&EvaluationContext::new()))
    };
    started_rx.recv().unwrap();

    let retargeted = Arc::new(AtomicBool::new(false));
    let retarget = {
        let node = node.clone();
        let retargeted = retargeted.clone();
        thread::spawn(move || {
            let result = node.set_plugin_id("com.example.other");
            retargeted.store(true, Ordering::SeqCst);
            result
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!retargeted.load(Ordering::SeqCst));
    assert_eq!(recorder.live.load(Ordering::SeqCst), 1);

    release_tx.send(()).unwrap();
    render.join().unwrap().unwrap();
    retarget.join().unwrap().unwrap();

    assert_eq!(node.plugin_id(), "com.example.other");
    assert_eq!(node.state(), InstanceState::Unbound);
    assert!(node.parameter_paths().is_empty());
    assert_eq!(recorder.live.load(Ordering::SeqCst), 0);
}

/// Project size queries on many threads share one instance
#[test]
fn test_parallel_project_size() {
    let recorder = Arc::new(Recorder::default());
    let node = recorder_node(recorder.clone(), None);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let node = node.clone();
            thread::spawn(move || node.effect_instance_project_size(&EvaluationContext::new()))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), (8.0, 8.0));
    }
    assert_eq!(recorder.live.load(Ordering::SeqCst), 1);
    assert_eq!(node.state(), InstanceState::Active);
}

/// Edits on an active node reach the instance at the caller's time
#[test]
fn test_edit_time_reaches_instance() {
    let recorder = Arc::new(Recorder::default());
    let node = recorder_node(recorder.clone(), None);
    node.effect_instance_project_size(&EvaluationContext::new())
        .unwrap();

    node.set_parameter("level", ParameterValue::Double(0.5), 12.5)
        .unwrap();
    node.set_parameter("level", ParameterValue::Double(0.75), 40.0)
        .unwrap();
    assert_eq!(*recorder.changed_at.lock().unwrap(), vec![12.5, 40.0]);
}

/// Source whose first format query blocks until released
struct GatedSource {
    inner: ConstantImage,
    gate: Mutex<Option<Gate>>,
}

impl ImageInput for GatedSource {
    fn format(&self, context: &EvaluationContext) -> Option<Format> {
        let gate = self.gate.lock().unwrap().take();
        if let Some((started, release)) = gate {
            let _ = started.send(());
            let _ = release.recv();
        }
        self.inner.format(context)
    }

    fn image(&self, context: &EvaluationContext, region: Rect) -> PluginResult<Image> {
        self.inner.image(context, region)
    }
}

/// A plugin change issued while a compute is still reading its inputs
/// waits, and the compute finishes against the plugin it started with
#[test]
fn test_plugin_change_waits_for_input_resolution() {
    let registry = Arc::new(PluginRegistry::new());
    mock_plugin::register_builtins(&registry);
    let node = Arc::new(OfxImageNode::new(
        "invert",
        Arc::new(PluginBinder::new(registry)),
        Arc::new(DefaultFormat::new(Some(Format::new(16, 8)))),
    ));
    node.set_plugin_id(INVERT_PLUGIN_ID).unwrap();
    assert!(node.create_plugin_instance());

    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let source: SharedImageInput = Arc::new(GatedSource {
        inner: ConstantImage::new(Format::new(4, 4), [0.25, 0.5, 1.0, 1.0]),
        gate: Mutex::new(Some((started_tx, release_rx))),
    });
    node.set_input(0, Some(source)).unwrap();

    let render = {
        let node = node.clone();
        thread::spawn(move || node.compute(&EvaluationContext::new()))
    };
    started_rx.recv().unwrap();

    let retargeted = Arc::new(AtomicBool::new(false));
    let retarget = {
        let node = node.clone();
        let retargeted = retargeted.clone();
        thread::spawn(move || {
            node.set_plugin_id(CONSTANT_PLUGIN_ID).unwrap();
            let created = node.create_plugin_instance();
            retargeted.store(true, Ordering::SeqCst);
            created
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!retargeted.load(Ordering::SeqCst));

    release_tx.send(()).unwrap();
    let image = render.join().unwrap().unwrap();
    assert_eq!(image.bounds(), Rect::new(0, 0, 4, 4));
    assert_eq!(image.pixel(2, 2), [0.75, 0.5, 0.0, 1.0]);
    assert!(retarget.join().unwrap());

    assert_eq!(node.plugin_id(), CONSTANT_PLUGIN_ID);
    assert!(node.input_labels().is_empty());
    let image = node.compute(&EvaluationContext::new()).unwrap();
    assert_eq!(image.bounds(), Rect::new(0, 0, 16, 8));
}
