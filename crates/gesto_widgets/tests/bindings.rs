//! Bindings driven by the bundled interactions

use gesto_core::binding::{BindingPhase, DeferredExecutor, WidgetBinding};
use gesto_core::command::{AnonCommand, Command};
use gesto_core::error::{CollectingErrorSink, CommandError};
use gesto_core::events::{event_types, Key, Modifiers, MouseButton, UiEvent};
use gesto_core::instrument::Instrument;
use gesto_core::interaction::{EventSource, SharedSource, Widget};
use gesto_core::timer::TimerQueue;
use gesto_core::undo::{UndoHistory, Undoable};
use gesto_widgets::{click, double_click, drag, modified_wheel, text_changed, DragData};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Shape position shared by the commands
#[derive(Debug, Default)]
struct Canvas {
    shape: (f32, f32),
    zoom: f32,
}

struct MoveShape {
    canvas: Rc<RefCell<Canvas>>,
    from: (f32, f32),
    to: (f32, f32),
}

impl Command for MoveShape {
    fn execute(&mut self) -> Result<(), CommandError> {
        self.canvas.borrow_mut().shape = self.to;
        Ok(())
    }

    fn had_effect(&self) -> bool {
        self.from != self.to
    }

    fn as_undoable_mut(&mut self) -> Option<&mut dyn Undoable> {
        Some(self)
    }

    fn into_undoable(self: Box<Self>) -> Option<Box<dyn Undoable>> {
        Some(self)
    }
}

impl Undoable for MoveShape {
    fn undo(&mut self) -> Result<(), CommandError> {
        self.canvas.borrow_mut().shape = self.from;
        Ok(())
    }

    fn redo(&mut self) -> Result<(), CommandError> {
        self.execute()
    }

    fn undo_name(&self) -> String {
        "move shape".to_string()
    }
}

/// Stores the text of a text field
struct Rename {
    saved: Rc<RefCell<Vec<String>>>,
    text: String,
}

impl Command for Rename {
    fn execute(&mut self) -> Result<(), CommandError> {
        self.saved.borrow_mut().push(self.text.clone());
        Ok(())
    }
}

struct Zoom {
    canvas: Rc<RefCell<Canvas>>,
    step: f32,
}

impl Command for Zoom {
    fn execute(&mut self) -> Result<(), CommandError> {
        self.canvas.borrow_mut().zoom += self.step;
        Ok(())
    }
}

fn down(x: f32) -> UiEvent {
    UiEvent::MouseDown {
        button: MouseButton::Left,
        x,
        y: 0.0,
    }
}

fn up(x: f32) -> UiEvent {
    UiEvent::MouseUp {
        button: MouseButton::Left,
        x,
        y: 0.0,
    }
}

fn moved(x: f32) -> UiEvent {
    UiEvent::MouseMove { x, y: 0.0 }
}

fn move_binding(
    timers: &Rc<TimerQueue>,
    canvas: &Rc<RefCell<Canvas>>,
    continuous: bool,
) -> WidgetBinding<UiEvent, DragData, MoveShape> {
    let c = canvas.clone();
    let builder = WidgetBinding::builder(drag(timers.clone()).unwrap(), move |_: &DragData| {
        let from = c.borrow().shape;
        MoveShape {
            canvas: c.clone(),
            from,
            to: from,
        }
    })
    .then(|cmd, data| {
        let (dx, dy) = data.delta();
        cmd.to = (cmd.from.0 + dx, cmd.from.1 + dy);
    });
    if continuous {
        builder.continuous_execution().bind()
    } else {
        builder.bind()
    }
}

#[test]
fn test_drag_moves_shape_and_registers_undo() {
    let timers = Rc::new(TimerQueue::new());
    let canvas = Rc::new(RefCell::new(Canvas::default()));
    let history = UndoHistory::shared();
    let c = canvas.clone();
    let mut binding = WidgetBinding::builder(drag(timers).unwrap(), move |_: &DragData| {
        let from = c.borrow().shape;
        MoveShape {
            canvas: c.clone(),
            from,
            to: from,
        }
    })
    .then(|cmd, data| {
        let (dx, dy) = data.delta();
        cmd.to = (cmd.from.0 + dx, cmd.from.1 + dy);
    })
    .undo_history(history.clone())
    .bind();

    binding.process_event(down(10.0)).unwrap();
    binding.process_event(moved(20.0)).unwrap();
    binding.process_event(moved(25.0)).unwrap();
    binding.process_event(up(25.0)).unwrap();

    assert_eq!(canvas.borrow().shape, (15.0, 0.0));
    assert_eq!(history.borrow().last_undo_name().as_deref(), Some("move shape"));

    history.borrow_mut().undo().unwrap();
    assert_eq!(canvas.borrow().shape, (0.0, 0.0));
    history.borrow_mut().redo().unwrap();
    assert_eq!(canvas.borrow().shape, (15.0, 0.0));
}

#[test]
fn test_continuous_drag_undone_by_escape() {
    let timers = Rc::new(TimerQueue::new());
    let canvas = Rc::new(RefCell::new(Canvas::default()));
    let mut binding = move_binding(&timers, &canvas, true);

    binding.process_event(down(0.0)).unwrap();
    binding.process_event(moved(8.0)).unwrap();
    assert_eq!(canvas.borrow().shape, (8.0, 0.0));
    assert_eq!(binding.phase(), BindingPhase::CommandExecuting);

    binding
        .process_event(UiEvent::KeyDown {
            key: Key::Escape,
            modifiers: Modifiers::default(),
        })
        .unwrap();

    assert_eq!(canvas.borrow().shape, (0.0, 0.0));
    assert_eq!(binding.phase(), BindingPhase::Cancelled);
    assert_eq!(binding.stats().cancelled, 1);
}

#[test]
fn test_click_without_move_produces_nothing() {
    let timers = Rc::new(TimerQueue::new());
    let canvas = Rc::new(RefCell::new(Canvas::default()));
    let mut binding = move_binding(&timers, &canvas, false);

    binding.process_event(down(3.0)).unwrap();
    binding.process_event(up(3.0)).unwrap();

    assert_eq!(binding.stats().started, 0);
    assert_eq!(binding.phase(), BindingPhase::Idle);
}

#[test]
fn test_double_click_binding() {
    let timers = Rc::new(TimerQueue::new());
    let count = Rc::new(RefCell::new(0));
    let c = count.clone();
    let mut binding = WidgetBinding::builder(double_click(timers.clone()).unwrap(), move |_| {
        let c = c.clone();
        AnonCommand::new("open", move || *c.borrow_mut() += 1)
    })
    .bind();

    // a lone click times out
    binding.process_event(down(0.0)).unwrap();
    binding.process_event(up(0.0)).unwrap();
    for token in timers.advance(Duration::from_millis(300)) {
        binding.fire_timeout(token).unwrap();
    }
    assert_eq!(*count.borrow(), 0);

    for _ in 0..2 {
        binding.process_event(down(0.0)).unwrap();
        binding.process_event(up(0.0)).unwrap();
    }
    assert_eq!(*count.borrow(), 1);
    assert_eq!(binding.stats().executed, 1);
    assert_eq!(binding.stats().cancelled, 0);
}

#[test]
fn test_text_changed_binding_waits_for_pause() {
    let timers = Rc::new(TimerQueue::new());
    let saved = Rc::new(RefCell::new(Vec::new()));
    let s = saved.clone();
    let mut binding = WidgetBinding::builder(text_changed(timers.clone()).unwrap(), move |_| Rename {
        saved: s.clone(),
        text: String::new(),
    })
    .then(|cmd, data| cmd.text.clone_from(&data.text))
    .when(|data| !data.text.is_empty())
    .bind();

    for value in ["f", "fo", "foo"] {
        binding
            .process_event(UiEvent::ValueChanged {
                value: value.to_string(),
            })
            .unwrap();
    }
    assert!(saved.borrow().is_empty());

    for token in timers.advance(Duration::from_millis(1000)) {
        binding.fire_timeout(token).unwrap();
    }
    assert_eq!(*saved.borrow(), vec!["foo".to_string()]);
}

#[test]
fn test_modified_wheel_binding_zooms_per_step() {
    let timers = Rc::new(TimerQueue::new());
    let canvas = Rc::new(RefCell::new(Canvas::default()));
    let c = canvas.clone();
    let mut binding = WidgetBinding::builder(modified_wheel(timers).unwrap(), move |_| Zoom {
        canvas: c.clone(),
        step: 0.0,
    })
    .then(|cmd, data| cmd.step = data.delta_y)
    .bind();

    binding
        .process_event(UiEvent::KeyDown {
            key: Key::Ctrl,
            modifiers: Modifiers::CTRL,
        })
        .unwrap();
    for delta_y in [1.0, 1.0, -0.5] {
        binding
            .process_event(UiEvent::Wheel {
                delta_x: 0.0,
                delta_y,
                modifiers: Modifiers::CTRL,
            })
            .unwrap();
    }
    binding
        .process_event(UiEvent::KeyUp {
            key: Key::Ctrl,
            modifiers: Modifiers::default(),
        })
        .unwrap();

    assert_eq!(canvas.borrow().zoom, 1.5);
    assert_eq!(binding.stats().executed, 3);
    // the run resumed by the recycled key press is cancelled by the release
    assert_eq!(binding.stats().cancelled, 1);
    assert!(!binding.is_running());
}

#[test]
fn test_deferred_drop_execution() {
    let timers = Rc::new(TimerQueue::new());
    let canvas = Rc::new(RefCell::new(Canvas::default()));
    let executor = Rc::new(DeferredExecutor::new());
    let c = canvas.clone();
    let mut binding = WidgetBinding::builder(drag(timers).unwrap(), move |_: &DragData| {
        let from = c.borrow().shape;
        MoveShape {
            canvas: c.clone(),
            from,
            to: (5.0, 5.0),
        }
    })
    .run_async(executor.clone())
    .bind();

    binding.process_event(down(0.0)).unwrap();
    binding.process_event(moved(1.0)).unwrap();
    binding.process_event(up(1.0)).unwrap();
    assert_eq!(canvas.borrow().shape, (0.0, 0.0));

    executor.run_pending();
    assert_eq!(canvas.borrow().shape, (5.0, 5.0));
    assert_eq!(binding.phase(), BindingPhase::Done);
}

#[test]
fn test_binding_sources_never_leak_listeners() {
    let timers = Rc::new(TimerQueue::new());
    let widgets: Vec<Rc<Widget>> = (0..4).map(|i| Rc::new(Widget::new(format!("shape-{i}")))).collect();
    let sink = Rc::new(CollectingErrorSink::new());
    let mut binding = WidgetBinding::builder(drag(timers).unwrap(), |_: &DragData| {
        AnonCommand::new("noop", || {})
    })
    .sources(widgets.iter().map(|w| w.clone() as SharedSource))
    .error_sink(sink.clone())
    .bind();

    for _ in 0..20 {
        binding.process_event(down(0.0)).unwrap();
        assert!(widgets[0].listens_to(event_types::MOUSE_MOVE));
        binding.process_event(moved(1.0)).unwrap();
        binding.process_event(up(1.0)).unwrap();
        assert!(widgets.iter().all(|w| w.listener_count() == 1));

        binding.interaction_mut().unregister_from_all();
        assert!(widgets.iter().all(|w| w.listener_count() == 0));
        binding
            .interaction_mut()
            .register_to(widgets.iter().map(|w| w.clone() as Rc<dyn EventSource>));
    }

    binding.uninstall();
    assert!(widgets.iter().all(|w| w.listener_count() == 0));
    assert!(sink.is_empty());
    assert_eq!(binding.stats().executed, 20);
}

#[test]
fn test_instrument_switches_its_bindings_together() {
    let timers = Rc::new(TimerQueue::new());
    let canvas = Rc::new(RefCell::new(Canvas::default()));
    let sink = Rc::new(CollectingErrorSink::new());
    let (t, c) = (timers.clone(), canvas.clone());
    let mut tool = Instrument::new("hand", move |tool: &mut Instrument<UiEvent>| {
        tool.add_binding(move_binding(&t, &c, false));
        let zoom = c.clone();
        let binding = WidgetBinding::builder(click(t.clone())?, move |_| Zoom {
            canvas: zoom.clone(),
            step: 1.0,
        })
        .error_sink(tool.error_sink())
        .name("zoom-on-click")
        .bind();
        tool.add_binding(binding);
        Ok(())
    })
    .with_error_sink(sink.clone());

    assert_eq!(tool.process_event(&down(0.0)), 0);
    assert_eq!(tool.binding_count(), 0);

    tool.set_activated(true);
    assert_eq!(tool.binding_count(), 2);
    tool.process_event(&down(0.0));
    tool.process_event(&moved(5.0));
    tool.process_event(&up(5.0));
    assert_eq!(canvas.borrow().shape, (5.0, 0.0));
    assert_eq!(canvas.borrow().zoom, 1.0);

    tool.set_activated(false);
    tool.process_event(&down(0.0));
    tool.process_event(&moved(9.0));
    tool.process_event(&up(9.0));
    assert_eq!(canvas.borrow().shape, (5.0, 0.0));
    assert_eq!(canvas.borrow().zoom, 1.0);

    let executed: usize = tool.bindings().map(|binding| binding.stats().executed).sum();
    assert_eq!(executed, 2);
    assert!(sink.is_empty());

    tool.uninstall_bindings();
    assert_eq!(tool.binding_count(), 0);
}
