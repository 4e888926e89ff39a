//! End-to-end dispatch behavior across the tables.

use hook_dispatch::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

fn setup() -> (Arc<LoopbackEngine>, Arc<HookDispatch>) {
    let engine = Arc::new(LoopbackEngine::new());
    engine.add_game_event("round_start");
    let dispatch = create_hook_dispatch(EngineServices::from_engine(engine.clone()), ChatTriggers::default());
    (engine, dispatch)
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn command(log: &Log, tag: &'static str, result: HookResult) -> CommandListener {
    let log = log.clone();
    CommandListener::new(move |_, _, _| {
        log.lock().unwrap().push(tag);
        result
    })
}

#[test]
fn test_kick_stop_skips_later_listeners() {
    let (_engine, dispatch) = setup();
    let log: Log = Arc::default();

    dispatch
        .commands
        .add_listener("kick", command(&log, "L1", HookResult::Continue), HookMode::Pre)
        .unwrap();
    dispatch
        .commands
        .add_listener("kick", command(&log, "L2", HookResult::Stop), HookMode::Pre)
        .unwrap();
    dispatch
        .commands
        .add_listener("kick", command(&log, "L3", HookResult::Continue), HookMode::Pre)
        .unwrap();

    let args = CommandArgs::tokenize("kick 5");
    let result = dispatch.commands.execute_command_callbacks(
        "kick",
        0,
        &args,
        HookMode::Pre,
        CommandCallingContext::Console,
    );
    assert_eq!(result, HookResult::Stop);
    assert_eq!(*log.lock().unwrap(), vec!["L1", "L2"]);
    assert_eq!(
        dispatch.commands.dispatch_con_command(-1, &args, HookMode::Pre),
        ReturnAction::Supercede
    );
}

#[test]
fn test_command_lookup_ignores_case() {
    let (_engine, dispatch) = setup();
    let log: Log = Arc::default();
    dispatch
        .commands
        .add_listener("Kick", command(&log, "kick", HookResult::Changed), HookMode::Pre)
        .unwrap();

    for line in ["kick 1", "KICK 1", "kIcK 1"] {
        let args = CommandArgs::tokenize(line);
        dispatch.commands.dispatch_con_command(-1, &args, HookMode::Pre);
    }
    assert_eq!(log.lock().unwrap().len(), 3);
    assert_eq!(dispatch.commands.len(), 1);
}

#[test]
fn test_post_visits_every_listener_once_and_keeps_maximum() {
    let (_engine, dispatch) = setup();
    let log: Log = Arc::default();
    dispatch
        .commands
        .add_listener("", command(&log, "global", HookResult::Changed), HookMode::Post)
        .unwrap();
    dispatch
        .commands
        .add_listener("ban", command(&log, "a", HookResult::Stop), HookMode::Post)
        .unwrap();
    dispatch
        .commands
        .add_listener("ban", command(&log, "b", HookResult::Continue), HookMode::Post)
        .unwrap();

    let args = CommandArgs::tokenize("ban 4");
    let result = dispatch.commands.execute_command_callbacks(
        "ban",
        0,
        &args,
        HookMode::Post,
        CommandCallingContext::Console,
    );
    assert_eq!(result, HookResult::Stop);
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "global"]);
}

#[test]
fn test_register_then_unregister_leaves_dispatch_unchanged() {
    let (_engine, dispatch) = setup();
    let log: Log = Arc::default();
    dispatch
        .commands
        .add_listener("kick", command(&log, "kept", HookResult::Continue), HookMode::Pre)
        .unwrap();

    let transient = command(&log, "transient", HookResult::Handled);
    dispatch
        .commands
        .add_listener("kick", transient.clone(), HookMode::Pre)
        .unwrap();
    dispatch
        .commands
        .remove_listener("kick", &transient, HookMode::Pre)
        .unwrap();

    let args = CommandArgs::tokenize("kick");
    assert_eq!(
        dispatch.commands.dispatch_con_command(-1, &args, HookMode::Pre),
        ReturnAction::Ignored
    );
    assert_eq!(*log.lock().unwrap(), vec!["kept"]);
}

#[test]
fn test_output_catch_all_fires_once() {
    let (_engine, dispatch) = setup();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    dispatch
        .outputs
        .hook_output(
            "*",
            "*",
            OutputListener::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                HookResult::Continue
            }),
            HookMode::Pre,
        )
        .unwrap();

    let fire = OutputFire {
        output: "OnUser1",
        classname: Some("button"),
        activator: None,
        caller: Some(12),
        delay: 0.0,
    };
    for expected in 1..=3 {
        let firing = dispatch.outputs.on_fire_output(&fire);
        assert_eq!(firing.action(), ReturnAction::Ignored);
        dispatch.outputs.on_fire_output_post(firing, &fire);
        assert_eq!(calls.load(Ordering::SeqCst), expected);
    }
}

#[test]
fn test_unhooked_event_keeps_depth() {
    let (engine, dispatch) = setup();
    let event = engine.create_event("round_start", false).unwrap();

    assert_eq!(dispatch.events.depth(), 0);
    let outcome = dispatch.events.on_fire_event(event, false);
    assert_eq!(outcome.action, ReturnAction::Ignored);
    assert_eq!(dispatch.events.on_fire_event_post(event, false), HookResult::Continue);
    assert_eq!(dispatch.events.depth(), 0);
}

#[test]
fn test_nested_event_frames_pop_in_lifo_order() {
    let (engine, dispatch) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_ref = seen.clone();
    dispatch
        .events
        .hook_event(
            "round_start",
            EventListener::new(move |_, _, dont_broadcast| {
                seen_ref.lock().unwrap().push(dont_broadcast);
                HookResult::Continue
            }),
            HookMode::Post,
        )
        .unwrap();

    let weak: Weak<HookDispatch> = Arc::downgrade(&dispatch);
    let inner_engine = engine.clone();
    let fired = Arc::new(AtomicUsize::new(0));
    dispatch
        .events
        .hook_event(
            "round_start",
            EventListener::new(move |_, _, _| {
                if fired.fetch_add(1, Ordering::SeqCst) == 0 {
                    let Some(dispatch) = weak.upgrade() else {
                        return HookResult::Continue;
                    };
                    let inner = inner_engine.create_event("round_start", false).unwrap();
                    dispatch.events.on_fire_event(inner, true);
                    dispatch.events.on_fire_event_post(inner, true);
                }
                HookResult::Continue
            }),
            HookMode::Pre,
        )
        .unwrap();

    let outer = engine.create_event("round_start", false).unwrap();
    dispatch.events.on_fire_event(outer, false);
    assert_eq!(dispatch.events.depth(), 1);
    dispatch.events.on_fire_event_post(outer, false);

    assert_eq!(dispatch.events.depth(), 0);
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    assert_eq!(engine.duplicated_count(), 2);
    assert_eq!(engine.freed_count(), 2);
}

#[test]
fn test_entry_survives_unhook_while_outer_dispatch_in_flight() {
    let (engine, dispatch) = setup();
    let weak = Arc::downgrade(&dispatch);
    let inner_engine = engine.clone();

    // Pre listener that removes itself, then fires the same event again.
    let pre_slot: Arc<Mutex<Option<EventListener>>> = Arc::default();
    let pre_slot_ref = pre_slot.clone();
    let observed_refs = Arc::new(Mutex::new(None));
    let observed_ref = observed_refs.clone();
    let pre = EventListener::new(move |name, _, _| {
        let Some(dispatch) = weak.upgrade() else {
            return HookResult::Continue;
        };
        if let Some(me) = pre_slot_ref.lock().unwrap().take() {
            dispatch.events.unhook_event(name, &me, HookMode::Pre).unwrap();

            let inner = inner_engine.create_event(name, false).unwrap();
            dispatch.events.on_fire_event(inner, true);
            dispatch.events.on_fire_event_post(inner, true);

            *observed_ref.lock().unwrap() = dispatch.events.find(name).map(|hook| hook.ref_count());
        }
        HookResult::Continue
    });
    *pre_slot.lock().unwrap() = Some(pre.clone());

    // Post listener that removes itself on the inner firing.
    let post_slot: Arc<Mutex<Option<EventListener>>> = Arc::default();
    let post_slot_ref = post_slot.clone();
    let weak_post = Arc::downgrade(&dispatch);
    let post = EventListener::new(move |name, _, _| {
        if let (Some(dispatch), Some(me)) = (weak_post.upgrade(), post_slot_ref.lock().unwrap().take()) {
            dispatch.events.unhook_event(name, &me, HookMode::Post).unwrap();
        }
        HookResult::Continue
    });
    *post_slot.lock().unwrap() = Some(post.clone());

    dispatch.events.hook_event("round_start", pre, HookMode::Pre).unwrap();
    dispatch.events.hook_event("round_start", post, HookMode::Post).unwrap();

    let outer = engine.create_event("round_start", false).unwrap();
    dispatch.events.on_fire_event(outer, false);

    // No listeners remain, but the outer frame still holds the entry.
    assert_eq!(*observed_refs.lock().unwrap(), Some(1));
    assert!(dispatch.events.find("round_start").is_some());

    dispatch.events.on_fire_event_post(outer, false);
    assert!(dispatch.events.find("round_start").is_none());
    assert_eq!(dispatch.events.depth(), 0);
}

#[test]
fn test_superseded_event_is_freed_by_dispatch() {
    let (engine, dispatch) = setup();
    dispatch
        .events
        .hook_event(
            "round_start",
            EventListener::new(|_, _, _| HookResult::Stop),
            HookMode::Pre,
        )
        .unwrap();

    let info = dispatch.events.create_event("round_start", false).unwrap();
    dispatch.events.fire_event(info, false);

    for fired in engine.take_fired() {
        let outcome = dispatch.events.on_fire_event(fired.event, fired.dont_broadcast);
        assert_eq!(outcome.action, ReturnAction::Supercede);
        dispatch.events.on_fire_event_post(fired.event, fired.dont_broadcast);
        assert!(!engine.is_live(fired.event));
    }
    assert_eq!(engine.live_event_count(), 0);
    assert_eq!(dispatch.events.free_list_len(), 1);
}

#[test]
fn test_message_global_then_per_id() {
    let (_engine, dispatch) = setup();
    let log: Log = Arc::default();
    let global_log = log.clone();
    dispatch
        .messages
        .hook_message(
            0,
            MessageListener::new(move |_| {
                global_log.lock().unwrap().push("global");
                HookResult::Continue
            }),
            HookMode::Pre,
        )
        .unwrap();
    let id_log = log.clone();
    dispatch
        .messages
        .hook_message(
            118,
            MessageListener::new(move |msg| {
                id_log.lock().unwrap().push("id");
                msg.set_recipients(0);
                HookResult::Handled
            }),
            HookMode::Pre,
        )
        .unwrap();

    let mut message = UserMessage::new(118, u64::MAX, MessageHandle(1));
    assert_eq!(
        dispatch.messages.on_send_message(&mut message, HookMode::Pre),
        ReturnAction::Supercede
    );
    assert_eq!(message.recipients(), 0);
    assert_eq!(*log.lock().unwrap(), vec!["global", "id"]);

    let mut other = UserMessage::new(7, 1, MessageHandle(2));
    assert_eq!(
        dispatch.messages.on_send_message(&mut other, HookMode::Pre),
        ReturnAction::Ignored
    );
}
