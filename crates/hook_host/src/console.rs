//! Loopback console transport.
//!
//! Plays the part of the engine hook layer for the standalone host: each
//! console line runs through the command `Pre` hook, the built-in command
//! when not superseded, and the `Post` hook. Events fired along the way are
//! then pumped through the event hooks.

use hook_dispatch::{
    CommandArgs, ConsoleHost, GameEventHost, HookDispatch, HookMode, LoopbackEngine, MessageHandle, OutputFire,
    ReturnAction, UserMessage,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const BUILTIN_COMMANDS: [(&str, &str); 7] = [
    ("echo", "Prints its arguments"),
    ("say", "Sends a chat line"),
    ("say_team", "Sends a team chat line"),
    ("fire", "Fires a game event: fire <name> [dont_broadcast]"),
    ("output", "Fires an entity output: output <classname> <output> [caller]"),
    ("usermsg", "Sends a user message: usermsg <id> [recipients]"),
    ("status", "Shows dispatch table sizes"),
];

/// What happened to one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOutcome {
    /// Verdict of the command `Pre` hook.
    pub action: ReturnAction,
    /// The built-in command body ran.
    pub ran: bool,
    /// Game events pumped after the command.
    pub events: usize,
}

pub struct ConsoleTransport {
    engine: Arc<LoopbackEngine>,
    dispatch: Arc<HookDispatch>,
}

impl ConsoleTransport {
    pub fn new(engine: Arc<LoopbackEngine>, dispatch: Arc<HookDispatch>) -> Self {
        for (name, description) in BUILTIN_COMMANDS {
            engine.add_native_command(name, description);
        }
        Self { engine, dispatch }
    }

    /// Runs one line typed by `slot` (`-1` is the server console).
    pub fn execute_line(&self, slot: i32, line: &str) -> LineOutcome {
        let args = CommandArgs::tokenize(line);
        if args.is_empty() {
            return LineOutcome {
                action: ReturnAction::Ignored,
                ran: false,
                events: 0,
            };
        }

        let action = self.dispatch.commands.dispatch_con_command(slot, &args, HookMode::Pre);
        let ran = !action.skips_original();
        if ran {
            self.run_builtin(slot, &args);
        } else {
            debug!("🚫 {} superseded", args.name());
        }
        self.dispatch.commands.dispatch_con_command(slot, &args, HookMode::Post);

        LineOutcome {
            action,
            ran,
            events: self.pump_events(),
        }
    }

    /// Sends every queued engine event through the event hooks.
    pub fn pump_events(&self) -> usize {
        let fired = self.engine.take_fired();
        let count = fired.len();

        for event in fired {
            if let Some(slot) = event.target {
                info!("📡 Event {} sent to client {}", event.name, slot);
            } else {
                let outcome = self.dispatch.events.on_fire_event(event.event, event.dont_broadcast);
                if outcome.action.skips_original() {
                    debug!("🚫 Event {} blocked", event.name);
                } else {
                    info!(
                        "📡 Event {} broadcast (dont_broadcast: {})",
                        event.name, outcome.dont_broadcast
                    );
                }
                self.dispatch
                    .events
                    .on_fire_event_post(event.event, outcome.dont_broadcast);
            }

            if self.engine.is_live(event.event) {
                self.engine.free_event(event.event);
            }
        }
        count
    }

    fn run_builtin(&self, slot: i32, args: &CommandArgs) {
        match args.name().to_lowercase().as_str() {
            "echo" => info!("{}", args.arg_s()),
            "say" => info!("💬 [{}] {}", slot, args.arg_s()),
            "say_team" => info!("💬 [{}] (team) {}", slot, args.arg_s()),
            "fire" => self.fire(args),
            "output" => self.output(args),
            "usermsg" => self.user_message(args),
            "status" => info!("🖥️ {:?}", self.dispatch),
            other => {
                if self.engine.command_exists(other) {
                    debug!("Command {} has no built-in body", other);
                } else {
                    warn!("⚠️ Unknown command: {}", other);
                }
            }
        }
    }

    fn fire(&self, args: &CommandArgs) {
        let name = args.arg(1);
        let dont_broadcast = args.arg(2) == "1";
        match self.dispatch.events.create_event(name, false) {
            Some(info) => self.dispatch.events.fire_event(info, dont_broadcast),
            None => warn!("⚠️ Unknown game event: {}", name),
        }
    }

    fn output(&self, args: &CommandArgs) {
        let classname = args.arg(1);
        let fire = OutputFire {
            output: args.arg(2),
            classname: (!classname.is_empty()).then_some(classname),
            activator: None,
            caller: args.arg(3).parse().ok(),
            delay: 0.0,
        };

        let firing = self.dispatch.outputs.on_fire_output(&fire);
        let action = firing.action();
        if action.skips_original() {
            debug!("🚫 Output {} blocked", fire.output);
        } else {
            info!("Output {} fired on {}", fire.output, classname);
        }
        self.dispatch.outputs.on_fire_output_post(firing, &fire);
    }

    fn user_message(&self, args: &CommandArgs) {
        let Ok(id) = args.arg(1).parse::<i32>() else {
            warn!("⚠️ usermsg needs a numeric id");
            return;
        };
        let recipients = args.arg(2).parse().unwrap_or(u64::MAX);
        let mut message = UserMessage::new(id, recipients, MessageHandle(0));

        let action = self.dispatch.messages.on_send_message(&mut message, HookMode::Pre);
        if action.skips_original() {
            debug!("🚫 User message {} blocked", id);
        } else {
            info!(
                "User message {} sent to {} clients",
                id,
                message.recipient_count()
            );
        }
        self.dispatch.messages.on_send_message(&mut message, HookMode::Post);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hook_dispatch::{
        create_hook_dispatch, ChatTriggers, CommandListener, EngineServices, EventListener, HookResult,
        OutputListener,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transport() -> (Arc<LoopbackEngine>, Arc<HookDispatch>, ConsoleTransport) {
        let engine = Arc::new(LoopbackEngine::new());
        engine.add_game_event("round_start");
        let dispatch = create_hook_dispatch(EngineServices::from_engine(engine.clone()), ChatTriggers::default());
        let console = ConsoleTransport::new(engine.clone(), dispatch.clone());
        (engine, dispatch, console)
    }

    #[test]
    fn test_superseded_builtin_does_not_run() {
        let (engine, dispatch, console) = transport();
        dispatch
            .commands
            .add_listener("fire", CommandListener::new(|_, _, _| HookResult::Handled), HookMode::Pre)
            .unwrap();

        let outcome = console.execute_line(-1, "fire round_start");
        assert_eq!(outcome.action, ReturnAction::Supercede);
        assert!(!outcome.ran);
        assert_eq!(outcome.events, 0);
        assert_eq!(engine.live_event_count(), 0);
    }

    #[test]
    fn test_fired_events_run_through_hooks_and_are_freed() {
        let (engine, dispatch, console) = transport();
        let posts = Arc::new(AtomicUsize::new(0));
        let counter = posts.clone();
        dispatch
            .events
            .hook_event(
                "round_start",
                EventListener::new(move |_, _, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    HookResult::Continue
                }),
                HookMode::Post,
            )
            .unwrap();

        let outcome = console.execute_line(-1, "fire round_start");
        assert!(outcome.ran);
        assert_eq!(outcome.events, 1);
        assert_eq!(posts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.live_event_count(), 0);
        assert_eq!(dispatch.events.depth(), 0);
    }

    #[test]
    fn test_silent_chat_trigger_hides_say() {
        let (_engine, dispatch, console) = transport();
        dispatch
            .commands
            .add_listener("admin", CommandListener::new(|_, _, _| HookResult::Handled), HookMode::Pre)
            .unwrap();

        assert!(!console.execute_line(2, "say /admin").ran);
        assert!(console.execute_line(2, "say !admin").ran);
        assert!(console.execute_line(2, "say hello").ran);
    }

    #[test]
    fn test_output_builtin_reaches_wildcard_listener() {
        let (_engine, dispatch, console) = transport();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        dispatch
            .outputs
            .hook_output(
                "*",
                "OnPressed",
                OutputListener::new(move |fire| {
                    assert_eq!(fire.classname, Some("func_button"));
                    counter.fetch_add(1, Ordering::SeqCst);
                    HookResult::Continue
                }),
                HookMode::Pre,
            )
            .unwrap();

        console.execute_line(-1, "output func_button OnPressed 12");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blank_line_is_ignored() {
        let (_engine, _dispatch, console) = transport();
        let outcome = console.execute_line(-1, "   ");
        assert_eq!(outcome.action, ReturnAction::Ignored);
        assert!(!outcome.ran);
    }
}
