//! Chat triggers: `!cmd` and `/cmd` typed into `say` or `say_team`.

use super::{CommandArgs, CommandCallingContext, CommandTable};
use crate::result::{HookMode, HookResult};
use tracing::debug;

/// Outcome of dispatching a chat line as a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatDispatch {
    /// Name of the synthetic command.
    pub command: String,
    pub result: HookResult,
    pub context: CommandCallingContext,
    /// The line used a silent trigger.
    pub silent: bool,
    /// The chat line must not be echoed to other players.
    pub suppress_echo: bool,
}

impl CommandTable {
    /// Dispatches the chat text of a `say` or `say_team` command.
    ///
    /// Returns `None` for any other command, or when the text carries no
    /// trigger. The arguments are left untouched: a silent line is hidden by
    /// superseding the whole `say` when [`ChatDispatch::suppress_echo`] is
    /// set.
    pub fn dispatch_say(&self, caller: i32, args: &CommandArgs, mode: HookMode) -> Option<ChatDispatch> {
        let name = args.name();
        if !name.eq_ignore_ascii_case("say") && !name.eq_ignore_ascii_case("say_team") {
            return None;
        }
        self.dispatch_text(caller, args.arg_s(), mode)
    }

    /// Dispatches one chat line.
    ///
    /// The trigger is stripped and the remainder tokenized as a command run
    /// with [`CommandCallingContext::Chat`]. When a silent trigger resolves
    /// to `Handled` or worse in `Pre`, the trailing control byte of
    /// `message` is removed so the line is not echoed.
    pub fn dispatch_chat(&self, caller: i32, message: &mut String, mode: HookMode) -> Option<ChatDispatch> {
        let chat = self.dispatch_text(caller, message, mode)?;
        if chat.suppress_echo && message.chars().last().is_some_and(char::is_control) {
            message.pop();
        }
        Some(chat)
    }

    fn dispatch_text(&self, caller: i32, message: &str, mode: HookMode) -> Option<ChatDispatch> {
        let text = strip_quotes(message.trim_end_matches(|c: char| c.is_control()));

        let (prefix, silent) = match self.triggers.silent_prefix(text) {
            Some(prefix) => (prefix, true),
            None => (self.triggers.public_prefix(text)?, false),
        };

        let args = CommandArgs::tokenize(&text[prefix.len()..]);
        if args.is_empty() {
            return None;
        }

        let command = args.name().to_string();
        debug!("💬 Chat command {} from caller {} (silent: {})", command, caller, silent);

        let result =
            self.execute_command_callbacks(&command, caller, &args, mode, CommandCallingContext::Chat);

        let suppress_echo = silent && mode == HookMode::Pre && result.suppresses();

        Some(ChatDispatch {
            command,
            result,
            context: CommandCallingContext::Chat,
            silent,
            suppress_echo,
        })
    }
}

fn strip_quotes(text: &str) -> &str {
    let text = text.strip_prefix('"').unwrap_or(text);
    text.strip_suffix('"').unwrap_or(text)
}
