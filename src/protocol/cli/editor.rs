use super::parser::{
    ATTACH_COMMAND, BREAK_COMMAND, BREAK_COMMAND_SHORT, CONTINUE_COMMAND, CONTINUE_COMMAND_SHORT,
    FILE_COMMAND, FINISH_COMMAND, HELP_COMMAND, HELP_COMMAND_SHORT, INTERRUPT_COMMAND,
    NEXT_COMMAND, NEXT_COMMAND_SHORT, QUIT_COMMAND, QUIT_COMMAND_SHORT, RUN_COMMAND,
    RUN_COMMAND_SHORT, STEP_COMMAND, STEP_COMMAND_SHORT, THREAD_COMMAND,
};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::MemHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Context, Editor, Helper};

struct CommandView {
    short: Option<&'static str>,
    long: &'static str,
}

impl CommandView {
    fn display_with_short(&self) -> String {
        match self.short {
            Some(short) => format!("{}|{short}", self.long),
            None => self.long.to_string(),
        }
    }
}

impl From<&'static str> for CommandView {
    fn from(long: &'static str) -> Self {
        CommandView { short: None, long }
    }
}

impl From<(&'static str, &'static str)> for CommandView {
    fn from((short, long): (&'static str, &'static str)) -> Self {
        CommandView {
            short: Some(short),
            long,
        }
    }
}

pub struct CommandCompleter {
    commands: Vec<CommandView>,
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        let pairs = self
            .commands
            .iter()
            .filter_map(|cmd| {
                cmd.long.starts_with(line).then(|| Pair {
                    display: cmd.display_with_short(),
                    replacement: cmd.long.to_string(),
                })
            })
            .collect();
        Ok((0, pairs))
    }
}

pub struct CliHelper {
    completer: CommandCompleter,
}

impl Completer for CliHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Self::Candidate>)> {
        self.completer.complete(line, pos, ctx)
    }
}

impl Hinter for CliHelper {
    type Hint = String;
}

impl Highlighter for CliHelper {}

impl Validator for CliHelper {}

impl Helper for CliHelper {}

pub fn create_editor() -> anyhow::Result<Editor<CliHelper, MemHistory>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();

    let commands = vec![
        FILE_COMMAND.into(),
        (RUN_COMMAND_SHORT, RUN_COMMAND).into(),
        ATTACH_COMMAND.into(),
        (CONTINUE_COMMAND_SHORT, CONTINUE_COMMAND).into(),
        (NEXT_COMMAND_SHORT, NEXT_COMMAND).into(),
        (STEP_COMMAND_SHORT, STEP_COMMAND).into(),
        FINISH_COMMAND.into(),
        INTERRUPT_COMMAND.into(),
        (BREAK_COMMAND_SHORT, BREAK_COMMAND).into(),
        THREAD_COMMAND.into(),
        (HELP_COMMAND_SHORT, HELP_COMMAND).into(),
        (QUIT_COMMAND_SHORT, QUIT_COMMAND).into(),
    ];

    let helper = CliHelper {
        completer: CommandCompleter { commands },
    };

    let mut editor = Editor::with_history(config, MemHistory::new())?;
    editor.set_helper(Some(helper));
    Ok(editor)
}
