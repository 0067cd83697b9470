use chumsky::error::Rich;
use chumsky::prelude::{any, choice, end, just};
use chumsky::{extra, text, Boxed, IterParser, Parser};

pub const FILE_COMMAND: &str = "file";
pub const RUN_COMMAND: &str = "run";
pub const RUN_COMMAND_SHORT: &str = "r";
pub const ATTACH_COMMAND: &str = "attach";
pub const CONTINUE_COMMAND: &str = "continue";
pub const CONTINUE_COMMAND_SHORT: &str = "c";
pub const NEXT_COMMAND: &str = "next";
pub const NEXT_COMMAND_SHORT: &str = "n";
pub const STEP_COMMAND: &str = "step";
pub const STEP_COMMAND_SHORT: &str = "s";
pub const FINISH_COMMAND: &str = "finish";
pub const INTERRUPT_COMMAND: &str = "interrupt";
pub const INTERRUPT_COMMAND_ALIAS: &str = "pause";
pub const BREAK_COMMAND: &str = "break";
pub const BREAK_COMMAND_SHORT: &str = "b";
pub const BREAK_REMOVE_SUBCOMMAND: &str = "remove";
pub const BREAK_INFO_SUBCOMMAND: &str = "info";
pub const THREAD_COMMAND: &str = "thread";
pub const THREAD_INFO_SUBCOMMAND: &str = "info";
pub const HELP_COMMAND: &str = "help";
pub const HELP_COMMAND_SHORT: &str = "h";
pub const QUIT_COMMAND: &str = "quit";
pub const QUIT_COMMAND_SHORT: &str = "q";

type Err<'a> = extra::Err<Rich<'a, char>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    File { program: String, args: Vec<String> },
    Run,
    Attach(u32),
    Continue,
    Next,
    Step,
    Finish,
    Interrupt,
    BreakAdd { file: String, line: u32 },
    BreakRemove(u32),
    BreakInfo,
    ThreadInfo,
    Help(Option<String>),
    Quit,
}

fn word<'a>() -> impl Parser<'a, &'a str, String, Err<'a>> + Clone {
    any()
        .filter(|c: &char| !c.is_whitespace())
        .repeated()
        .at_least(1)
        .to_slice()
        .map(ToString::to_string)
        .padded()
}

fn int<'a>() -> impl Parser<'a, &'a str, u32, Err<'a>> + Clone {
    text::int(10).try_map(|s: &str, span| {
        s.parse::<u32>()
            .map_err(|e| Rich::custom(span, format!("invalid number {s}: {e}")))
    })
}

fn number<'a>() -> impl Parser<'a, &'a str, u32, Err<'a>> + Clone {
    int().padded()
}

fn location<'a>() -> impl Parser<'a, &'a str, CliCommand, Err<'a>> {
    any()
        .filter(|c: &char| *c != ':')
        .repeated()
        .at_least(1)
        .to_slice()
        .then_ignore(just(':'))
        .then(int())
        .map(|(file, line): (&str, u32)| CliCommand::BreakAdd {
            file: file.trim().to_string(),
            line,
        })
        .padded()
        .labelled("<file>:<line>")
}

fn command<'a, I>(ctx: &'static str, inner: I) -> Boxed<'a, 'a, &'a str, CliCommand, Err<'a>>
where
    I: Parser<'a, &'a str, CliCommand, Err<'a>> + 'a,
{
    inner.then_ignore(end()).labelled(ctx).boxed()
}

impl CliCommand {
    /// Parse input string into command.
    pub fn parse(input: &str) -> anyhow::Result<CliCommand> {
        Self::parser()
            .parse(input)
            .into_result()
            .map_err(|e| anyhow::anyhow!("{}", e[0]))
    }

    fn parser<'a>() -> impl Parser<'a, &'a str, CliCommand, Err<'a>> {
        let op = |sym| just(sym).padded();
        let op2 = |full, short| op(full).or(op(short));

        let file = op(FILE_COMMAND)
            .ignore_then(word().repeated().at_least(1).collect::<Vec<_>>())
            .map(|mut words| {
                let program = words.remove(0);
                CliCommand::File {
                    program,
                    args: words,
                }
            });
        let run = op2(RUN_COMMAND, RUN_COMMAND_SHORT).to(CliCommand::Run);
        let attach = op(ATTACH_COMMAND)
            .ignore_then(number())
            .map(CliCommand::Attach);
        let r#continue = op2(CONTINUE_COMMAND, CONTINUE_COMMAND_SHORT).to(CliCommand::Continue);
        let next = op2(NEXT_COMMAND, NEXT_COMMAND_SHORT).to(CliCommand::Next);
        let step = op2(STEP_COMMAND, STEP_COMMAND_SHORT).to(CliCommand::Step);
        let finish = op(FINISH_COMMAND).to(CliCommand::Finish);
        let interrupt =
            op2(INTERRUPT_COMMAND, INTERRUPT_COMMAND_ALIAS).to(CliCommand::Interrupt);

        let r#break = op2(BREAK_COMMAND, BREAK_COMMAND_SHORT)
            .ignore_then(choice((
                op(BREAK_REMOVE_SUBCOMMAND)
                    .ignore_then(number())
                    .map(CliCommand::BreakRemove),
                op(BREAK_INFO_SUBCOMMAND).to(CliCommand::BreakInfo),
                location(),
            )))
            .boxed();

        let thread = op(THREAD_COMMAND)
            .then(op(THREAD_INFO_SUBCOMMAND))
            .to(CliCommand::ThreadInfo);

        let help = op2(HELP_COMMAND, HELP_COMMAND_SHORT)
            .ignore_then(text::ident().or_not())
            .map(|s: Option<&str>| CliCommand::Help(s.map(ToOwned::to_owned)))
            .padded();

        let quit = op2(QUIT_COMMAND, QUIT_COMMAND_SHORT).to(CliCommand::Quit);

        choice((
            command(FILE_COMMAND, file),
            command(RUN_COMMAND, run),
            command(ATTACH_COMMAND, attach),
            command(CONTINUE_COMMAND, r#continue),
            command(NEXT_COMMAND, next),
            command(STEP_COMMAND, step),
            command(FINISH_COMMAND, finish),
            command(INTERRUPT_COMMAND, interrupt),
            command(BREAK_COMMAND, r#break),
            command(THREAD_COMMAND, thread),
            command(HELP_COMMAND, help),
            command(QUIT_COMMAND, quit),
        ))
        .map_err(|e: Rich<'a, char>| {
            let span = e.span();
            if span.start == 0 && span.end == 0 {
                Rich::custom(*e.span(), "type help for list of commands")
            } else {
                e
            }
        })
    }
}
