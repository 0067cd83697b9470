use chumsky::error::Rich;
use chumsky::prelude::{any, choice, end, just, none_of};
use chumsky::{extra, text, IterParser, Parser};
use itertools::Itertools;

pub const FILE_EXEC_AND_SYMBOLS_COMMAND: &str = "file-exec-and-symbols";
pub const EXEC_ARGUMENTS_COMMAND: &str = "exec-arguments";
pub const EXEC_RUN_COMMAND: &str = "exec-run";
pub const EXEC_CONTINUE_COMMAND: &str = "exec-continue";
pub const EXEC_INTERRUPT_COMMAND: &str = "exec-interrupt";
pub const EXEC_NEXT_COMMAND: &str = "exec-next";
pub const EXEC_STEP_COMMAND: &str = "exec-step";
pub const EXEC_FINISH_COMMAND: &str = "exec-finish";
pub const TARGET_ATTACH_COMMAND: &str = "target-attach";
pub const BREAK_INSERT_COMMAND: &str = "break-insert";
pub const BREAK_DELETE_COMMAND: &str = "break-delete";
pub const BREAK_LIST_COMMAND: &str = "break-list";
pub const THREAD_INFO_COMMAND: &str = "thread-info";
pub const GDB_EXIT_COMMAND: &str = "gdb-exit";

type Err<'a> = extra::Err<Rich<'a, char>>;

/// One MI input record: `[token]-operation [arg ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiCommand {
    pub token: Option<u64>,
    pub operation: String,
    pub args: Vec<String>,
}

fn c_string<'a>() -> impl Parser<'a, &'a str, String, Err<'a>> + Clone {
    let escape = just('\\').ignore_then(choice((
        just('n').to('\n'),
        just('t').to('\t'),
        just('r').to('\r'),
        just('"'),
        just('\\'),
    )));

    none_of("\\\"")
        .or(escape)
        .repeated()
        .collect::<String>()
        .delimited_by(just('"'), just('"'))
        .labelled("c-string")
}

fn word<'a>() -> impl Parser<'a, &'a str, String, Err<'a>> + Clone {
    any()
        .filter(|c: &char| !c.is_whitespace() && *c != '"')
        .repeated()
        .at_least(1)
        .to_slice()
        .map(ToString::to_string)
        .labelled("argument")
}

fn parser<'a>() -> impl Parser<'a, &'a str, MiCommand, Err<'a>> {
    let token = text::int(10)
        .try_map(|s: &str, span| {
            s.parse::<u64>()
                .map_err(|e| Rich::custom(span, format!("invalid token {s}: {e}")))
        })
        .or_not();

    let operation = just('-')
        .ignore_then(
            any()
                .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .repeated()
                .at_least(1)
                .to_slice(),
        )
        .labelled("mi command");

    let args = c_string()
        .or(word())
        .padded()
        .repeated()
        .collect::<Vec<_>>();

    token
        .then(operation)
        .then(args)
        .then_ignore(end())
        .map(
            |((token, operation), args): ((Option<u64>, &str), Vec<String>)| MiCommand {
                token,
                operation: operation.to_string(),
                args,
            },
        )
}

impl MiCommand {
    /// Parse a single input line.
    pub fn parse(input: &str) -> anyhow::Result<MiCommand> {
        parser()
            .parse(input.trim())
            .into_result()
            .map_err(|e| anyhow::anyhow!("{}", e.iter().join(", ")))
    }
}

/// Leading token of a line that failed to parse, so the error record still carries it.
pub fn token_prefix(input: &str) -> &str {
    let input = input.trim_start();
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    &input[..end]
}

/// Escape a string for use inside an MI c-string.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Render a c-string constant.
pub fn quote(s: &str) -> String {
    format!("\"{}\"", escape(s))
}
