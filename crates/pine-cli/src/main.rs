use pine_parser::error_fmt::format_compile_error;
use pine_parser::{parse_source, tokenize};
use pine_transpiler::{CompileError, CompileOptions, ErrorKind, Language, compile};
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ─────────────────────────────────────────────────────────────────────────────
// Flag definitions: one table drives both argument parsing and help text
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    EmitStage1,
    EmitTokens,
    EmitAst,
    Debug,
    LineNumbers,
    Pine,
    Script,
    ExpectVersion,
    Output,
    Help,
}

struct FlagDef {
    flag: Flag,
    name: &'static str,
    aliases: &'static [&'static str],
    /// Placeholder shown in help when the flag takes a value
    value: Option<&'static str>,
    description: &'static str,
}

const FLAGS: &[FlagDef] = &[
    FlagDef {
        flag: Flag::EmitStage1,
        name: "--emit-stage1",
        aliases: &[],
        value: None,
        description: "Print the Stage-1 script instead of the final code",
    },
    FlagDef {
        flag: Flag::EmitTokens,
        name: "--emit-tokens",
        aliases: &[],
        value: None,
        description: "Print the indicator-language token stream",
    },
    FlagDef {
        flag: Flag::EmitAst,
        name: "--emit-ast",
        aliases: &[],
        value: None,
        description: "Dump the indicator-language AST",
    },
    FlagDef {
        flag: Flag::Debug,
        name: "--debug",
        aliases: &["-d"],
        value: None,
        description: "Log pipeline stages and the compiled listing to stderr",
    },
    FlagDef {
        flag: Flag::LineNumbers,
        name: "--line-numbers",
        aliases: &["-n"],
        value: None,
        description: "Number the lines of the printed code",
    },
    FlagDef {
        flag: Flag::Pine,
        name: "--pine",
        aliases: &[],
        value: None,
        description: "Treat the input as indicator source (pragma required)",
    },
    FlagDef {
        flag: Flag::Script,
        name: "--script",
        aliases: &[],
        value: None,
        description: "Treat the input as a script and skip Stage 1",
    },
    FlagDef {
        flag: Flag::ExpectVersion,
        name: "--expect-version",
        aliases: &[],
        value: Some("<n>"),
        description: "Reject sources whose pragma names another version",
    },
    FlagDef {
        flag: Flag::Output,
        name: "--output",
        aliases: &["-o"],
        value: Some("<file>"),
        description: "Write the result to a file instead of stdout",
    },
    FlagDef {
        flag: Flag::Help,
        name: "--help",
        aliases: &["-h"],
        value: None,
        description: "Show this help message",
    },
];

const EXIT_REJECTED: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_INTERNAL: i32 = 3;

/// What the invocation prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Emit {
    #[default]
    Code,
    Stage1,
    Tokens,
    Ast,
}

#[derive(Debug, Default)]
struct Invocation {
    /// `-` reads standard input
    input: String,
    output: Option<PathBuf>,
    emit: Emit,
    line_numbers: bool,
    options: CompileOptions,
}

enum Parsed {
    Run(Invocation),
    Help,
}

fn lookup(arg: &str) -> Option<&'static FlagDef> {
    FLAGS
        .iter()
        .find(|def| def.name == arg || def.aliases.contains(&arg))
}

fn parse_args(args: &[String]) -> Result<Parsed, String> {
    let mut invocation = Invocation::default();
    let mut input = None;
    let mut language = None;
    let mut emit = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-" || !arg.starts_with('-') {
            if input.replace(arg.clone()).is_some() {
                return Err(format!("unexpected extra input '{}'", arg));
            }
            continue;
        }

        // `--flag=value` is accepted for flags that take a value
        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        let def = lookup(name).ok_or_else(|| format!("unknown option '{}'", name))?;
        let value = match (def.value, inline) {
            (Some(_), Some(value)) => Some(value),
            (Some(placeholder), None) => Some(
                iter.next()
                    .cloned()
                    .ok_or_else(|| format!("{} expects {}", def.name, placeholder))?,
            ),
            (None, Some(_)) => return Err(format!("{} does not take a value", def.name)),
            (None, None) => None,
        };

        match def.flag {
            Flag::Help => return Ok(Parsed::Help),
            Flag::EmitStage1 | Flag::EmitTokens | Flag::EmitAst => {
                let wanted = match def.flag {
                    Flag::EmitStage1 => Emit::Stage1,
                    Flag::EmitTokens => Emit::Tokens,
                    _ => Emit::Ast,
                };
                if emit.replace(wanted).is_some_and(|previous| previous != wanted) {
                    return Err("only one --emit-* option may be given".to_string());
                }
            }
            Flag::Pine | Flag::Script => {
                let wanted = if def.flag == Flag::Pine {
                    Language::Pine
                } else {
                    Language::Script
                };
                if language.replace(wanted).is_some_and(|previous| previous != wanted) {
                    return Err("--pine and --script are mutually exclusive".to_string());
                }
            }
            Flag::Debug => invocation.options.debug = true,
            Flag::LineNumbers => invocation.line_numbers = true,
            Flag::ExpectVersion => {
                let raw = value.unwrap_or_default();
                let version = raw
                    .parse::<u32>()
                    .map_err(|_| format!("--expect-version expects a number, got '{}'", raw))?;
                invocation.options.expected_version = Some(version);
            }
            Flag::Output => invocation.output = value.map(PathBuf::from),
        }
    }

    invocation.input = input.ok_or_else(|| "missing input file".to_string())?;
    invocation.emit = emit.unwrap_or_default();
    invocation.options.language = language.unwrap_or_default();
    invocation.options.include_line_numbers = invocation.line_numbers;
    if invocation.emit != Emit::Code && invocation.options.language == Language::Script {
        return Err("--script input has no indicator-language artifacts".to_string());
    }
    Ok(Parsed::Run(invocation))
}

fn print_usage() {
    eprintln!(
        "pinec - indicator language to context-script compiler\n\
         \n\
         USAGE:\n\
         \x20   pinec <file> [OPTIONS]\n\
         \x20   pinec - [OPTIONS]          Read the source from stdin\n\
         \n\
         OPTIONS:"
    );
    for def in FLAGS {
        let mut names = def.aliases.to_vec();
        names.push(def.name);
        let mut label = names.join(", ");
        if let Some(value) = def.value {
            label = format!("{} {}", label, value);
        }
        eprintln!("    {:<35}{}", label, def.description);
    }
    eprintln!(
        "\nEXIT CODES:\n\
         \x20   0  success\n\
         \x20   1  rejected input (version, syntax or entry-point errors)\n\
         \x20   2  usage error\n\
         \x20   3  internal compiler error\n\
         \n\
         Set RUST_LOG to control logging, e.g. RUST_LOG=pine_transpiler=trace"
    );
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded; keep the existing one
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn read_input(input: &str) -> io::Result<String> {
    if input == "-" {
        let mut source = String::new();
        io::stdin().read_to_string(&mut source)?;
        Ok(source)
    } else {
        fs::read_to_string(input)
    }
}

/// Run one invocation and return what it prints, or an exit code after
/// reporting the failure.
fn run(invocation: &Invocation, source: &str) -> Result<String, i32> {
    let filename = invocation.input.as_str();
    match invocation.emit {
        Emit::Tokens => {
            let tokens = tokenize(source).map_err(|e| {
                eprint!(
                    "{}",
                    format_compile_error(filename, &e.message, source, Some((e.line, e.column)))
                );
                EXIT_REJECTED
            })?;
            debug!(count = tokens.len(), "tokenized");
            Ok(tokens
                .iter()
                .map(|token| format!("{}:{} {:?}\n", token.line, token.column, token.kind))
                .collect())
        }
        Emit::Ast => {
            let program = parse_source(source).map_err(|e| {
                eprint!(
                    "{}",
                    format_compile_error(filename, &e.to_string(), source, Some(e.location()))
                );
                EXIT_REJECTED
            })?;
            Ok(format!("{:#?}\n", program))
        }
        Emit::Code | Emit::Stage1 => {
            let unit = compile(source, &invocation.options).map_err(|e| report(filename, source, &e))?;
            if invocation.emit == Emit::Stage1 {
                return match unit.stage1 {
                    Some(stage1) => Ok(stage1),
                    None => {
                        eprintln!(
                            "error: `{}` was compiled as a script; it has no Stage-1 output",
                            filename
                        );
                        Err(EXIT_USAGE)
                    }
                };
            }
            let mut listing = unit.listing(invocation.line_numbers);
            if !listing.ends_with('\n') {
                listing.push('\n');
            }
            Ok(listing)
        }
    }
}

fn report(filename: &str, source: &str, err: &CompileError) -> i32 {
    match err.kind() {
        ErrorKind::Rejected => {
            eprint!(
                "{}",
                format_compile_error(filename, &err.to_string(), source, err.location())
            );
            EXIT_REJECTED
        }
        ErrorKind::Internal => {
            eprintln!(
                "error: internal compiler error while compiling `{}`\n\n{}\n\nThis is a bug; please report it with the input that triggered it.",
                filename, err
            );
            EXIT_INTERNAL
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        process::exit(EXIT_USAGE);
    }

    let invocation = match parse_args(&args) {
        Ok(Parsed::Run(invocation)) => invocation,
        Ok(Parsed::Help) => {
            print_usage();
            return;
        }
        Err(message) => {
            eprintln!("error: {}\n\nRun `pinec --help` for usage.", message);
            process::exit(EXIT_USAGE);
        }
    };
    init_tracing(invocation.options.debug);

    let source = match read_input(&invocation.input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: failed to read '{}': {}", invocation.input, e);
            process::exit(EXIT_USAGE);
        }
    };

    let printed = match run(&invocation, &source) {
        Ok(printed) => printed,
        Err(code) => process::exit(code),
    };

    match &invocation.output {
        Some(path) => {
            if let Err(e) = fs::write(path, printed) {
                eprintln!("error: failed to write '{}': {}", path.display(), e);
                process::exit(EXIT_REJECTED);
            }
        }
        None => print!("{}", printed),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    fn invocation(list: &[&str]) -> Invocation {
        match parse_args(&args(list)).unwrap() {
            Parsed::Run(invocation) => invocation,
            Parsed::Help => panic!("expected an invocation"),
        }
    }

    #[test]
    fn test_flags_map_onto_options() {
        let inv = invocation(&["demo.pine", "--debug", "-n", "--expect-version", "5", "-o", "out.js"]);
        assert_eq!(inv.input, "demo.pine");
        assert!(inv.options.debug);
        assert!(inv.line_numbers);
        assert!(inv.options.include_line_numbers);
        assert_eq!(inv.options.expected_version, Some(5));
        assert_eq!(inv.output, Some(PathBuf::from("out.js")));
        assert_eq!(inv.emit, Emit::Code);
        assert_eq!(inv.options.language, Language::Auto);

        let inv = invocation(&["--expect-version=6", "--pine", "--emit-stage1", "x.pine"]);
        assert_eq!(inv.options.expected_version, Some(6));
        assert_eq!(inv.options.language, Language::Pine);
        assert_eq!(inv.emit, Emit::Stage1);
    }

    #[test]
    fn test_usage_errors() {
        for bad in [
            &["a.pine", "b.pine"][..],
            &["a.pine", "--bogus"],
            &["a.pine", "--expect-version"],
            &["a.pine", "--expect-version", "five"],
            &["a.pine", "--pine", "--script"],
            &["a.pine", "--emit-ast", "--emit-tokens"],
            &["a.pine", "--debug=yes"],
            &["a.js", "--script", "--emit-ast"],
            &["--debug"],
        ] {
            assert!(parse_args(&args(bad)).is_err(), "{:?} should be rejected", bad);
        }
        assert!(matches!(parse_args(&args(&["-h"])), Ok(Parsed::Help)));
    }

    #[test]
    fn test_every_flag_is_reachable_by_name_and_alias() {
        for def in FLAGS {
            assert_eq!(lookup(def.name).map(|d| d.flag), Some(def.flag));
            for alias in def.aliases {
                assert_eq!(lookup(alias).map(|d| d.flag), Some(def.flag));
            }
        }
    }

    #[test]
    fn test_token_dump() {
        let inv = invocation(&["demo.pine", "--emit-tokens"]);
        let printed = run(&inv, "x = 1\n").unwrap();
        let first = printed.lines().next().unwrap();
        assert_eq!(first, "1:1 Ident(\"x\")");
    }
}
