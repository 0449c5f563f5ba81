//! YAML command-line tool for checking, reformatting and inspecting documents.
//!
//! Usage: yml [OPTIONS] [FILE]
//!
//! Options:
//!   --tokens               Print the token stream, one token per line
//!   --events               Print the event stream, one event per line
//!   --check                Check if input decodes (exit 0 if valid, 1 if invalid)
//!   --indent <N>           Indentation width for block collections
//!   --width <N>            Preferred line width
//!   --canonical            Write canonical output
//!   --flow, --block        Force flow or block collections
//!   --explicit-start       Always write "---"
//!   --explicit-end         Always write "..."
//!   --line-break <KIND>    lf, cr or crlf
//!   -o, --output <FILE>    Write output to specified file
//!   -h, --help             Print help
//!   -V, --version          Print version

use libyml::parser::Parser;
use libyml::reader::Reader;
use libyml::scanner::Scanner;
use libyml::{encode_all, DecodeOptions, Documents, EncodeOptions, FlowStyle, LineBreak, Value};
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read, Write};
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Reformat,
    Tokens,
    Events,
    Check,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut mode = Mode::Reformat;
    let mut options = EncodeOptions::from_env();
    let mut output_file: Option<&str> = None;
    let mut input_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return;
            }
            "-V" | "--version" => {
                println!("yml {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--tokens" => set_mode(&mut mode, Mode::Tokens),
            "--events" => set_mode(&mut mode, Mode::Events),
            "--check" => set_mode(&mut mode, Mode::Check),
            "--indent" => {
                i += 1;
                options = options.with_indent(number_argument(&args, i, "--indent"));
            }
            "--width" => {
                i += 1;
                options = options.with_width(number_argument(&args, i, "--width"));
            }
            "--canonical" => options = options.with_canonical(true),
            "--flow" => options = options.with_flow_style(FlowStyle::Flow),
            "--block" => options = options.with_flow_style(FlowStyle::Block),
            "--explicit-start" => options = options.with_explicit_start(true),
            "--explicit-end" => options = options.with_explicit_end(true),
            "--line-break" => {
                i += 1;
                let line_break = match args.get(i).map(String::as_str) {
                    Some("lf") => LineBreak::Lf,
                    Some("cr") => LineBreak::Cr,
                    Some("crlf") => LineBreak::CrLf,
                    Some(other) => {
                        eprintln!("Error: Unknown line break: {}", other);
                        process::exit(1);
                    }
                    None => {
                        eprintln!("Error: --line-break requires an argument");
                        process::exit(1);
                    }
                };
                options = options.with_line_break(line_break);
            }
            "-o" | "--output" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --output requires an argument");
                    process::exit(1);
                }
                output_file = Some(&args[i]);
            }
            "-" => {
                // Explicit stdin
            }
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option: {}", arg);
                process::exit(1);
            }
            _ => {
                if input_path.is_some() {
                    eprintln!("Error: Multiple input paths not supported");
                    process::exit(1);
                }
                input_path = Some(&args[i]);
            }
        }
        i += 1;
    }

    if mode == Mode::Check && output_file.is_some() {
        eprintln!("Error: --check and --output are mutually exclusive");
        process::exit(1);
    }

    let input = read_input(input_path);
    let name = input_path.unwrap_or("<stdin>");
    debug!(name, bytes = input.len(), ?mode, "read input");

    let result = match mode {
        Mode::Tokens => dump_tokens(&input, name).map(String::into_bytes),
        Mode::Events => dump_events(&input, name).map(String::into_bytes),
        Mode::Check => match decode(&input, name) {
            Ok(_) => {
                if let Some(path) = input_path {
                    println!("{}: ok", path);
                }
                return;
            }
            Err(e) => Err(e),
        },
        Mode::Reformat => decode(&input, name).and_then(|values| reformat(&values, &options)),
    };

    match result {
        Ok(output) => write_output(&output, output_file),
        Err(e) => {
            eprintln!("{}: {}", name, e);
            process::exit(1);
        }
    }
}

fn set_mode(mode: &mut Mode, requested: Mode) {
    if *mode != Mode::Reformat && *mode != requested {
        eprintln!("Error: --tokens, --events and --check are mutually exclusive");
        process::exit(1);
    }
    *mode = requested;
}

fn number_argument(args: &[String], i: usize, flag: &str) -> usize {
    match args.get(i).map(|a| a.parse::<usize>()) {
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            eprintln!("Error: {} requires a number, got {}", flag, args[i]);
            process::exit(1);
        }
        None => {
            eprintln!("Error: {} requires a number", flag);
            process::exit(1);
        }
    }
}

fn read_input(input_path: Option<&str>) -> String {
    let raw_bytes: Vec<u8> = match input_path {
        Some(path) => match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Error reading {}: {}", path, e);
                process::exit(1);
            }
        },
        None => {
            let mut buffer = Vec::new();
            if let Err(e) = io::stdin().read_to_end(&mut buffer) {
                eprintln!("Error reading stdin: {}", e);
                process::exit(1);
            }
            buffer
        }
    };
    match String::from_utf8(raw_bytes) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: input is not valid UTF-8: {}", e);
            process::exit(1);
        }
    }
}

fn decode(input: &str, name: &str) -> libyml::Result<Vec<Value>> {
    let options = DecodeOptions::new().with_name(name);
    let values = Documents::with_options(input, &options).collect::<libyml::Result<Vec<_>>>()?;
    debug!(documents = values.len(), "decoded input");
    Ok(values)
}

fn reformat(values: &[Value], options: &EncodeOptions) -> libyml::Result<Vec<u8>> {
    let mut output = Vec::new();
    encode_all(values, &mut output, options)?;
    Ok(output)
}

fn dump_tokens(input: &str, name: &str) -> libyml::Result<String> {
    let mut scanner = Scanner::new(Reader::from_str(input).with_name(name));
    let mut output = String::new();
    while let Some(token) = scanner.get_token()? {
        let _ = writeln!(output, "{}", token);
    }
    Ok(output)
}

fn dump_events(input: &str, name: &str) -> libyml::Result<String> {
    let mut parser = Parser::new(Scanner::new(Reader::from_str(input).with_name(name)));
    let mut output = String::new();
    while let Some(event) = parser.get_event()? {
        let _ = writeln!(output, "{}", event);
    }
    Ok(output)
}

fn write_output(output: &[u8], output_file: Option<&str>) {
    if let Some(path) = output_file {
        if let Err(e) = fs::write(path, output) {
            eprintln!("Error writing {}: {}", path, e);
            process::exit(1);
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        if let Err(e) = handle.write_all(output).and_then(|_| handle.flush()) {
            eprintln!("Error writing to stdout: {}", e);
            process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        "yml - YAML command-line tool

USAGE:
    yml [OPTIONS] [FILE]

ARGS:
    [FILE]    Input file (reads from stdin if not provided)

OPTIONS:
    --tokens               Print the token stream, one token per line
    --events               Print the event stream, one event per line
    --check                Check if input decodes (exit 0 if valid, 1 if invalid)

    --indent <N>           Indentation width for block collections (2-9)
    --width <N>            Preferred line width
    --canonical            Write canonical output with explicit tags
    --flow                 Write every collection in flow style
    --block                Write every collection in block style
    --explicit-start       Always write the \"---\" document marker
    --explicit-end         Always write the \"...\" document marker
    --line-break <KIND>    Line break to write: lf, cr or crlf

    -o, --output <FILE>    Write output to specified file
    -h, --help             Print help
    -V, --version          Print version

ENVIRONMENT:
    YML_INDENT, YML_WIDTH, YML_CANONICAL   Defaults for the layout options
    RUST_LOG                               Log filter, written to stderr

EXAMPLES:
    # Reformat a file with the default layout
    yml config.yml

    # Validate a file
    yml --check config.yml

    # Reformat with block collections and four-space indentation
    yml --block --indent 4 config.yml -o formatted.yml

    # Inspect how a document scans and parses
    yml --tokens config.yml
    yml --events config.yml
"
    );
}
