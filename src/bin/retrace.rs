use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use stack_retrace_rs::sourcemap::{ParsedSourceMap, resolve_with_context};
use stack_retrace_rs::{extract_frames, retrace_file};

#[derive(Parser)]
#[command(
    name = "retrace",
    version,
    about = "Deobfuscate stack traces and resolve source map positions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a generated line/column against a source map
    Resolve {
        /// source map JSON file
        map: PathBuf,
        /// 1-based line in the generated output
        #[arg(short, long)]
        line: u32,
        /// 1-based column in the generated output
        #[arg(short, long)]
        column: u32,
        /// context lines around the snippet
        #[arg(long, default_value_t = 3)]
        context: usize,
    },
    /// Extract file:line:column frames from a stack trace
    Frames {
        /// trace file, or `-` for stdin
        trace: String,
    },
    /// Retrace an obfuscated stack trace with a ProGuard mapping file
    Retrace {
        /// ProGuard/R8 mapping.txt
        mapping: PathBuf,
        /// trace file, or `-` for stdin
        trace: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Resolve {
            map,
            line,
            column,
            context,
        } => {
            let json = fs::read_to_string(&map)?;
            let parsed = ParsedSourceMap::parse(&json)?;
            match resolve_with_context(&parsed, line, column, context) {
                Some(position) => {
                    println!("{}:{}:{}", position.source, position.line, position.column);
                    if let Some(name) = &position.name {
                        println!("symbol: {name}");
                    }
                    if let Some(snippet) = &position.snippet {
                        println!("{snippet}");
                    }
                }
                None => eprintln!("[RESOLVE] no mapping for {line}:{column}"),
            }
        }
        Command::Frames { trace } => {
            let text = read_input(&trace)?;
            let mut count = 0usize;
            for frame in extract_frames(&text) {
                println!("{}:{}:{}", frame.file, frame.line, frame.column);
                count += 1;
            }
            eprintln!("[FRAMES] extracted {count} frames");
        }
        Command::Retrace { mapping, trace } => {
            let text = read_input(&trace)?;
            let out = retrace_file(&mapping, &text);
            print!("{out}");
            if !out.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

fn read_input(path: &str) -> io::Result<String> {
    if path == "-" {
        if io::stdin().is_terminal() {
            eprintln!("[INPUT] reading trace from stdin, end with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path)
    }
}
