use std::env;
use std::fs;
use std::process;

use greave::errors::{ErrorMessage, ErrorReporter, ErrorSink};
use greave::lexer::Tokenizer;
use greave::settings::Settings;
use greave::simplify::{simplify_templates, unbalanced_angle_token};
use greave::tokens::TokenList;

/// Sink that renders core events straight through the reporter.
struct ReporterSink<'a> {
    reporter: &'a ErrorReporter,
}

impl ErrorSink for ReporterSink<'_> {
    fn report(&mut self, msg: ErrorMessage) {
        self.reporter.report_message(&msg);
    }
}

/// Print the stream one statement per line, the way the token dump is
/// easiest to diff.
fn print_stream(list: &TokenList) {
    let mut line = String::new();
    let mut cur = list.front();
    while let Some(tok) = cur {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(list.text(tok));
        if matches!(list.text(tok), ";" | "{" | "}") {
            println!("{line}");
            line.clear();
        }
        cur = list.next(tok);
    }
    if !line.is_empty() {
        println!("{line}");
    }
}

fn print_usage() {
    eprintln!("usage: greave [--debug-warnings] [--check-syntax] FILE");
    eprintln!();
    eprintln!("Tokenizes a preprocessed C++ file, eliminates templates from the");
    eprintln!("token stream, and prints the simplified stream.");
}

fn main() {
    let mut settings = Settings::default();
    let mut check_syntax = false;
    let mut filename: Option<String> = None;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--debug-warnings" => settings.debug_warnings = true,
            "--check-syntax" => check_syntax = true,
            "-h" | "--help" => {
                print_usage();
                return;
            }
            _ if arg.starts_with('-') => {
                eprintln!("unknown option: {arg}");
                print_usage();
                process::exit(2);
            }
            _ => filename = Some(arg),
        }
    }

    let Some(filename) = filename else {
        print_usage();
        process::exit(2);
    };

    let source = fs::read_to_string(&filename).unwrap_or_else(|e| {
        eprintln!("cannot read '{filename}': {e}");
        process::exit(1);
    });

    let reporter = ErrorReporter::new(filename.clone(), source.clone());
    let (mut list, lex_errors) = Tokenizer::new(&source, 0).tokenize();
    for err in &lex_errors {
        reporter.report_lex_error(err);
    }

    if check_syntax {
        if let Some(bad) = unbalanced_angle_token(&list) {
            let token = list.token(bad);
            eprintln!(
                "{filename}:{}: unbalanced angle brackets near '{}'",
                token.line,
                list.text(bad)
            );
            process::exit(1);
        }
    }

    let mut sink = ReporterSink {
        reporter: &reporter,
    };
    match simplify_templates(&mut list, &mut sink, &settings) {
        Ok(_) => print_stream(&list),
        Err(err) => {
            let token = list.token(err.token);
            eprintln!("{filename}:{}: internal error: {err}", token.line);
            process::exit(1);
        }
    }
}
