use std::sync::mpsc::{Receiver, TryRecvError, sync_channel};
use std::time::Duration;
use std::{env, fs, path::Path, process, thread};

use spindle::codegen::Generator;
use spindle::frontend::lexer::Lexer;
use spindle::frontend::parser::Parser;
use spindle::frontend::token_dumper::TokenDumper;
use spindle::runtime::op::Op;
use spindle::runtime::vm::VM;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let no_color = args.contains(&"--no-color".to_string());
    let pretty = args.contains(&"--pretty".to_string());
    let ast = args.contains(&"--ast".to_string());
    let emit = args.contains(&"--emit".to_string());
    let run = args.contains(&"--run".to_string());

    let output_pos = args.iter().position(|a| a == "-o").map(|i| i + 1);
    let output = output_pos.and_then(|i| args.get(i)).cloned();

    // first non-flag argument (skipping the -o value) is the filename
    let filename = args
        .iter()
        .enumerate()
        .skip(1)
        .find(|(i, a)| !a.starts_with('-') && Some(*i) != output_pos)
        .map(|(_, a)| a.clone());

    let Some(filename) = filename else {
        print_usage();
        return;
    };

    match Path::new(&filename).extension().and_then(|e| e.to_str()) {
        Some("bs") => {
            let source = read_file(&filename);
            let generated = build(&source, tokens_only, no_color, pretty, ast, emit);
            let Some(generated) = generated else {
                return; // a dump mode handled the output
            };

            if run {
                execute(generated.as_bytes());
            } else {
                let out_name = output.unwrap_or_else(|| {
                    Path::new(&filename)
                        .with_extension("bf")
                        .to_string_lossy()
                        .into_owned()
                });
                if let Err(e) = fs::write(&out_name, &generated) {
                    eprintln!("Failed to write '{}': {}", out_name, e);
                    process::exit(1);
                }
            }
        }
        Some("bf") => {
            let code = read_file(&filename);
            execute(code.as_bytes());
        }
        _ => {
            eprintln!("Error: expected a .bs or .bf file, got {}", filename);
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("SPINDLE - Tape-machine assembler and virtual machine");
    println!();
    println!("Usage:");
    println!("  spindle <file.bs>           Compile to <file.bf>");
    println!("  spindle <file.bs> -o <out>  Compile to <out>");
    println!("  spindle <file.bs> --run     Compile and execute");
    println!("  spindle <file.bf>           Execute a tape program");
    println!("  spindle --tokens <file.bs>  Show tokens only");
    println!("  spindle --ast <file.bs>     Show the parsed program");
    println!("  spindle --emit <file.bs>    Print generated code to stdout");
}

fn read_file(filename: &str) -> String {
    match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    }
}

/// Runs the compilation pipeline. Returns `None` when a dump mode
/// (`--tokens`, `--ast`, `--emit`) already produced the output.
fn build(
    source: &str,
    tokens_only: bool,
    no_color: bool,
    pretty: bool,
    ast: bool,
    emit: bool,
) -> Option<String> {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();

    if tokens_only {
        let mut dumper = TokenDumper::new();
        if no_color {
            dumper = dumper.no_color();
        }
        if pretty {
            dumper = dumper.pretty();
        }
        dumper.dump(&tokens);
        return None;
    }

    let mut parser = Parser::new(tokens);
    let program = match parser.parse() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            process::exit(1);
        }
    };

    if ast {
        println!("{:#?}", program);
        return None;
    }

    let generated = match Generator::new().generate(&program) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if emit {
        println!("{}", generated);
        return None;
    }

    Some(generated)
}

/// Drains the op stream with a bounded number of non-blocking reads, so
/// one tick never does unbounded work. Returns `false` once the machine
/// side has disconnected.
fn drain_ops(rx: &Receiver<Op>) -> bool {
    for _ in 0..60 {
        match rx.try_recv() {
            Ok(op) => println!("op {:>3} args {:?}", op.code, op.args),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
    true
}

fn execute(code: &[u8]) {
    let vm = match VM::new(code) {
        Ok(vm) => vm,
        Err(e) => {
            eprintln!("Load error: {}", e);
            process::exit(1);
        }
    };

    let (tx, rx) = sync_channel::<Op>(256);
    let mut vm = vm.with_ops(tx);
    let worker = thread::spawn(move || vm.run());

    while drain_ops(&rx) {
        thread::sleep(Duration::from_millis(16));
    }

    match worker.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("{}", e);
            process::exit(1);
        }
        Err(_) => {
            eprintln!("Runtime error: machine worker panicked");
            process::exit(1);
        }
    }
}
