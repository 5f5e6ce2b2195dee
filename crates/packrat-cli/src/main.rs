use std::io::Read as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use packrat::{check, generate, parse, ErrorAccumulator, GenConfig};

const USAGE: &str = "\
usage: packrat [flags] [grammar.peg]

Reads a PEG grammar (stdin when no file is given) and writes Rust source
for a packrat parser.

flags:
  -o PATH          output file (default stdout)
  -p PREFIX        identifier prefix for generated declarations (default _)
  --no-actions     do not emit the Action pass
  --no-parse-tree  do not emit the Node pass
  --pretty         print the grammar with labels and actions stripped,
                   without checking or generating
  -v, -q           more/less logging
";

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut out_path: Option<PathBuf> = None;
    let mut cfg = GenConfig::default();
    let mut pretty = false;
    let mut verbosity = 1usize;
    let mut files: Vec<&str> = Vec::new();

    let mut iter = args.iter().map(String::as_str);
    while let Some(arg) = iter.next() {
        match arg {
            "-o" => {
                let Some(path) = iter.next() else {
                    eprintln!("packrat: -o needs an argument");
                    return 1;
                };
                out_path = Some(path.into());
            }
            "-p" => {
                let Some(prefix) = iter.next() else {
                    eprintln!("packrat: -p needs an argument");
                    return 1;
                };
                cfg.prefix = prefix.to_string();
            }
            "--no-actions" => cfg.actions = false,
            "--no-parse-tree" => cfg.parse_tree = false,
            "--pretty" => pretty = true,
            "-v" => verbosity += 1,
            "-q" => verbosity = verbosity.saturating_sub(1),
            "-h" | "--help" => {
                print!("{USAGE}");
                return 0;
            }
            _ => files.push(arg),
        }
    }

    stderrlog::new().verbosity(verbosity).init().unwrap();

    if files.len() > 1 {
        eprintln!("packrat: only one grammar file may be given");
        return 1;
    }

    let (src, file) = match files.pop() {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(src) => (src, path.to_string()),
            Err(e) => {
                eprintln!("packrat: cannot read {path}: {e}");
                return 1;
            }
        },
        None => {
            let mut src = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut src) {
                eprintln!("packrat: cannot read stdin: {e}");
                return 1;
            }
            (src, "<stdin>".to_string())
        }
    };

    let err = ErrorAccumulator::new();

    log::info!("parsing {file}");
    let Some(mut grammar) = parse(&src, &err) else {
        eprintln!("{}", err.render(&file, &src));
        return 1;
    };

    if pretty {
        let mut out = String::new();
        for rule in grammar.rules.values() {
            out.push_str(&rule.stripped());
            out.push('\n');
        }
        return write_output(out_path.as_deref(), &out);
    }

    log::info!("checking {file}");
    check(&mut grammar, &err);
    if !err.is_empty() {
        eprintln!("{}", err.render(&file, &src));
        return 1;
    }

    log::info!("generating {} rules", grammar.checked.len());
    let generated = generate(&grammar, &file, &cfg);
    let formatted = match rustfmt(&generated) {
        Ok(formatted) => formatted,
        Err(e) => {
            log::warn!("rustfmt failed ({e}), writing unformatted output");
            generated
        }
    };
    write_output(out_path.as_deref(), &formatted)
}

fn write_output(path: Option<&Path>, content: &str) -> i32 {
    match path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, content) {
                eprintln!("packrat: cannot write {}: {e}", path.display());
                return 1;
            }
        }
        None => print!("{content}"),
    }
    0
}

fn rustfmt(input: &str) -> std::io::Result<String> {
    use std::process::{Command, Stdio};

    let mut child = Command::new("rustfmt")
        .arg("--edition=2021")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    let mut stdin = child.stdin.take().expect("rustfmt stdin is piped");
    let bytes = input.as_bytes().to_vec();
    let writer = std::thread::spawn(move || {
        let _ = stdin.write_all(&bytes);
    });

    let output = child.wait_with_output()?;
    let _ = writer.join();
    if !output.status.success() {
        return Err(std::io::Error::other("rustfmt rejected the input"));
    }
    String::from_utf8(output.stdout).map_err(|_| std::io::Error::other("rustfmt wrote non-utf8"))
}
