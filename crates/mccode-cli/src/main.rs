//! mcfmt – McCode DSL formatter.
//!
//! Formats `.instr` and `.comp` files: prints to stdout by default, rewrites
//! with `--inplace`, gates CI with `--check`, and shows changes with
//! `--diff`. C-code blocks can be piped through clang-format with one of the
//! `--clang-format*` options.

use std::{path::PathBuf, process::ExitCode};

use mccode::{CFormatter, Flavor, NoFetcher, fetch_clang_format_config, format_file, make_clang_formatter};

const USAGE: &str = "\
usage: mcfmt [options] FILE...

Format McCode DSL source files (.instr and .comp).

options:
  -i, --inplace                 modify files in place instead of printing
      --check                   exit non-zero if any file would change
      --diff                    print a unified-style diff of the changes
      --clang-format            format C blocks with the official McCode style
      --clang-format-config P   format C blocks with the given .clang-format file
      --clang-format-style S    format C blocks with the named clang-format style
  -h, --help                    show this message
";

#[derive(Default)]
struct Options {
    inplace: bool,
    check: bool,
    diff: bool,
    clang_format: bool,
    clang_format_config: Option<PathBuf>,
    clang_format_style: Option<String>,
    files: Vec<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" | "--inplace" => options.inplace = true,
            "--check" => options.check = true,
            "--diff" => options.diff = true,
            "--clang-format" => options.clang_format = true,
            "--clang-format-config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--clang-format-config requires a path".to_string())?;
                options.clang_format_config = Some(PathBuf::from(value));
            }
            "--clang-format-style" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--clang-format-style requires a style".to_string())?;
                options.clang_format_style = Some(value.clone());
            }
            "-h" | "--help" => return Err(String::new()),
            flag if flag.starts_with('-') => {
                return Err(format!("unknown option {flag}"));
            }
            file => options.files.push(PathBuf::from(file)),
        }
    }
    if options.files.is_empty() {
        return Err("no input files".to_string());
    }
    let modes = usize::from(options.inplace) + usize::from(options.check) + usize::from(options.diff);
    if modes > 1 {
        return Err("--inplace, --check, and --diff are mutually exclusive".to_string());
    }
    Ok(options)
}

fn simple_diff(original: &str, formatted: &str, filename: &str) -> String {
    let mut out = format!("--- a/{filename}\n+++ b/{filename}\n");
    for line in original.lines() {
        if !formatted.lines().any(|l| l == line) {
            out.push_str(&format!("-{line}\n"));
        }
    }
    for line in formatted.lines() {
        if !original.lines().any(|l| l == line) {
            out.push_str(&format!("+{line}\n"));
        }
    }
    out
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("mcfmt: {message}");
            }
            eprintln!("{USAGE}");
            return if message.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    let clang: Option<Box<CFormatter<'static>>> = if options.clang_format {
        match fetch_clang_format_config(Flavor::McStas, &NoFetcher) {
            Some(config) => make_clang_formatter(Some(config), None),
            None => {
                eprintln!(
                    "mcfmt: McCode .clang-format config not available; C blocks will not be formatted"
                );
                None
            }
        }
    } else if let Some(config) = options.clang_format_config.clone() {
        make_clang_formatter(Some(config), None)
    } else if let Some(style) = options.clang_format_style.clone() {
        make_clang_formatter(None, Some(style))
    } else {
        None
    };

    let mut any_changed = false;
    let mut failed = false;

    for path in &options.files {
        if !path.exists() {
            eprintln!("mcfmt: {}: No such file", path.display());
            failed = true;
            continue;
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if ext != "instr" && ext != "comp" {
            eprintln!(
                "mcfmt: {}: skipping (unsupported extension \".{ext}\"; expected .instr or .comp)",
                path.display()
            );
            continue;
        }
        let original = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) => {
                eprintln!("mcfmt: {}: {error}", path.display());
                failed = true;
                continue;
            }
        };
        let formatted = match format_file(path, clang.as_deref()) {
            Ok(text) => text,
            Err(error) => {
                // the original file is left untouched
                eprintln!("mcfmt: {}: error during formatting: {error}", path.display());
                failed = true;
                continue;
            }
        };
        let changed = original != formatted;

        if options.check {
            if changed {
                eprintln!("mcfmt: {}: would reformat", path.display());
                any_changed = true;
            }
        } else if options.diff {
            if changed {
                print!("{}", simple_diff(&original, &formatted, &path.to_string_lossy()));
                any_changed = true;
            }
        } else if options.inplace {
            if changed {
                if let Err(error) = std::fs::write(path, &formatted) {
                    eprintln!("mcfmt: {}: {error}", path.display());
                    failed = true;
                } else {
                    eprintln!("Reformatted {}", path.display());
                    any_changed = true;
                }
            }
        } else {
            print!("{formatted}");
        }
    }

    if failed || (options.check && any_changed) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
