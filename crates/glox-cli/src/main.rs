use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Once;

use glox_lang::ScopePolicy;

static TRACING_INIT: Once = Once::new();

/// Install a stderr subscriber, but only when `RUST_LOG` asks for one, so a
/// normal run prints nothing except program output.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr).with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

// ─── Arguments ───────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Options {
    script: PathBuf,
    policy: ScopePolicy,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Options, CliError> {
    let mut policy = ScopePolicy::Strict;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--permissive" => policy = ScopePolicy::Permissive,
            flag if flag.starts_with("--") => return Err(CliError::Usage),
            _ => positional.push(arg),
        }
    }
    match <[String; 1]>::try_from(positional) {
        Ok([script]) => Ok(Options { script: PathBuf::from(script), policy }),
        Err(_) => Err(CliError::Usage),
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Usage: glox [--permissive] <script>")]
    Usage,
    #[error("Failed to read file '{}'.", .path.display())]
    Input { path: PathBuf, source: io::Error },
    #[error("{0}")]
    Script(#[from] glox_lang::Error),
    #[error("Failed to write output: {0}.")]
    Output(io::Error),
}

/// Process exit status for a failed run, following the sysexits convention
/// for usage (64) and input (65) failures.
fn exit_code_for(err: &CliError) -> u8 {
    match err {
        CliError::Usage => 64,
        CliError::Input { .. } => 65,
        CliError::Script(_) | CliError::Output(_) => 1,
    }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

fn run(opts: &Options, out: &mut impl Write) -> Result<(), CliError> {
    let source = std::fs::read_to_string(&opts.script)
        .map_err(|source| CliError::Input { path: opts.script.clone(), source })?;
    tracing::debug!(script = %opts.script.display(), policy = ?opts.policy, "running script");

    let result = glox_lang::run_with(&source, &mut *out, opts.policy);
    // program output must land before any diagnostic
    out.flush().map_err(CliError::Output)?;
    result.map_err(CliError::from)
}

fn main() -> ExitCode {
    init_tracing();

    let stdout = io::stdout();
    let result = parse_args(std::env::args().skip(1))
        .and_then(|opts| run(&opts, &mut BufWriter::new(stdout.lock())));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "run failed");
            println!("{err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_script_argument() {
        let opts = parse_args(args(&["main.glox"])).unwrap();
        assert_eq!(opts, Options { script: PathBuf::from("main.glox"), policy: ScopePolicy::Strict });
    }

    #[test]
    fn permissive_flag_in_any_position() {
        let before = parse_args(args(&["--permissive", "a.glox"])).unwrap();
        let after = parse_args(args(&["a.glox", "--permissive"])).unwrap();
        assert_eq!(before.policy, ScopePolicy::Permissive);
        assert_eq!(before, after);
    }

    #[test]
    fn wrong_argument_count_is_usage_error() {
        for list in [&[][..], &["a.glox", "b.glox"][..], &["--permissive"][..]] {
            let err = parse_args(args(list)).unwrap_err();
            assert!(matches!(err, CliError::Usage), "{list:?}");
            assert_eq!(exit_code_for(&err), 64);
        }
    }

    #[test]
    fn unknown_flag_is_usage_error() {
        assert!(matches!(parse_args(args(&["--fast", "a.glox"])), Err(CliError::Usage)));
    }

    #[test]
    fn usage_message() {
        assert_eq!(CliError::Usage.to_string(), "Usage: glox [--permissive] <script>");
    }

    #[test]
    fn missing_file_is_input_error() {
        let opts = Options {
            script: PathBuf::from("/nonexistent/dir/missing.glox"),
            policy: ScopePolicy::Strict,
        };
        let err = run(&opts, &mut Vec::<u8>::new()).unwrap_err();
        assert_eq!(err.to_string(), "Failed to read file '/nonexistent/dir/missing.glox'.");
        assert_eq!(exit_code_for(&err), 65);
    }

    #[test]
    fn script_errors_exit_with_one() {
        let err = CliError::from(glox_lang::run_to_string("print nope;").unwrap_err());
        assert_eq!(err.to_string(), "[line 1] Undefined variable 'nope'.");
        assert_eq!(exit_code_for(&err), 1);
    }

    #[test]
    fn output_is_flushed_before_error() {
        let path = std::env::temp_dir().join(format!("glox-cli-test-{}.glox", std::process::id()));
        std::fs::write(&path, "print 1;\nprint 1 + nil;").unwrap();
        let opts = Options { script: path.clone(), policy: ScopePolicy::Strict };

        let mut out = Vec::new();
        let err = run(&opts, &mut out).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "1\n");
        assert!(matches!(err, CliError::Script(ref e) if e.line == 2));
    }
}
