use log::error;
use minershell::{Interpreter, Options, Registry};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::process::ExitCode;

/// Status for a line that could not be run at all in `-c` mode.
const USAGE_FAILURE: u8 = 2;

fn main() -> ExitCode {
    let options: Options = argh::from_env();
    let _ = TermLogger::init(
        options.log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );

    let mut sh = Interpreter::new(Registry::default(), options.limits());

    if let Some(line) = &options.command {
        return match sh.execute_line(line) {
            Ok(outcome) => status(outcome.code()),
            Err(err) => {
                eprintln!("minershell: {err}");
                ExitCode::from(USAGE_FAILURE)
            }
        };
    }

    if let Err(err) = sh.repl(&options.prompt) {
        error!("line editor failed: {err}");
        return ExitCode::FAILURE;
    }
    status(sh.exit_code())
}

fn status(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}
