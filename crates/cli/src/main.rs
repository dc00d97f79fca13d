use std::process::ExitCode;

fn main() -> ExitCode {
    sqlreact_cli::run()
}
