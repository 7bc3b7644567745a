use std::process::ExitCode;

fn main() -> ExitCode {
    triage_cli::run()
}
