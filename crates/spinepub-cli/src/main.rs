use std::process::ExitCode;

fn main() -> ExitCode {
    spinepub_cli::run()
}
