use std::process::ExitCode;

fn main() -> ExitCode {
    match ncopy::run(std::env::args_os()) {
        Ok(bytes_copied) => {
            println!("Successfully copied {} bytes.", bytes_copied);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("exiting program with rc = {}", ncopy::FAILURE_RC);
            ExitCode::from(ncopy::FAILURE_RC)
        }
    }
}
