//! Fail-without-panic helper for `main`, kept verbatim from the teacher's `error.rs`.

use anyhow::Error;

/// Like `.unwrap()`/`.expect()` but prints the error's cause chain and exits `1` instead of
/// panicking, so a startup failure (bad config, unreachable dispatcher) reads as a clean error
/// message rather than a Rust backtrace.
pub trait NiceError<T> {
    fn nice_unwrap(self) -> T;
}

fn print_error(error: &Error) {
    debug!("{error:?}");
    let mut fail: &dyn std::error::Error = error.as_ref();
    eprintln!("Error: {fail}");
    while let Some(cause) = fail.source() {
        eprintln!("\nCaused by:\n    {cause}");
        fail = cause;
    }
}

impl<T> NiceError<T> for Result<T, Error> {
    fn nice_unwrap(self) -> T {
        match self {
            Ok(x) => x,
            Err(e) => {
                print_error(&e);
                std::process::exit(1);
            }
        }
    }
}
