//! Macros.

/// Trace execution.
///
/// Writes a formatted line to an optional trace handle, either standard
/// output or a file.
///
/// # Arguments
///
/// - `trace` - Trace handle option.
/// - `format` - String format.
/// - `args` - Format args.
///
#[macro_export]
macro_rules! trace_exec {
    ($trace:expr, $format:expr, $($args:tt)*) => {
        if let Some(ref mut hndl) = $trace {
            match hndl {
                $crate::core::cpu::TraceHandle::Stdout => println!($format, $($args)*),
                $crate::core::cpu::TraceHandle::File(ref mut file) => {
                    use std::io::Write;
                    writeln!(file, $format, $($args)*).unwrap()
                }
            }
        }
    };
}
