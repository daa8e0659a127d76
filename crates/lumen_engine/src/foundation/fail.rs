//! Process-wide fatal error path
//!
//! Every unrecoverable condition in the engine ends up in [`fail`]: it logs the
//! failure class and its context at error severity, then panics. Binaries are
//! built with `panic = "abort"`, so a fatal condition terminates the process
//! before any partially-built GPU state can be used.

use std::fmt;

/// Class of a fatal engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// An asset file is missing or unreadable
    AssetMissing,
    /// An asset id was loaded as two different concrete types
    AssetTypeMismatch,
    /// A configuration document is malformed or misses a required key
    Config,
    /// A GPU API call returned a non-recoverable result
    Gpu,
    /// No physical device satisfies the engine's requirements
    NoSuitableGpu,
    /// Shader source failed to compile
    ShaderCompilation,
    /// The windowing backend failed
    Platform,
    /// The embedding game reported an error
    Game,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AssetMissing => "asset missing",
            Self::AssetTypeMismatch => "asset type mismatch",
            Self::Config => "config",
            Self::Gpu => "gpu",
            Self::NoSuitableGpu => "no suitable gpu",
            Self::ShaderCompilation => "shader compilation",
            Self::Platform => "platform",
            Self::Game => "game",
        };
        f.write_str(name)
    }
}

/// Log a fatal failure and stop
#[track_caller]
pub fn fail(kind: FailureKind, context: impl fmt::Display) -> ! {
    log::error!("[FATAL: {}] {}", kind, context);
    panic!("fatal {kind} failure: {context}");
}

/// Converts fallible values into either their success value or a [`fail`] call
pub trait OrFail<T> {
    /// Unwrap the value, failing with `kind` and `context` otherwise
    fn or_fail(self, kind: FailureKind, context: impl fmt::Display) -> T;
}

impl<T, E: fmt::Display> OrFail<T> for Result<T, E> {
    #[track_caller]
    fn or_fail(self, kind: FailureKind, context: impl fmt::Display) -> T {
        match self {
            Ok(value) => value,
            Err(error) => fail(kind, format_args!("{context}: {error}")),
        }
    }
}

impl<T> OrFail<T> for Option<T> {
    #[track_caller]
    fn or_fail(self, kind: FailureKind, context: impl fmt::Display) -> T {
        match self {
            Some(value) => value,
            None => fail(kind, context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_fail_passes_success_through() {
        let value: Result<u32, String> = Ok(7);
        assert_eq!(value.or_fail(FailureKind::Config, "reading value"), 7);
        assert_eq!(Some("x").or_fail(FailureKind::Config, "reading value"), "x");
    }

    #[test]
    #[should_panic(expected = "fatal gpu failure: create_fence: device lost")]
    fn test_or_fail_error_is_fatal_with_context() {
        let value: Result<u32, &str> = Err("device lost");
        value.or_fail(FailureKind::Gpu, "create_fence");
    }

    #[test]
    #[should_panic(expected = "fatal no suitable gpu failure")]
    fn test_none_is_fatal() {
        None::<u32>.or_fail(FailureKind::NoSuitableGpu, "no device qualifies");
    }
}
