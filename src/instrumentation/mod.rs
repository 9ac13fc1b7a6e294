//! Parsing of `am instrument -r` output into render records.
//!
//! The instrumentation process interleaves JUnit lifecycle statuses with the
//! `Kontrast:`-prefixed statuses published by the on-device renderer. A
//! [`Collector`] is folded over the lines and every time it closes a block
//! one [`TestOutput`](crate::types::TestOutput) falls out.

mod collector;

pub use collector::Collector;

use crate::types::TestOutput;

/// Prefix of every key/value status line
pub const STATUS: &str = "INSTRUMENTATION_STATUS";
/// Prefix of the line closing a batch of statuses
pub const STATUS_CODE: &str = "INSTRUMENTATION_STATUS_CODE";
/// Prefix of the line the instrumentation process prints as it exits
pub const RUN_CODE: &str = "INSTRUMENTATION_CODE";
/// Prefix of the run summary lines printed just before the exit line
pub const RESULT: &str = "INSTRUMENTATION_RESULT";
/// Key of the result line carrying a crash message
pub const KEY_SHORT_MSG: &str = "shortMsg";

/// Run code of an instrumentation that finished normally (`Activity.RESULT_OK`)
pub const RUN_OK_CODE: i32 = -1;

/// Status code the renderer sends once an image has been written
pub const SIGNAL_CODE: i32 = 42;
/// JUnit "test started"
pub const START_CODE: i32 = 1;
/// JUnit "in progress / passed"
pub const OK_CODE: i32 = 0;

pub const KEY_TEST_KEY: &str = "Kontrast:TestKey";
pub const KEY_METHOD_NAME: &str = "Kontrast:MethodName";
pub const KEY_CLASS_NAME: &str = "Kontrast:ClassName";
pub const KEY_PARAMETERIZED_NAME: &str = "Kontrast:ParameterizedName";
pub const KEY_DESCRIPTION: &str = "Kontrast:Description";
pub const KEY_EXTRAS: &str = "Kontrast:Extras";
pub const KEY_OUTPUT_DIR: &str = "Kontrast:OutputDir";
pub const KEY_JUNIT_TEST: &str = "test";
pub const KEY_JUNIT_CLASS: &str = "class";

/// Separates entries of the extras list
pub const EXTRA_DELIMITER: &str = "EXTRA_DELIMITER";
/// Separates key from value within one extras entry
pub const KVP_DELIMITER: &str = "KVP_DELIMITER";

/// Old emulator images report external storage under this prefix
pub const LEGACY_STORAGE_PREFIX: &str = "/sdcard/storage/sdcard/Android/data";
/// Part of [`LEGACY_STORAGE_PREFIX`] that has to go for `adb pull` to find the files
pub const LEGACY_STORAGE_STRIP: &str = "/sdcard/storage";

/// Lazily turn instrumentation output lines into completed records.
///
/// Lines are consumed strictly in order; the returned iterator ends when
/// `lines` does. A block still open at that point is dropped.
pub fn parse_test_cases<I>(lines: I) -> impl Iterator<Item = TestOutput>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    lines
        .into_iter()
        .scan(Collector::default(), |state, line| {
            *state = std::mem::take(state).step(line.as_ref());
            Some(state.output())
        })
        .flatten()
}

/// Whether `line` is the process-level exit line that ends a run
pub fn is_run_complete(line: &str) -> bool {
    line.starts_with(RUN_CODE)
}

/// Integer carried by an `INSTRUMENTATION_STATUS_CODE:` line
pub fn parse_status_code(line: &str) -> Option<i32> {
    code_after(line, STATUS_CODE)
}

/// Integer carried by the `INSTRUMENTATION_CODE:` exit line
pub fn parse_run_code(line: &str) -> Option<i32> {
    code_after(line, RUN_CODE)
}

/// Message of an `INSTRUMENTATION_RESULT: shortMsg=` line.
///
/// The framework only prints one when the instrumented process died.
pub fn crash_message(line: &str) -> Option<&str> {
    let message = line
        .strip_prefix(RESULT)?
        .trim_start()
        .strip_prefix(':')?
        .trim_start()
        .strip_prefix(KEY_SHORT_MSG)?
        .strip_prefix('=')?
        .trim();
    Some(message)
}

fn code_after(line: &str, prefix: &str) -> Option<i32> {
    line.strip_prefix(prefix)?
        .trim_start()
        .strip_prefix(':')?
        .trim()
        .parse()
        .ok()
}
