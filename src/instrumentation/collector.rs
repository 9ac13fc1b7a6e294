use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::debug;

use super::{
    EXTRA_DELIMITER, KEY_CLASS_NAME, KEY_DESCRIPTION, KEY_EXTRAS, KEY_JUNIT_CLASS, KEY_JUNIT_TEST,
    KEY_METHOD_NAME, KEY_OUTPUT_DIR, KEY_PARAMETERIZED_NAME, KEY_TEST_KEY, KVP_DELIMITER,
    LEGACY_STORAGE_PREFIX, LEGACY_STORAGE_STRIP, OK_CODE, SIGNAL_CODE, START_CODE, STATUS,
    parse_status_code,
};
use crate::types::{InstrumentationStatus, TestOutput};

/// Working state of the instrumentation parser.
///
/// Each line produces a new `Collector` from the previous one; nothing is
/// shared between blocks once one closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collector {
    /// Lines of the current block, newline joined
    pub buffer: String,
    /// Set on the line that completed the block
    pub closed: bool,
    /// Most recent status code other than the transient `0`/`1`
    pub latest_status_code: i32,
    /// Whether a `42` render signal was seen in this block
    pub saw_signal: bool,
}

impl Collector {
    /// Fold one more line into the state
    pub fn step(self, line: &str) -> Self {
        let Collector {
            mut buffer,
            mut latest_status_code,
            mut saw_signal,
            ..
        } = if self.closed { Collector::default() } else { self };

        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(line);

        let mut terminal = false;
        match parse_status_code(line) {
            Some(SIGNAL_CODE) => saw_signal = true,
            Some(code) if code < 0 => {
                latest_status_code = code;
                terminal = true;
            }
            Some(OK_CODE) | Some(START_CODE) | None => {}
            Some(code) => latest_status_code = code,
        }

        let closed = terminal || (latest_status_code == OK_CODE && saw_signal);
        Collector {
            buffer,
            closed,
            latest_status_code,
            saw_signal,
        }
    }

    /// The record this block describes, once it is closed
    pub fn output(&self) -> Option<TestOutput> {
        if !self.closed {
            return None;
        }
        let status = InstrumentationStatus::from_code(self.latest_status_code)?;
        let output = self.to_output(status);
        debug!(
            "closed block {} with status {}",
            output.case_key(),
            output.status
        );
        Some(output)
    }

    fn to_output(&self, status: InstrumentationStatus) -> TestOutput {
        let junit_test = last_value(&self.buffer, KEY_JUNIT_TEST);

        let method_name = first_value(&self.buffer, KEY_METHOD_NAME)
            .or_else(|| junit_test.map(strip_parameters))
            .unwrap_or_default();
        let test_key = first_value(&self.buffer, KEY_TEST_KEY).unwrap_or_else(|| method_name.clone());
        let parameterized_name = first_value(&self.buffer, KEY_PARAMETERIZED_NAME).or_else(|| {
            junit_test
                .filter(|name| name.ends_with(']'))
                .map(str::to_string)
        });
        let class_name = first_value(&self.buffer, KEY_CLASS_NAME)
            .or_else(|| last_value(&self.buffer, KEY_JUNIT_CLASS).map(str::to_string))
            .unwrap_or_default();

        TestOutput {
            test_key,
            method_name,
            class_name,
            parameterized_name,
            description: first_value(&self.buffer, KEY_DESCRIPTION),
            extras: first_value(&self.buffer, KEY_EXTRAS)
                .map(|raw| parse_extras(&raw))
                .unwrap_or_default(),
            remote_output_dir: first_value(&self.buffer, KEY_OUTPUT_DIR).map(|dir| device_path(&dir)),
            status,
        }
    }
}

/// Value of the first `key` status in the block
fn first_value(buffer: &str, key: &str) -> Option<String> {
    let marker = format!("{STATUS}: {key}=");
    let start = buffer.find(&marker)? + marker.len();
    present(value_from(buffer, start)).map(str::to_string)
}

/// Value of the last `key` status in the block.
///
/// JUnit statuses repeat for every lifecycle event, the newest one wins.
fn last_value<'a>(buffer: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("{STATUS}: {key}=");
    let start = buffer.rfind(&marker)? + marker.len();
    present(value_from(buffer, start))
}

/// Text from `start` up to the next status marker, trimmed
fn value_from(buffer: &str, start: usize) -> &str {
    let rest = &buffer[start..];
    let end = rest.find(STATUS).unwrap_or(rest.len());
    rest[..end].trim()
}

/// Empty values and a literal `null` mean the device had nothing to report
fn present(value: &str) -> Option<&str> {
    match value {
        "" | "null" => None,
        value => Some(value),
    }
}

/// `render[wide]` -> `render`
fn strip_parameters(name: &str) -> String {
    match name.find('[') {
        Some(start) if name.ends_with(']') => name[..start].to_string(),
        _ => name.to_string(),
    }
}

/// Decode `["k"KVP_DELIMITER"v"EXTRA_DELIMITER...]`.
///
/// Only the delimiter tokens split; commas, colons and braces inside values
/// are kept verbatim. Malformed entries are skipped.
pub(crate) fn parse_extras(raw: &str) -> IndexMap<String, String> {
    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(raw);

    inner
        .split(EXTRA_DELIMITER)
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split(KVP_DELIMITER).collect();
            match parts.as_slice() {
                [key, value] => Some((unquote(key).to_string(), unquote(value).to_string())),
                _ => None,
            }
        })
        .collect()
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s)
}

/// Rewrite the storage path older emulators report so `adb pull` can find it
fn device_path(raw: &str) -> PathBuf {
    if raw.starts_with(LEGACY_STORAGE_PREFIX) {
        PathBuf::from(&raw[LEGACY_STORAGE_STRIP.len()..])
    } else {
        PathBuf::from(raw)
    }
}
