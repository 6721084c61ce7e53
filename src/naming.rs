use std::path::{Path, PathBuf};

use crate::error::{Result, SaveError};

/// Placeholder in filename patterns that receives the zero-padded counter.
pub const COUNTER_TOKEN: &str = "%counter%";

/// The text around the counter in a generated filename.
///
/// A file named `{head}{digits}{tail}.{ext}` belongs to the template; the
/// extension is not part of the match, so `.png` and `.webp` outputs share
/// one counter sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterTemplate {
    head: String,
    tail: String,
    padding: usize,
}

impl CounterTemplate {
    /// Build the template for an already token-expanded filename pattern.
    ///
    /// With an explicit `%counter%` the pattern is split around it. Otherwise
    /// the counter is appended after `delimiter`, or prepended before it when
    /// `number_first` is set.
    pub fn new(pattern: &str, delimiter: &str, padding: u8, number_first: bool) -> Result<Self> {
        if !(1..=9).contains(&padding) {
            return Err(SaveError::InvalidOption(format!(
                "counter padding must be between 1 and 9, got {padding}"
            )));
        }
        let (head, tail) = match pattern.split_once(COUNTER_TOKEN) {
            Some((head, tail)) => (head.to_string(), tail.to_string()),
            None if number_first => (String::new(), format!("{delimiter}{pattern}")),
            None => (format!("{pattern}{delimiter}"), String::new()),
        };
        Ok(Self {
            head,
            tail,
            padding: padding as usize,
        })
    }

    /// Filename for `counter`, with `ext` appended.
    pub fn file_name(&self, counter: u64, ext: &str) -> String {
        format!(
            "{}{:0width$}{}.{ext}",
            self.head,
            counter,
            self.tail,
            width = self.padding
        )
    }

    /// Extract the counter from `name` if it was generated by this template.
    pub fn parse_counter(&self, name: &str) -> Option<u64> {
        let rest = name.strip_prefix(self.head.as_str())?;
        let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits_len == 0 || !rest[digits_len..].starts_with(self.tail.as_str()) {
            return None;
        }
        rest[..digits_len].parse().ok()
    }

    /// First counter after the highest one already present in `dir`.
    ///
    /// A missing directory counts as empty.
    pub fn next_counter(&self, dir: &Path) -> Result<u64> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
            Err(e) => return Err(SaveError::io(dir, e)),
        };

        let highest = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                self.parse_counter(name.to_str()?)
            })
            .max();

        Ok(highest.map_or(1, |n| n.saturating_add(1)))
    }

    /// Find a free path in `dir`, starting at `*counter` and bumping it past
    /// every name that already exists.
    ///
    /// Nothing is reserved: a concurrent writer can still claim the name
    /// before the caller writes it.
    pub fn resolve_free_path(&self, dir: &Path, counter: &mut u64, ext: &str) -> PathBuf {
        loop {
            let candidate = dir.join(self.file_name(*counter, ext));
            if !candidate.exists() {
                return candidate;
            }
            log::debug!("{} exists, trying next counter", candidate.display());
            *counter += 1;
        }
    }
}

/// Filename used by the prefix-as-filename overwrite mode.
pub fn fixed_file_name(pattern: &str, ext: &str) -> String {
    format!("{}.{ext}", pattern.replace(COUNTER_TOKEN, ""))
}
