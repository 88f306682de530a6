//! Safe-command allow-list and command line helpers

use regex::Regex;
use std::sync::LazyLock;

// Hardcoded pattern, cannot fail to compile.
#[allow(clippy::expect_used)]
static SHELL_CONTROL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[;&|<>`\n\r]|\$\(").expect("shell control pattern is hardcoded and valid")
});

// Options through which otherwise read-only commands write files,
// e.g. `git diff --output=<file>`.
#[allow(clippy::expect_used)]
static WRITE_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:-o\S*|--output(?:-directory)?(?:=.*)?)$")
        .expect("write option pattern is hardcoded and valid")
});

/// Whether `command` passes an option that makes it write a file.
pub fn has_write_option(command: &str) -> bool {
    command
        .split_whitespace()
        .skip(1)
        .any(|token| WRITE_OPTION.is_match(token))
}

/// Whether `command` chains, pipes, redirects or substitutes anything.
pub fn has_shell_metacharacters(command: &str) -> bool {
    SHELL_CONTROL.is_match(command)
}

/// Whether the whitespace tokens of `command` begin with those of `prefix`.
pub fn tokens_start_with(command: &str, prefix: &str) -> bool {
    let mut command_tokens = command.split_whitespace();
    let mut matched_any = false;
    for expected in prefix.split_whitespace() {
        match command_tokens.next() {
            Some(token) if token == expected => matched_any = true,
            _ => return false,
        }
    }
    matched_any
}

/// First whitespace token of a command line
pub fn first_token(command: &str) -> Option<&str> {
    command.split_whitespace().next()
}

/// Read-only commands approved without consulting grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeCommands {
    entries: Vec<String>,
}

impl SafeCommands {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(Into::into)
                .filter(|e: &String| !e.trim().is_empty())
                .collect(),
        }
    }

    /// Whether `command` is on the allow-list.
    ///
    /// Never true for a command containing shell control characters or an
    /// output-file option.
    pub fn allows(&self, command: &str) -> bool {
        if has_shell_metacharacters(command) || has_write_option(command) {
            return false;
        }
        self.entries
            .iter()
            .any(|entry| tokens_start_with(command, entry))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}
