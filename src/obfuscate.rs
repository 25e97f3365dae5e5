//! Removal of personal data before anything is written to disk.

use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::error::{ExtractError, Result};
use crate::types::{Build, Event, GitCommit, ListResponse, Pipeline, Release, ReleaseTarget};

pub const PLACEHOLDER_EMAIL: &str = "me@estafette.io";
pub const PLACEHOLDER_NAME: &str = "Just Me";
pub const PLACEHOLDER_USERNAME: &str = "JustMe";

const SERVICE_ACCOUNT_PLACEHOLDER: &[u8] = b"***@***.iam.gserviceaccount.com";
const CUSTOM_PLACEHOLDER: &[u8] = b"***";

static SERVICE_ACCOUNT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-z0-9-]+@[a-z0-9-]+\.iam\.gserviceaccount\.com")
        .expect("service account pattern is valid")
});

/// Replaces identifying fields in place. Applying it twice is a no-op.
pub trait Obfuscate {
    fn obfuscate(&mut self);
}

impl Obfuscate for Pipeline {
    fn obfuscate(&mut self) {
        obfuscate_commits(self.commits.as_deref_mut());
        obfuscate_release_targets(self.release_targets.as_deref_mut());
        obfuscate_events(self.events.as_deref_mut());
    }
}

impl Obfuscate for Build {
    fn obfuscate(&mut self) {
        obfuscate_commits(self.commits.as_deref_mut());
        obfuscate_release_targets(self.release_targets.as_deref_mut());
        obfuscate_events(self.events.as_deref_mut());
    }
}

impl Obfuscate for Release {
    fn obfuscate(&mut self) {
        obfuscate_events(self.events.as_deref_mut());
    }
}

impl<T: Obfuscate> Obfuscate for ListResponse<T> {
    fn obfuscate(&mut self) {
        self.items.iter_mut().for_each(Obfuscate::obfuscate);
    }
}

fn obfuscate_commits(commits: Option<&mut [GitCommit]>) {
    for commit in commits.unwrap_or_default() {
        commit.author.email = PLACEHOLDER_EMAIL.to_string();
        commit.author.name = PLACEHOLDER_NAME.to_string();
        commit.author.username = PLACEHOLDER_USERNAME.to_string();
    }
}

fn obfuscate_release_targets(targets: Option<&mut [ReleaseTarget]>) {
    for target in targets.unwrap_or_default() {
        for release in target.active_releases.as_deref_mut().unwrap_or_default() {
            release.obfuscate();
        }
    }
}

fn obfuscate_events(events: Option<&mut [Event]>) {
    for manual in events
        .unwrap_or_default()
        .iter_mut()
        .filter_map(|event| event.manual.as_mut())
    {
        manual.user_id = PLACEHOLDER_EMAIL.to_string();
    }
}

/// Scrubs service account addresses, and optionally a custom pattern, from
/// raw log output.
#[derive(Debug, Clone, Default)]
pub struct LogScrubber {
    custom: Option<Regex>,
}

impl LogScrubber {
    /// Builds a scrubber; `custom_pattern` is an extra regex whose matches are
    /// replaced with `***`. Blank patterns are ignored.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `custom_pattern` does not compile.
    pub fn new(custom_pattern: Option<&str>) -> Result<Self> {
        let custom = custom_pattern
            .filter(|pattern| !pattern.trim().is_empty())
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    ExtractError::Config(format!("Invalid log obfuscation regex: {e}"))
                })
            })
            .transpose()?;

        Ok(Self { custom })
    }

    pub fn scrub(&self, log: &[u8]) -> Vec<u8> {
        let scrubbed = SERVICE_ACCOUNT_REGEX.replace_all(log, SERVICE_ACCOUNT_PLACEHOLDER);

        match &self.custom {
            Some(custom) => custom.replace_all(&scrubbed, CUSTOM_PLACEHOLDER).into_owned(),
            None => scrubbed.into_owned(),
        }
    }
}
