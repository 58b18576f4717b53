use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, PatternError};

/// Config file name inside the configuration directory
pub const CONFIG_FILE: &str = "podsync.yaml";
/// Episode store file name inside the configuration directory
pub const STORE_FILE: &str = "podsync.sqlite";

/// Section names that never describe a real podcast: `default` supplies
/// fallback values, `example` ships with the generated sample.
const RESERVED_SECTIONS: [&str; 2] = ["default", "example"];

const SAMPLE_CONFIG: &str = r#"# podsync configuration
#
# Every top-level key except `default` and `example` names a podcast.

default:
  download_limit: 10            # most recent pending episodes per run, 0 = all
  destdir: "~/podcasts/{name}"  # default storage directory

example:
  url: "https://example.com/podcast/sample.rss?foo=1&bar=2"
  enabled: true
  dry_run: false
  destdir: "/path/to/podcasts/dir"  # the default can be overridden per podcast
  transform: "s/a/b/"               # optional filename rewrite
"#;

/// A sed-style single substitution: `s<delim><search><delim><replace><delim>[flags]`
#[derive(Debug, Clone)]
pub struct RewritePattern {
    pub delimiter: char,
    pub search: Regex,
    pub replace: String,
}

impl RewritePattern {
    /// Parse and validate a pattern. Trailing sed flags are accepted and
    /// ignored; the substitution is always single and case-sensitive.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut chars = pattern.chars();
        if chars.next() != Some('s') {
            return Err(PatternError::NotSubstitution);
        }
        let delimiter = chars.next().ok_or(PatternError::MissingDelimiter)?;
        let rest: String = chars.collect();

        let mut fields = rest.split(delimiter);
        let search = fields.next().unwrap_or_default();
        if search.is_empty() {
            return Err(PatternError::MissingSearch);
        }
        // a well-formed pattern closes the replacement with the delimiter,
        // which yields at least one further field here
        let replace = match (fields.next(), fields.next()) {
            (Some(replace), Some(_)) => replace,
            _ => return Err(PatternError::MissingReplacement),
        };

        Ok(Self {
            delimiter,
            search: Regex::new(search)?,
            replace: sed_replacement(replace),
        })
    }

    /// Apply one substitution to `input`. The download engine feeds the
    /// whole enclosure URL through here, not just its basename.
    pub fn apply(&self, input: &str) -> String {
        self.search.replace(input, self.replace.as_str()).into_owned()
    }
}

/// Translate sed-style `\1` backreferences into the `${1}` form the
/// regex crate expects, and escape literal dollars on the way.
fn sed_replacement(replace: &str) -> String {
    let mut out = String::with_capacity(replace.len());
    let mut chars = replace.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(d) if d.is_ascii_digit() => {
                    out.push_str("${");
                    out.push(*d);
                    out.push('}');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push(c),
            },
            '$' => out.push_str("$$"),
            _ => out.push(c),
        }
    }
    out
}

/// One named section as it appears in the YAML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSection {
    url: Option<String>,
    enabled: Option<bool>,
    dry_run: Option<bool>,
    destdir: Option<String>,
    transform: Option<String>,
    download_limit: Option<usize>,
}

/// Validated per-podcast configuration
#[derive(Debug, Clone)]
pub struct PodcastConfig {
    pub url: String,
    pub enabled: bool,
    pub dry_run: bool,
    /// Destination directory template; `{name}` and the URL-derived
    /// variables are interpolated at download time.
    pub destdir: String,
    pub transform: Option<RewritePattern>,
}

/// Whole-program configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub podcasts: BTreeMap<String, PodcastConfig>,
    /// Number of most recent pending episodes downloaded per run, 0 = all
    pub download_limit: usize,
}

impl Config {
    pub fn podcast(&self, name: &str) -> Option<&PodcastConfig> {
        self.podcasts.get(name)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml(&text, path)
    }

    fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let sections: BTreeMap<String, RawSection> =
            serde_yaml::from_str(text).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        let defaults = sections.get("default").cloned().unwrap_or_default();

        let mut podcasts = BTreeMap::new();
        for (name, raw) in &sections {
            if RESERVED_SECTIONS.contains(&name.as_str()) {
                continue;
            }

            let url = raw.url.clone().ok_or_else(|| ConfigError::MissingField {
                name: name.clone(),
                field: "url",
            })?;
            let destdir = raw
                .destdir
                .clone()
                .or_else(|| defaults.destdir.clone())
                .ok_or_else(|| ConfigError::MissingField {
                    name: name.clone(),
                    field: "destdir",
                })?;
            let transform = match raw.transform.as_deref().or(defaults.transform.as_deref()) {
                Some(pattern) => Some(RewritePattern::parse(pattern).map_err(|source| {
                    ConfigError::InvalidPattern {
                        name: name.clone(),
                        pattern: pattern.to_string(),
                        source,
                    }
                })?),
                None => None,
            };

            podcasts.insert(
                name.clone(),
                PodcastConfig {
                    url,
                    enabled: raw.enabled.or(defaults.enabled).unwrap_or(true),
                    dry_run: raw.dry_run.or(defaults.dry_run).unwrap_or(false),
                    destdir,
                    transform,
                },
            );
        }

        if podcasts.is_empty() && sections.contains_key("example") {
            return Err(ConfigError::OnlyExample {
                path: path.to_path_buf(),
            });
        }

        debug!(podcasts = podcasts.len(), "configuration loaded");
        Ok(Self {
            podcasts,
            download_limit: defaults.download_limit.unwrap_or(0),
        })
    }
}

/// Create the configuration directory and a commented sample file when
/// either is absent. Returns the config file path.
pub fn ensure_config_dir(confdir: &Path) -> Result<PathBuf, ConfigError> {
    if !confdir.exists() {
        debug!(path = %confdir.display(), "creating config directory");
        fs::create_dir_all(confdir).map_err(|e| ConfigError::CreateDirFailed {
            path: confdir.to_path_buf(),
            source: e,
        })?;
    }

    let config_path = confdir.join(CONFIG_FILE);
    if !config_path.exists() {
        debug!(path = %config_path.display(), "generating sample config");
        fs::write(&config_path, SAMPLE_CONFIG).map_err(|e| ConfigError::WriteSampleFailed {
            path: config_path.clone(),
            source: e,
        })?;
    }

    Ok(config_path)
}
