use std::collections::BTreeMap;
use std::path::PathBuf;

use url::Url;

use crate::config::{PodcastConfig, RewritePattern};

/// Naming context derived from one enclosure URL
#[derive(Debug, Clone)]
pub struct NameContext {
    /// Final file name for the download. When a rewrite pattern is
    /// configured this is the pattern applied to the WHOLE source URL,
    /// not just its basename — operators rely on that to collapse CDN
    /// URLs into local names.
    pub remote_name: String,
    /// Template variables for destdir interpolation: `name`,
    /// `remote_name`, `basename`, `ext`, plus every URL query parameter.
    pub vars: BTreeMap<String, String>,
}

/// Derive the naming context for one episode
pub fn name_context(
    podname: &str,
    url: &str,
    transform: Option<&RewritePattern>,
) -> NameContext {
    let mut vars = BTreeMap::new();

    if let Ok(parsed) = Url::parse(url) {
        for (key, value) in parsed.query_pairs() {
            vars.insert(key.into_owned(), value.into_owned());
        }
    }

    let without_query = url.split_once('?').map_or(url, |(head, _)| head);
    let plain_name = without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .to_string();

    // basename/ext always describe the un-rewritten remote name
    let (basename, ext) = match plain_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (plain_name.clone(), String::new()),
    };

    let remote_name = match transform {
        Some(pattern) => pattern.apply(url),
        None => plain_name,
    };

    vars.insert("name".to_string(), podname.to_string());
    vars.insert("remote_name".to_string(), remote_name.clone());
    vars.insert("basename".to_string(), basename);
    vars.insert("ext".to_string(), ext);

    NameContext { remote_name, vars }
}

/// Substitute `{var}` placeholders in a destdir template
pub fn interpolate(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(path)
}

/// Destination directory and file for one episode download
#[derive(Debug, Clone)]
pub struct Destination {
    pub dir: PathBuf,
    pub file: PathBuf,
}

/// Compute where an episode lands on disk
pub fn destination(podname: &str, podcast: &PodcastConfig, url: &str) -> Destination {
    let context = name_context(podname, url, podcast.transform.as_ref());
    let dir = expand_tilde(&interpolate(&podcast.destdir, &context.vars));
    let file = dir.join(&context.remote_name);
    Destination { dir, file }
}
