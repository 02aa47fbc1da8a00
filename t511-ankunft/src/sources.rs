//! The ordered list of places we poll for arrivals.

use serde_derive::Serialize;
use std::fmt;
use std::slice;
use url::Url;
use url::form_urlencoded::Serializer;

use crate::errors::ConfigError;

/// Position of a source in the registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(pub usize);

#[derive(Clone, Debug)]
pub struct Source {
    pub id: SourceId,
    pub url: String,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "source #{} ({})", self.id.0, mask_url(&self.url))
    }
}

/// Configured sources, in configuration order. Duplicates are kept.
#[derive(Clone, Debug)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new(urls: Vec<String>) -> Result<Self, ConfigError> {
        if urls.is_empty() {
            return Err(ConfigError::NoSources);
        }
        let sources = urls.into_iter()
            .enumerate()
            .map(|(i, url)| Source { id: SourceId(i), url })
            .collect();
        Ok(Self { sources })
    }
    pub fn iter(&self) -> slice::Iter<Source> {
        self.sources.iter()
    }
    pub fn get(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(id.0)
    }
    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl<'a> IntoIterator for &'a SourceRegistry {
    type Item = &'a Source;
    type IntoIter = slice::Iter<'a, Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Query parameters whose values shouldn't end up in logs.
static SECRET_PARAMS: &[&str] = &["api_key", "apikey", "token", "key"];

fn is_secret(name: &str) -> bool {
    SECRET_PARAMS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

/// Replaces the values of secret-looking query parameters with `***`.
///
/// Anything that doesn't parse as a URL is returned as-is.
pub fn mask_url(raw: &str) -> String {
    let mut url = match Url::parse(raw) {
        Ok(u) => u,
        Err(_) => return raw.to_owned()
    };
    if url.query().is_none() {
        return raw.to_owned();
    }
    let mut ser = Serializer::new(String::new());
    for (name, value) in url.query_pairs() {
        if is_secret(&name) {
            ser.append_pair(&name, "***");
        }
        else {
            ser.append_pair(&name, &value);
        }
    }
    let query = ser.finish();
    url.set_query(Some(&query));
    url.into()
}
