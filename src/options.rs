use std::str::FromStr;

/// Ordered key/value bag handed through to the output sink.
///
/// Keys are free-form; each sink reads the ones it understands and ignores
/// the rest. When a key appears more than once the last occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct ExtraOpts {
    opts: Vec<(String, Option<String>)>,
}

impl ExtraOpts {
    pub fn new() -> Self {
        Self { opts: Vec::new() }
    }

    /// Builds a bag from entries of the form `key=value` or bare `key`.
    pub fn parse<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut bag = Self::new();
        for item in items {
            let item = item.as_ref();
            match item.split_once('=') {
                Some((key, val)) => bag.push(key, Some(val)),
                None => bag.push(item, None),
            }
        }
        bag
    }

    pub fn push(&mut self, key: &str, val: Option<&str>) {
        self.opts.push((key.to_string(), val.map(str::to_string)));
    }

    /// Last value given for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.opts
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// True when `key` appears at all, valueless keys included.
    pub fn has(&self, key: &str) -> bool {
        self.opts.iter().any(|(k, _)| k == key)
    }

    /// Parses the value for `key`. A malformed value is dropped with a
    /// warning, as if the key were absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(val) => Some(val),
            Err(_) => {
                log::warn!("Ignoring malformed option {}={}", key, raw);
                None
            }
        }
    }
}
