use anyhow::{anyhow, Result};

pub fn infer<K, R>(key: K) -> Result<R>
where
    K: AsRef<str>,
    R: ::core::str::FromStr,
    <R as ::core::str::FromStr>::Err: 'static + Send + Sync + ::core::fmt::Display,
{
    let key = key.as_ref();

    infer_string(key).and_then(|e| {
        e.parse()
            .map_err(|error| anyhow!("failed to parse the environment variable ({key}): {error}"))
    })
}

/// Same as `infer`, but falls back to the given default when the variable
/// is unset. A set-but-malformed value is still an error.
pub fn infer_or<K, R>(key: K, default: R) -> Result<R>
where
    K: AsRef<str>,
    R: ::core::str::FromStr,
    <R as ::core::str::FromStr>::Err: 'static + Send + Sync + ::core::fmt::Display,
{
    let key = key.as_ref();

    match ::std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|error| anyhow!("failed to parse the environment variable ({key}): {error}")),
        Err(_) => Ok(default),
    }
}

pub fn infer_string<K>(key: K) -> Result<String>
where
    K: AsRef<str>,
{
    let key = key.as_ref();

    ::std::env::var(key).map_err(|_| anyhow!("failed to find the environment variable: {key}"))
}
