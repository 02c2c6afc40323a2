use thiserror::Error;
use url::Url;

/// Errors that can occur while validating a provider feed URL.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a configured feed URL.
///
/// Feed URLs come from the operator's own config file, so unlike a reader that
/// accepts arbitrary subscriptions there is no private-address filtering here;
/// status pages on internal hosts are a legitimate target.
///
/// ```
/// use statuswatch::util::validate_url;
///
/// assert!(validate_url("https://status.openai.com/history.atom").is_ok());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}
