//! Connection details and authenticated clone URLs.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use crate::process::Arg;

/// Username placed in the clone URL for token authentication.
const TOKEN_USERNAME: &str = "x-access-token";

const MASK: &str = "***";

/// Errors returned when building a clone URL.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The base URL could not be parsed.
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The base URL scheme cannot carry a username and password.
    #[error("base URL {0} cannot carry credentials")]
    CannotAuthenticate(String),
}

/// Hosting service URL plus the credential used for authenticated clones.
///
/// Any userinfo in the supplied base URL is dropped, so `Debug` output never
/// contains a secret.
#[derive(Debug)]
pub struct ConnectionDetails {
    base_url: Url,
    credential: SecretString,
}

impl ConnectionDetails {
    pub fn new(mut base_url: Url, credential: impl Into<SecretString>) -> Self {
        strip_userinfo(&mut base_url);
        Self {
            base_url,
            credential: credential.into(),
        }
    }

    /// Parse the base URL and wrap the credential.
    pub fn parse(base_url: &str, credential: impl Into<String>) -> Result<Self, ConnectionError> {
        let url = Url::parse(base_url)?;
        let credential: String = credential.into();
        Ok(Self::new(url, credential))
    }

    #[cfg(test)]
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the authenticated clone URL for `repository`.
    ///
    /// `https://host/base` + `owner/name` becomes
    /// `https://x-access-token:<credential>@host/base/owner/name`.
    pub fn clone_url(&self, repository: &str) -> Result<AuthenticatedUrl, ConnectionError> {
        let mut url = self.base_url.clone();
        let cannot_authenticate = || ConnectionError::CannotAuthenticate(self.base_url.to_string());

        url.set_username(TOKEN_USERNAME)
            .map_err(|()| cannot_authenticate())?;
        let credential = self.credential.expose_secret();
        let password = (!credential.is_empty()).then_some(credential);
        url.set_password(password)
            .map_err(|()| cannot_authenticate())?;

        let path = format!("{}/{}", url.path().trim_end_matches('/'), repository);
        url.set_path(&path);

        let encoded_password = url.password().unwrap_or_default().to_string();
        let mut redacted = url.clone();
        if url.password().is_some() {
            // Only fails for URLs that could not take a password above.
            let _ = redacted.set_password(Some(MASK));
        }
        let mut anonymous = url.clone();
        strip_userinfo(&mut anonymous);

        Ok(AuthenticatedUrl {
            url: SecretString::from(String::from(url)),
            credential: SecretString::from(credential.to_string()),
            encoded_password: SecretString::from(encoded_password),
            redacted: redacted.to_string(),
            anonymous: anonymous.to_string(),
        })
    }
}

/// A clone URL with the credential embedded.
///
/// Safe to hand to a process runner as [`Arg::Secret`], never safe to log:
/// there is no `Display`, and `Debug` only shows the redacted form.
pub struct AuthenticatedUrl {
    url: SecretString,
    credential: SecretString,
    encoded_password: SecretString,
    redacted: String,
    anonymous: String,
}

impl AuthenticatedUrl {
    /// The URL with the password replaced by `***`.
    pub fn redacted(&self) -> &str {
        &self.redacted
    }

    /// The URL with no userinfo at all, for recording where a checkout came from.
    pub fn anonymous(&self) -> &str {
        &self.anonymous
    }

    /// The URL as a process argument.
    pub fn to_arg(&self) -> Arg {
        Arg::Secret(SecretString::from(self.url.expose_secret().to_string()))
    }

    /// Scrub the URL and the credential from `text`.
    pub fn redact(&self, text: &str) -> String {
        self.scrub(text, &self.redacted)
    }

    /// Replace the URL with its anonymous form and mask any other occurrence
    /// of the credential.
    pub fn anonymize(&self, text: &str) -> String {
        self.scrub(text, &self.anonymous)
    }

    /// Whether `text` contains the credential in raw or percent-encoded form.
    pub fn is_exposed_in(&self, text: &str) -> bool {
        [&self.credential, &self.encoded_password]
            .into_iter()
            .map(|secret| secret.expose_secret())
            .any(|secret| !secret.is_empty() && text.contains(secret))
    }

    fn scrub(&self, text: &str, url_replacement: &str) -> String {
        let mut scrubbed = text.replace(self.url.expose_secret(), url_replacement);
        for secret in [&self.credential, &self.encoded_password] {
            let secret = secret.expose_secret();
            if !secret.is_empty() {
                scrubbed = scrubbed.replace(secret, MASK);
            }
        }
        scrubbed
    }
}

impl fmt::Debug for AuthenticatedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AuthenticatedUrl")
            .field(&self.redacted)
            .finish()
    }
}

fn strip_userinfo(url: &mut Url) {
    let _ = url.set_password(None);
    let _ = url.set_username("");
}
