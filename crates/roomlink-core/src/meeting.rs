//! Meeting URL handling.
//!
//! A meeting URL looks like `https://app.example.com/j/<alias>`. The alias
//! doubles as the correlation id both sides stamp on every message, and the
//! URL's origin is the only origin the host accepts messages from.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Matches the meeting alias in a `/j/<alias>` path.
static MEETING_ALIAS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/j/([a-zA-Z0-9_-]+)").expect("Invalid meeting alias regex"));

/// Errors produced while interpreting a meeting URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeetingUrlError {
    /// The string is not an absolute URL.
    #[error("invalid meeting URL {url:?}: {reason}")]
    Parse { url: String, reason: String },

    /// The path carries no `/j/<alias>` segment.
    #[error("meeting URL has no meeting alias: {0}")]
    MissingAlias(String),

    /// The URL has an opaque origin (e.g. `data:`), so messages could never be matched.
    #[error("meeting URL has an opaque origin: {0}")]
    OpaqueOrigin(String),
}

/// Identity the embedded app should join as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    /// Pre-issued user token. Takes precedence over `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Display name for guests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// UI locale, e.g. `en`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl UserInfo {
    /// Builder: set the user token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builder: set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: set the locale.
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// A parsed meeting URL together with the values derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingUrl {
    url: Url,
    meeting_id: String,
    origin: String,
}

impl MeetingUrl {
    /// Parses and validates a meeting URL.
    pub fn parse(input: &str) -> Result<Self, MeetingUrlError> {
        let url = Url::parse(input).map_err(|e| MeetingUrlError::Parse {
            url: input.to_string(),
            reason: e.to_string(),
        })?;

        let meeting_id = meeting_id_from_path(url.path())
            .ok_or_else(|| MeetingUrlError::MissingAlias(input.to_string()))?;

        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(MeetingUrlError::OpaqueOrigin(input.to_string()));
        }

        Ok(Self {
            origin: origin.ascii_serialization(),
            meeting_id,
            url,
        })
    }

    /// The meeting alias, used as the channel correlation id.
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// ASCII-serialized origin, e.g. `https://app.example.com`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The URL as given.
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// Builds the URL the child frame is navigated to from a host page at
    /// `host_origin`.
    ///
    /// Appends `embedded=1`, then `locale`, then either `t` (token) or `un`
    /// (guest name), then the opaque `ui` parameter when one is supplied.
    /// Hosts not served over http(s), such as `file:` pages or desktop
    /// shells, also get `skipAuth=1`.
    pub fn session_url(&self, user: &UserInfo, ui: Option<&str>, host_origin: &str) -> Url {
        let mut url = self.url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("embedded", "1");

            if let Some(locale) = user.locale.as_deref() {
                query.append_pair("locale", locale);
            }

            if let Some(token) = user.token.as_deref() {
                query.append_pair("t", token);
            } else if let Some(name) = user.name.as_deref() {
                query.append_pair("un", name);
            }

            if let Some(ui) = ui {
                query.append_pair("ui", ui);
            }

            if !is_web_origin(host_origin) {
                query.append_pair("skipAuth", "1");
            }
        }
        url
    }
}

/// True for `http:` and `https:` origins. Opaque origins (`null`) are not.
fn is_web_origin(origin: &str) -> bool {
    let scheme = origin.split_once(':').map_or("", |(scheme, _)| scheme);
    scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
}

fn meeting_id_from_path(path: &str) -> Option<String> {
    MEETING_ALIAS_REGEX
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extracts the meeting alias from a meeting URL string.
pub fn meeting_id_from_url(input: &str) -> Option<String> {
    MeetingUrl::parse(input)
        .ok()
        .map(|meeting| meeting.meeting_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_alias_and_origin() {
        let meeting = MeetingUrl::parse("https://app.example.com/j/team-sync_42/").unwrap();
        assert_eq!(meeting.meeting_id(), "team-sync_42");
        assert_eq!(meeting.origin(), "https://app.example.com");
    }

    #[test]
    fn origin_keeps_non_default_port() {
        let meeting = MeetingUrl::parse("http://localhost:8080/j/abc").unwrap();
        assert_eq!(meeting.origin(), "http://localhost:8080");
    }

    #[test]
    fn rejects_missing_alias() {
        let err = MeetingUrl::parse("https://app.example.com/rooms/abc").unwrap_err();
        assert!(matches!(err, MeetingUrlError::MissingAlias(_)));
        assert_eq!(meeting_id_from_url("https://app.example.com/"), None);
    }

    #[test]
    fn rejects_relative_url() {
        let err = MeetingUrl::parse("/j/abc").unwrap_err();
        assert!(matches!(err, MeetingUrlError::Parse { .. }));
    }

    #[test]
    fn session_url_prefers_token_over_name() {
        let meeting = MeetingUrl::parse("https://app.example.com/j/abc").unwrap();
        let user = UserInfo::default()
            .with_token("tok")
            .with_name("Ada Lovelace")
            .with_locale("fr");

        let url = meeting.session_url(&user, Some("N4Ig"), "https://host.example.com");
        assert_eq!(
            url.as_str(),
            "https://app.example.com/j/abc?embedded=1&locale=fr&t=tok&ui=N4Ig"
        );
    }

    #[test]
    fn session_url_encodes_guest_name() {
        let meeting = MeetingUrl::parse("https://app.example.com/j/abc").unwrap();
        let user = UserInfo::default().with_name("Ada Lovelace");

        let url = meeting.session_url(&user, None, "http://localhost:3000");
        assert_eq!(
            url.as_str(),
            "https://app.example.com/j/abc?embedded=1&un=Ada+Lovelace"
        );
    }

    #[test]
    fn session_url_skips_auth_outside_the_web() {
        let meeting = MeetingUrl::parse("https://app.example.com/j/abc").unwrap();
        let user = UserInfo::default();

        for host_origin in ["file://", "null", "tauri://localhost"] {
            assert_eq!(
                meeting.session_url(&user, None, host_origin).as_str(),
                "https://app.example.com/j/abc?embedded=1&skipAuth=1",
                "host origin {host_origin}"
            );
        }
    }

    #[test]
    fn user_info_from_json() {
        let user: UserInfo = serde_json::from_str(r#"{"name":"Grace"}"#).unwrap();
        assert_eq!(user, UserInfo::default().with_name("Grace"));
    }
}
