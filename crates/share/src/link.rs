//! Share-link URIs.
//!
//! A full link carries the document in the hash:
//! `<app-url>#start=<percent-encoded JSON>&hideExplorerPanel=1`. A short link
//! carries a token instead (`#share=<token>`). Hash segments without `=` name
//! init files.

use tracing::debug;
use url::Url;
use url::form_urlencoded;

use crate::document::ShareDocument;
use crate::error::ShareError;

/// User parameters carried on a link unless configured otherwise.
pub const DEFAULT_PARAM_WHITELIST: [&str; 2] = ["hideExplorerPanel", "activeTabId"];

#[derive(Debug, Clone, PartialEq)]
pub struct LinkOptions {
    pub app_url: String,
    /// Parameters to carry, in order. Only whitelisted keys are written.
    pub user_params: Vec<(String, String)>,
    pub whitelist: Vec<String>,
}

impl LinkOptions {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
            user_params: Vec::new(),
            whitelist: default_whitelist(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_params.push((key.into(), value.into()));
        self
    }

    fn base(&self) -> &str {
        self.app_url.split('#').next().unwrap_or(&self.app_url)
    }

    fn append_params(&self, uri: &mut String) {
        for (key, value) in &self.user_params {
            if !self.whitelist.iter().any(|w| w == key) {
                debug!(key = %key, "dropping non-whitelisted link parameter");
                continue;
            }
            uri.push('&');
            uri.push_str(&encode_component(key));
            uri.push('=');
            uri.push_str(&encode_component(value));
        }
    }
}

pub fn default_whitelist() -> Vec<String> {
    DEFAULT_PARAM_WHITELIST.iter().map(|s| s.to_string()).collect()
}

fn encode_component(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn decode_component(s: &str) -> String {
    // `parse` treats its input as `k=v` pairs; a lone component comes back as
    // the key.
    form_urlencoded::parse(s.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Full link with the document inline.
pub fn encode(document: &ShareDocument, options: &LinkOptions) -> Result<String, ShareError> {
    let json = document.to_json_string()?;
    let mut uri = format!("{}#start={}", options.base(), encode_component(&json));
    options.append_params(&mut uri);
    Ok(uri)
}

/// Short link for a token handed out by a short-link service.
pub fn encode_token(token: &str, options: &LinkOptions) -> String {
    let mut uri = format!("{}#share={}", options.base(), encode_component(token));
    options.append_params(&mut uri);
    uri
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkPayload {
    Document(ShareDocument),
    Token(String),
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLink {
    pub payload: LinkPayload,
    /// Init file names, in link order.
    pub init_files: Vec<String>,
    /// Whitelisted user parameters, query first, then hash.
    pub user_params: Vec<(String, String)>,
}

impl DecodedLink {
    /// URLs of the init files named by the link, resolved against `app_url`.
    pub fn init_file_urls(&self, app_url: &str) -> Result<Vec<String>, ShareError> {
        self.init_files
            .iter()
            .map(|name| init_file_url(app_url, name))
            .collect()
    }
}

/// `name` as an init file URL: absolute URLs pass through, bare names map to
/// `<app>/init/<name>.json`.
pub fn init_file_url(app_url: &str, name: &str) -> Result<String, ShareError> {
    if Url::parse(name).is_ok() {
        return Ok(name.to_string());
    }
    let base =
        Url::parse(app_url).map_err(|e| ShareError::InvalidLink(format!("{app_url}: {e}")))?;
    let file = if name.ends_with(".json") {
        format!("init/{name}")
    } else {
        format!("init/{name}.json")
    };
    base.join(&file)
        .map(|u| u.to_string())
        .map_err(|e| ShareError::InvalidLink(format!("{name}: {e}")))
}

/// Splits a share link into its payload, init files and user parameters.
pub fn decode(uri: &str, whitelist: &[String]) -> Result<DecodedLink, ShareError> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(ShareError::InvalidLink("empty link".into()));
    }
    let (before_hash, hash) = uri.split_once('#').unwrap_or((uri, ""));
    let query = before_hash.split_once('?').map(|(_, q)| q).unwrap_or("");

    let mut decoded = DecodedLink {
        payload: LinkPayload::None,
        init_files: Vec::new(),
        user_params: Vec::new(),
    };
    let allowed = |key: &str| whitelist.iter().any(|w| w == key);

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if allowed(&*key) {
            decoded.user_params.push((key.into_owned(), value.into_owned()));
        }
    }

    for segment in hash.split('&').filter(|s| !s.is_empty()) {
        if !segment.contains('=') {
            decoded.init_files.push(decode_component(segment));
            continue;
        }
        let Some((key, value)) = form_urlencoded::parse(segment.as_bytes()).next() else {
            continue;
        };
        match &*key {
            "start" => {
                decoded.payload = LinkPayload::Document(ShareDocument::from_json_str(&value)?);
            }
            "share" => decoded.payload = LinkPayload::Token(value.into_owned()),
            k if allowed(k) => decoded.user_params.push((k.to_string(), value.into_owned())),
            _ => debug!(key = %key, "ignoring link parameter"),
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::{
        LinkOptions, LinkPayload, decode, default_whitelist, encode, encode_token, init_file_url,
    };
    use crate::document::{InitFragment, ShareDocument};
    use pretty_assertions::assert_eq;

    const APP: &str = "https://atlas.example.com/";

    fn document() -> ShareDocument {
        let mut fragment = InitFragment::default();
        fragment.base_map_name = Some("Natural Earth & Friends".into());
        ShareDocument::new(vec![fragment.into()])
    }

    #[test]
    fn full_links_carry_the_document_and_whitelisted_params() {
        let options = LinkOptions::new(APP)
            .with_param("hideExplorerPanel", "1")
            .with_param("secret", "x");
        let uri = encode(&document(), &options).unwrap();
        assert!(uri.starts_with("https://atlas.example.com/#start=%7B"));
        assert!(uri.ends_with("&hideExplorerPanel=1"));
        assert!(!uri.contains("secret"));

        let decoded = decode(&uri, &default_whitelist()).unwrap();
        assert_eq!(decoded.payload, LinkPayload::Document(document()));
        assert_eq!(
            decoded.user_params,
            vec![("hideExplorerPanel".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn bare_segments_are_init_files() {
        let uri = format!("{APP}?activeTabId=data#base&extra&share=abc123");
        let decoded = decode(&uri, &default_whitelist()).unwrap();
        assert_eq!(decoded.payload, LinkPayload::Token("abc123".into()));
        assert_eq!(decoded.init_files, vec!["base".to_string(), "extra".to_string()]);
        assert_eq!(
            decoded.user_params,
            vec![("activeTabId".to_string(), "data".to_string())]
        );
        assert_eq!(
            decoded.init_file_urls(APP).unwrap(),
            vec![
                "https://atlas.example.com/init/base.json".to_string(),
                "https://atlas.example.com/init/extra.json".to_string()
            ]
        );
    }

    #[test]
    fn absolute_init_files_pass_through() {
        assert_eq!(
            init_file_url(APP, "https://data.example.com/init.json").unwrap(),
            "https://data.example.com/init.json"
        );
    }

    #[test]
    fn short_links_replace_existing_hash() {
        let options = LinkOptions::new("https://atlas.example.com/#old");
        assert_eq!(
            encode_token("t0k", &options),
            "https://atlas.example.com/#share=t0k"
        );
    }

    #[test]
    fn links_without_hash_have_no_payload() {
        let decoded = decode(APP, &default_whitelist()).unwrap();
        assert_eq!(decoded.payload, LinkPayload::None);
        assert!(decode("   ", &default_whitelist()).is_err());
    }
}
