//! Gitignore template API: endpoints, response parsing and fetches.

use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Public gitignore template API.
pub const DEFAULT_API_BASE: &str = "https://www.toptal.com/developers/gitignore/api";

/// Base URL requests go to: the custom endpoint if set, otherwise the default.
pub fn api_base(custom_endpoint: Option<&Url>) -> String {
  custom_endpoint
    .map(Url::as_str)
    .unwrap_or(DEFAULT_API_BASE)
    .trim_end_matches('/')
    .to_string()
}

/// Endpoint listing every template name.
pub fn list_endpoint(custom_endpoint: Option<&Url>) -> String {
  format!("{}/list", api_base(custom_endpoint))
}

/// Endpoint returning the combined content for `templates`, in the given order.
pub fn content_endpoint(custom_endpoint: Option<&Url>, templates: &[String]) -> String {
  format!("{}/{}", api_base(custom_endpoint), templates.join(","))
}

/// Split a template list body on commas and newlines.
///
/// Fails when nothing usable is left; `endpoint` is named in the error.
pub fn parse_templates(text: &str, endpoint: &str) -> Result<Vec<String>> {
  let templates: Vec<String> = text
    .split([',', '\n'])
    .map(str::trim)
    .filter(|template| !template.is_empty())
    .map(String::from)
    .collect();

  if templates.is_empty() {
    return Err(Error::api(
      format!("No templates found in response from {}", endpoint),
      None,
    ));
  }

  Ok(templates)
}

/// Fetch the list of available template names.
pub async fn fetch_templates(transport: &Transport, custom_endpoint: Option<&Url>) -> Result<Vec<String>> {
  let endpoint = list_endpoint(custom_endpoint);
  debug!(endpoint = %endpoint, "fetching template list");

  let body = transport.get_text(&endpoint).await?;
  let templates = parse_templates(&body, &endpoint)?;

  debug!(count = templates.len(), "fetched template list");
  Ok(templates)
}

/// Fetch gitignore content combining `templates`.
///
/// An empty selection fails without sending a request.
pub async fn fetch_gitignore_content(
  transport: &Transport,
  custom_endpoint: Option<&Url>,
  templates: &[String],
) -> Result<String> {
  if templates.is_empty() {
    return Err(Error::api("No templates provided", None));
  }

  let endpoint = content_endpoint(custom_endpoint, templates);
  debug!(templates = %templates.join(", "), "fetching gitignore content");

  let content = transport.get_text(&endpoint).await?;

  debug!(chars = content.len(), "fetched gitignore content");
  Ok(content)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::ErrorKind;

  const ENDPOINT: &str = "http://example.com/list";

  fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn parses_mixed_separators() {
    assert_eq!(
      parse_templates("node, python\njava, ", ENDPOINT).unwrap(),
      names(&["node", "python", "java"])
    );
    assert_eq!(
      parse_templates("node\npython\njava", ENDPOINT).unwrap(),
      names(&["node", "python", "java"])
    );
  }

  #[test]
  fn drops_blank_entries_and_whitespace() {
    assert_eq!(
      parse_templates("  node  ,,python, ,java\r\n", ENDPOINT).unwrap(),
      names(&["node", "python", "java"])
    );
    assert_eq!(parse_templates("node", ENDPOINT).unwrap(), names(&["node"]));
  }

  #[test]
  fn empty_list_names_the_endpoint() {
    for body in ["", "  ", ",\n, ,"] {
      let err = parse_templates(body, ENDPOINT).unwrap_err();
      assert_eq!(err.kind(), ErrorKind::Api);
      assert_eq!(err.status(), None);
      assert!(err.to_string().contains(ENDPOINT), "{}", err);
    }
  }

  #[test]
  fn endpoints_use_default_base() {
    assert_eq!(
      list_endpoint(None),
      "https://www.toptal.com/developers/gitignore/api/list"
    );
    assert_eq!(
      content_endpoint(None, &names(&["rust", "node"])),
      "https://www.toptal.com/developers/gitignore/api/rust,node"
    );
  }

  #[test]
  fn endpoints_use_custom_base() {
    let custom = Url::parse("http://localhost:9000/api/").unwrap();
    assert_eq!(list_endpoint(Some(&custom)), "http://localhost:9000/api/list");
    assert_eq!(
      content_endpoint(Some(&custom), &names(&["go"])),
      "http://localhost:9000/api/go"
    );
  }

  #[tokio::test]
  async fn empty_selection_fails_without_request() {
    // Port 1 refuses connections; reaching the network would be a Network error.
    let custom = Url::parse("http://127.0.0.1:1").unwrap();
    let transport = Transport::new().unwrap();

    let err = fetch_gitignore_content(&transport, Some(&custom), &[])
      .await
      .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Api);
    assert_eq!(err.to_string(), "No templates provided");
  }
}
