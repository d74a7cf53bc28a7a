use std::collections::BTreeMap;

use axum::extract::Query;
use axum::http::{Method, Uri};

use crate::paths::clean_path;
use crate::sort::SortKey;

/// Query parameter marking a POST as an upload.
pub const UPLOAD_PARAM: &str = "upload";

/// Query parameter selecting the listing order.
pub const SORT_PARAM: &str = "sortBy";

/// The parts of a request the dispatcher and the theme look at.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    /// Path exactly as it appeared on the request line, still percent-encoded.
    pub raw_path: String,
    /// Percent-decoded path, always starting with `/`.
    pub path: String,
    /// Lexically cleaned form of `path`.
    pub cleaned: String,
    pub raw_query: Option<String>,
    pub params: BTreeMap<String, String>,
}

impl RequestInfo {
    pub fn new(method: &Method, uri: &Uri) -> Self {
        let mut raw_path = uri.path().to_string();
        if !raw_path.starts_with('/') {
            raw_path.insert(0, '/');
        }

        let path = String::from_utf8_lossy(&urlencoding::decode_binary(raw_path.as_bytes())).into_owned();
        let cleaned = clean_path(&path);

        let params = Query::<BTreeMap<String, String>>::try_from_uri(uri)
            .map(|Query(params)| params)
            .unwrap_or_default();

        Self {
            method: method.clone(),
            raw_path,
            path,
            cleaned,
            raw_query: uri.query().filter(|q| !q.is_empty()).map(str::to_string),
            params,
        }
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey::from_param(self.params.get(SORT_PARAM).map(String::as_str))
    }

    /// Append the original query string to `location`.
    pub fn with_query(&self, mut location: String) -> String {
        if let Some(query) = &self.raw_query {
            location.push('?');
            location.push_str(query);
        }
        location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_info_decodes_and_cleans() {
        let uri: Uri = "/a%20dir/./b/../c?sortBy=size&upload".parse().unwrap();
        let info = RequestInfo::new(&Method::GET, &uri);

        assert_eq!(info.raw_path, "/a%20dir/./b/../c");
        assert_eq!(info.path, "/a dir/./b/../c");
        assert_eq!(info.cleaned, "/a dir/c");
        assert_eq!(info.sort_key(), SortKey::Size);
        assert!(info.has_param(UPLOAD_PARAM));
        assert_eq!(
            info.with_query("/x/".to_string()),
            "/x/?sortBy=size&upload"
        );
    }

    #[test]
    fn test_request_info_without_query() {
        let uri: Uri = "/docs/".parse().unwrap();
        let info = RequestInfo::new(&Method::POST, &uri);

        assert_eq!(info.cleaned, "/docs");
        assert!(info.params.is_empty());
        assert_eq!(info.sort_key(), SortKey::Name);
        assert_eq!(info.with_query("/docs/".to_string()), "/docs/");
    }
}
